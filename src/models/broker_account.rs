use serde::{Deserialize, Serialize};

/// 브로커 계정
///
/// 자격 증명은 환경변수 이름으로만 참조하고 로그에 절대 남기지 않는다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerAccount {
    pub id: String,
    pub broker: String,
    pub account_number: String,
    pub api_key_env: Option<String>,
    pub api_secret_env: Option<String>,
    pub fractional_shares: bool,
    pub extended_hours: bool,
    pub short_selling: bool,
    pub active: bool,
}

impl BrokerAccount {
    pub fn new(
        id: impl Into<String>,
        broker: impl Into<String>,
        account_number: impl Into<String>,
    ) -> Self {
        BrokerAccount {
            id: id.into(),
            broker: broker.into(),
            account_number: account_number.into(),
            api_key_env: None,
            api_secret_env: None,
            fractional_shares: false,
            extended_hours: false,
            short_selling: false,
            active: true,
        }
    }

    pub fn with_credential_envs(
        mut self,
        api_key_env: impl Into<String>,
        api_secret_env: impl Into<String>,
    ) -> Self {
        self.api_key_env = Some(api_key_env.into());
        self.api_secret_env = Some(api_secret_env.into());
        self
    }
}
