//! 브로커 자격 증명 공급자
//!
//! 어댑터 생성자에 명시적으로 주입한다. 전역 싱글톤으로 두지 않아야
//! 테스트에서 가짜 브로커로 대체할 수 있다.

use std::collections::HashMap;

/// 자격 증명 조회 인터페이스
pub trait SecretsProvider: Send + Sync {
    /// 이름으로 비밀 값 조회. 값 자체는 절대 로그에 남기지 않는다.
    fn get(&self, name: &str) -> Option<String>;
}

/// 환경변수 기반 기본 구현
pub struct EnvSecrets;

impl SecretsProvider for EnvSecrets {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

/// 테스트용 고정 값 구현
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        StaticSecrets {
            values: HashMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl Default for StaticSecrets {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretsProvider for StaticSecrets {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}
