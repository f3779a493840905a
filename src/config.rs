/**
* filename : lib
* author : HAMA
* date: 2025. 5. 8.
* description:
**/

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::ExecutionError;
use crate::models::order::TimeInForce;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub default_broker: String,
    pub brokers: Vec<BrokerConfig>,
    pub symbols: Vec<String>,
    pub execution: ExecutionConfig,
    pub market_hours: MarketHoursConfig,
    pub risk: RiskConfig,
    pub tca: TcaConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub name: String,
    pub account_number: String,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub api_secret_env: Option<String>,
    /// 분당 허용 요청 수 (토큰 버킷)
    pub rate_limit_rpm: u32,
    pub fractional_shares: bool,
    pub extended_hours: bool,
    pub short_selling: bool,
    pub use_mock: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub default_time_in_force: TimeInForce,
    /// 브로커 접수 응답 대기 한도 (초) - 초과 시 에스컬레이션
    pub ack_timeout_secs: u64,
    /// 중복 주문 판정 윈도우 (초)
    pub dedup_window_secs: u64,
    pub max_retry_attempts: u32,
    pub retry_initial_backoff_ms: u64,
    pub twap: TwapConfig,
    pub vwap: VwapConfig,
    pub iceberg: IcebergConfig,
    pub limit: LimitConfig,
    pub smart_router: SmartRouterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwapConfig {
    pub num_slices: usize,
    pub interval_secs: u64,
    /// 기준가 대비 허용 가격 버퍼 (비율, 0.002 = 0.2%)
    pub price_limit_buffer: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VwapConfig {
    pub num_slices: usize,
    pub start_offset_secs: u64,
    pub end_offset_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcebergConfig {
    /// 한 번에 노출할 수량
    pub display_size: f64,
    /// 최우선 호가 대비 가격 개선 폭
    pub price_improvement: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    pub max_wait_secs: u64,
    /// 대기 초과 시 스프레드를 넘어 공격적으로 전환할지 여부
    pub aggressive_after_wait: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartRouterConfig {
    /// 변동성 임계값 (%) - 초과 시 TWAP 경로
    pub volatility_threshold: f64,
    /// 유동성 임계값 (주문수량 / 일거래량 비율) - 초과 시 Iceberg 경로
    pub liquidity_threshold: f64,
    /// 스프레드 임계값 (bps) - 초과 시 VWAP 경로
    pub spread_threshold_bps: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketHoursConfig {
    /// 정규장 시작/종료 (UTC 기준 분)
    pub open_minute: u32,
    pub close_minute: u32,
    /// 연장장 시작/종료 (UTC 기준 분)
    pub extended_open_minute: u32,
    pub extended_close_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub max_position_size: f64,
    pub max_notional_value: f64,
    pub max_sector_exposure: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcaConfig {
    pub benchmark: String,
    pub retention_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load() -> Result<Self, ExecutionError> {
        // Try to load from config.json
        let config_path = Path::new("config.json");

        if config_path.exists() {
            let mut file = File::open(config_path)
                .map_err(|e| ExecutionError::ConfigError(format!("Failed to open config file: {}", e)))?;

            let mut contents = String::new();
            file.read_to_string(&mut contents)
                .map_err(|e| ExecutionError::ConfigError(format!("Failed to read config file: {}", e)))?;

            let mut cfg: Config = serde_json::from_str(&contents)
                .map_err(|e| ExecutionError::ConfigError(format!("Failed to parse config file: {}", e)))?;
            // environment overrides
            cfg.apply_env_overrides();
            cfg.validate()?;
            Ok(cfg)
        } else {
            // Return default configuration
            let mut cfg = Config::default();
            cfg.apply_env_overrides();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Apply environment variable overrides for sensitive/runtime fields
    fn apply_env_overrides(&mut self) {
        use std::env;
        if let Ok(v) = env::var("DEFAULT_BROKER") { if !v.is_empty() { self.default_broker = v; } }
        if let Ok(v) = env::var("USE_MOCK") {
            let lower = v.to_lowercase();
            if ["1", "true", "yes"].contains(&lower.as_str()) {
                for broker in &mut self.brokers { broker.use_mock = true; }
            }
            if ["0", "false", "no"].contains(&lower.as_str()) {
                for broker in &mut self.brokers { broker.use_mock = false; }
            }
        }
    }

    /// 기동 시 치명 오류 검증 - 잘못된 전략 파라미터, 자격 증명 누락
    pub fn validate(&self) -> Result<(), ExecutionError> {
        if !self.brokers.iter().any(|b| b.name == self.default_broker) {
            return Err(ExecutionError::ConfigError(format!(
                "Default broker '{}' is not configured",
                self.default_broker
            )));
        }

        for broker in &self.brokers {
            if broker.rate_limit_rpm == 0 {
                return Err(ExecutionError::ConfigError(format!(
                    "Broker '{}' rate_limit_rpm must be positive",
                    broker.name
                )));
            }
            if !broker.use_mock && (broker.api_key_env.is_none() || broker.api_secret_env.is_none()) {
                return Err(ExecutionError::ConfigError(format!(
                    "Broker '{}' is live but has no credential references",
                    broker.name
                )));
            }
        }

        if self.execution.twap.num_slices == 0 {
            return Err(ExecutionError::ConfigError("twap.num_slices must be positive".to_string()));
        }
        if self.execution.vwap.num_slices == 0 {
            return Err(ExecutionError::ConfigError("vwap.num_slices must be positive".to_string()));
        }
        if self.execution.iceberg.display_size <= 0.0 {
            return Err(ExecutionError::ConfigError("iceberg.display_size must be positive".to_string()));
        }
        if self.execution.max_retry_attempts == 0 {
            return Err(ExecutionError::ConfigError("max_retry_attempts must be positive".to_string()));
        }
        if self.market_hours.open_minute >= self.market_hours.close_minute {
            return Err(ExecutionError::ConfigError("market_hours open must precede close".to_string()));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3030,
            },
            default_broker: "mock".to_string(),
            brokers: vec![BrokerConfig {
                name: "mock".to_string(),
                account_number: "SIM-0001".to_string(),
                base_url: None,
                api_key_env: None,
                api_secret_env: None,
                rate_limit_rpm: 200,
                fractional_shares: true,
                extended_hours: true,
                short_selling: true,
                use_mock: true,
            }],
            symbols: vec![
                "AAPL".to_string(),
                "MSFT".to_string(),
                "SPY".to_string(),
                "BTCUSDT".to_string(),
            ],
            execution: ExecutionConfig {
                default_time_in_force: TimeInForce::GTC,
                ack_timeout_secs: 10,
                dedup_window_secs: 5,
                max_retry_attempts: 5,
                retry_initial_backoff_ms: 100,
                twap: TwapConfig {
                    num_slices: 5,
                    interval_secs: 60,
                    price_limit_buffer: 0.002,
                },
                vwap: VwapConfig {
                    num_slices: 10,
                    start_offset_secs: 0,
                    end_offset_secs: 3600,
                },
                iceberg: IcebergConfig {
                    display_size: 100.0,
                    price_improvement: 0.01,
                },
                limit: LimitConfig {
                    max_wait_secs: 30,
                    aggressive_after_wait: true,
                },
                smart_router: SmartRouterConfig {
                    volatility_threshold: 2.0,
                    liquidity_threshold: 0.05,
                    spread_threshold_bps: 20.0,
                },
            },
            market_hours: MarketHoursConfig {
                open_minute: 870,           // 14:30 UTC
                close_minute: 1260,         // 21:00 UTC
                extended_open_minute: 480,  // 08:00 UTC
                extended_close_minute: 1440,
            },
            risk: RiskConfig {
                max_position_size: 10_000.0,
                max_notional_value: 1_000_000.0,
                max_sector_exposure: 0.3,
            },
            tca: TcaConfig {
                benchmark: "arrival".to_string(),
                retention_days: 90,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_default_broker_is_fatal() {
        let mut config = Config::default();
        config.default_broker = "nonexistent".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_live_broker_requires_credentials() {
        let mut config = Config::default();
        config.brokers[0].use_mock = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_slices_is_fatal() {
        let mut config = Config::default();
        config.execution.twap.num_slices = 0;
        assert!(config.validate().is_err());
    }
}
