//! 브로커 연동 계층
//!
//! 이기종 브로커 API를 단일 제출/취소/체결 보고 인터페이스로 정규화한다.

pub mod alpaca;
pub mod binance;
pub mod fill_router;
pub mod gateway;
pub mod mocks;
pub mod rate_limit;
pub mod retry;
pub mod secrets;
pub mod traits;

pub use fill_router::FillRouter;
pub use gateway::BrokerGateway;
pub use rate_limit::TokenBucket;
pub use retry::{BackoffSchedule, RetryPolicy, REASON_BROKER_UNAVAILABLE};
pub use secrets::{EnvSecrets, SecretsProvider, StaticSecrets};
pub use traits::{BrokerAdapter, BrokerOrderRef, ChildOrderRequest, FillEvent};
