//! 주문 실행 엔진 라이브러리
//!
//! 주문 검증, 상태 기계, 실행 전략(TWAP/VWAP/Iceberg/스마트 라우팅),
//! 브로커 연동, 거래 비용 분석을 지원하는 실행 시스템입니다.

pub mod api;
pub mod broker;
pub mod config;
pub mod core;
pub mod error;
pub mod market_data;
pub mod models;
pub mod order_core;
pub mod strategies;
pub mod utils;

// 핵심 타입 재노출
pub use crate::error::{ExecutionError, ValidationError};
pub use crate::models::order::{Order, OrderId, OrderIntent, OrderSide, OrderStatus, OrderType, TimeInForce};
pub use crate::models::trade::Trade;
pub use crate::models::market_data::MarketSnapshot;
pub use crate::models::broker_account::BrokerAccount;
pub use crate::broker::traits::BrokerAdapter;
pub use crate::core::ExecutionEngine;
pub use crate::strategies::{ExecutionPlan, ExecutionStrategy, StrategyParams};

/// 버전 정보
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 결과 타입 별칭
pub type Result<T> = std::result::Result<T, ExecutionError>;
