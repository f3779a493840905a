/**
* filename : lib
* author : HAMA
* date: 2025. 5. 8.
* description:
**/

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::order::OrderId;

/// 주문 검증 실패 사유 코드
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Market closed for symbol: {0}")]
    MarketClosed(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("Risk limit exceeded: {0}")]
    RiskLimitExceeded(String),

    #[error("Duplicate order within deduplication window: {0}")]
    DuplicateOrder(String),
}

impl ValidationError {
    /// 주문 발신자에게 전달되는 사유 코드
    pub fn reason_code(&self) -> &'static str {
        match self {
            ValidationError::InvalidSymbol(_) => "invalid_symbol",
            ValidationError::MarketClosed(_) => "market_closed",
            ValidationError::InsufficientFunds { .. } => "insufficient_funds",
            ValidationError::RiskLimitExceeded(_) => "risk_limit_exceeded",
            ValidationError::DuplicateOrder(_) => "duplicate_order",
        }
    }
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Order already terminal: {0}")]
    AlreadyTerminal(OrderId),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Broker transient error: {0}")]
    BrokerTransient(String),

    #[error("Broker permanent error: {0}")]
    BrokerPermanent(String),

    #[error("Reconciliation conflict: {0}")]
    ReconciliationConflict(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Broker account not found: {0}")]
    BrokerAccountNotFound(String),

    #[error("Acknowledgement timeout for order: {0}")]
    AckTimeout(OrderId),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Lock error")]
    LockError,

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ExecutionError {
    /// 재시도 가능한 오류 여부 (브로커 일시 장애만 내부 재시도)
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutionError::BrokerTransient(_))
    }
}
