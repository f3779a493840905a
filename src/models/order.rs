use serde::{Deserialize, Serialize};
use std::fmt;

use crate::strategies::StrategyParams;

#[derive(Debug, Clone, Serialize, Deserialize, Eq, Hash, PartialEq)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimeInForce {
    GTC,
    IOC,
    FOK,
    Day,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    PendingValidation,
    PendingSubmission,
    Submitted,
    PartiallyFilled,
    Cancelling,
    NeedsReconciliation,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// 종료 상태 여부 (종료 상태의 주문은 불변)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }

    /// 허용된 상태 전이 여부
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        if self.is_terminal() {
            return false;
        }

        match self {
            PendingValidation => matches!(next, PendingSubmission | Rejected | Cancelled),
            PendingSubmission => matches!(next, Submitted | Rejected | Cancelled),
            Submitted => matches!(
                next,
                PartiallyFilled | Filled | Cancelling | Cancelled | Expired | NeedsReconciliation
            ),
            PartiallyFilled => matches!(
                next,
                PartiallyFilled | Filled | Cancelling | Cancelled | Expired | NeedsReconciliation
            ),
            // 취소 중에도 늦게 도착한 체결은 수용한다
            Cancelling => matches!(next, PartiallyFilled | Filled | Cancelled | NeedsReconciliation),
            NeedsReconciliation => matches!(
                next,
                Submitted | PartiallyFilled | Filled | Cancelled | Rejected
            ),
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub portfolio_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    pub broker_order_id: Option<String>,
    pub strategy: StrategyParams,
    pub filled_quantity: f64,
    pub average_fill_price: f64,
    pub commission: f64,
    pub extended_hours: bool,
    pub client_order_id: Option<String>,
    pub reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    pub fn new(
        portfolio_id: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        quantity: f64,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Order {
            id: OrderId(uuid::Uuid::new_v4().to_string()),
            portfolio_id: portfolio_id.into(),
            symbol: symbol.into(),
            side,
            order_type,
            quantity,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::GTC,
            status: OrderStatus::PendingValidation,
            broker_order_id: None,
            strategy: StrategyParams::default(),
            filled_quantity: 0.0,
            average_fill_price: 0.0,
            commission: 0.0,
            extended_hours: false,
            client_order_id: None,
            reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_limit_price(mut self, limit_price: f64) -> Self {
        self.limit_price = Some(limit_price);
        self
    }

    pub fn with_stop_price(mut self, stop_price: f64) -> Self {
        self.stop_price = Some(stop_price);
        self
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = time_in_force;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyParams) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_extended_hours(mut self, extended_hours: bool) -> Self {
        self.extended_hours = extended_hours;
        self
    }

    pub fn with_client_order_id(mut self, client_order_id: impl Into<String>) -> Self {
        self.client_order_id = Some(client_order_id.into());
        self
    }

    pub fn remaining_quantity(&self) -> f64 {
        (self.quantity - self.filled_quantity).max(0.0)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 기준 가격 (지정가 주문이면 지정가, 아니면 호출측이 시장가 사용)
    pub fn reference_price(&self) -> Option<f64> {
        self.limit_price
    }
}

/// 신호/리스크 협력 서비스에서 들어오는 주문 의도
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub portfolio_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
    pub time_in_force: Option<TimeInForce>,
    pub strategy: Option<StrategyParams>,
    #[serde(default)]
    pub extended_hours: bool,
    pub client_order_id: Option<String>,
}

impl OrderIntent {
    pub fn new(
        portfolio_id: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        quantity: f64,
    ) -> Self {
        OrderIntent {
            portfolio_id: portfolio_id.into(),
            symbol: symbol.into(),
            side,
            order_type,
            quantity,
            limit_price: None,
            stop_price: None,
            time_in_force: None,
            strategy: None,
            extended_hours: false,
            client_order_id: None,
        }
    }

    pub fn with_limit_price(mut self, limit_price: f64) -> Self {
        self.limit_price = Some(limit_price);
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyParams) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// 의도한 체결 가격 (지정가 없으면 0, 중복 판정 지문에 사용)
    pub fn effective_price(&self) -> f64 {
        self.limit_price.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_are_frozen() {
        for status in [
            OrderStatus::Filled,
            OrderStatus::Cancelled,
            OrderStatus::Rejected,
            OrderStatus::Expired,
        ] {
            assert!(status.is_terminal());
            assert!(!status.can_transition_to(OrderStatus::Submitted));
            assert!(!status.can_transition_to(OrderStatus::Cancelled));
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        assert!(OrderStatus::PendingValidation.can_transition_to(OrderStatus::PendingSubmission));
        assert!(OrderStatus::PendingSubmission.can_transition_to(OrderStatus::Submitted));
        assert!(OrderStatus::Submitted.can_transition_to(OrderStatus::PartiallyFilled));
        assert!(OrderStatus::PartiallyFilled.can_transition_to(OrderStatus::Filled));
        assert!(OrderStatus::Submitted.can_transition_to(OrderStatus::Expired));

        // 검증 전 주문은 곧바로 체결될 수 없다
        assert!(!OrderStatus::PendingValidation.can_transition_to(OrderStatus::Filled));
    }

    #[test]
    fn test_late_fill_during_cancel() {
        assert!(OrderStatus::Cancelling.can_transition_to(OrderStatus::PartiallyFilled));
        assert!(OrderStatus::Cancelling.can_transition_to(OrderStatus::Filled));
    }
}
