//! 시장가 전략
//!
//! 전체 수량을 즉시 시장가 자식 주문 하나로 제출

use crate::error::ExecutionError;
use crate::models::market_data::MarketSnapshot;
use crate::models::order::{Order, OrderType};
use crate::strategies::{ChildOrder, ExecutionPlan, ExecutionStrategy};

/// 시장가 실행 전략
pub struct MarketOrderStrategy {
    name: String,
}

impl MarketOrderStrategy {
    pub fn new() -> Self {
        MarketOrderStrategy {
            name: "market_order".to_string(),
        }
    }
}

impl Default for MarketOrderStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionStrategy for MarketOrderStrategy {
    fn plan(&self, order: &Order, _snapshot: &MarketSnapshot) -> Result<ExecutionPlan, ExecutionError> {
        Ok(ExecutionPlan {
            order_id: order.id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            strategy_name: self.name.clone(),
            sequential: false,
            children: vec![ChildOrder {
                offset_ms: 0,
                order_type: OrderType::Market,
                quantity: order.quantity,
                limit_price: None,
            }],
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{OrderSide, OrderType};

    #[test]
    fn test_market_plan_is_single_immediate_child() {
        let order = Order::new("pf-1", "AAPL", OrderSide::Buy, OrderType::Market, 50.0);
        let snapshot = MarketSnapshot::new("AAPL", 1000, 100.0, 100.1, 100.05);

        let plan = MarketOrderStrategy::new().plan(&order, &snapshot).unwrap();

        assert_eq!(plan.children.len(), 1);
        assert_eq!(plan.children[0].offset_ms, 0);
        assert_eq!(plan.children[0].order_type, OrderType::Market);
        assert_eq!(plan.total_quantity(), 50.0);
    }
}
