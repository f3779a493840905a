//! 지정가 전략
//!
//! 지정가 자식 주문 하나를 제출하고, 대기 한도를 넘기면
//! 설정에 따라 스프레드를 넘는 공격적 주문으로 전환

use crate::error::ExecutionError;
use crate::models::market_data::MarketSnapshot;
use crate::models::order::{Order, OrderSide, OrderType};
use crate::strategies::{ChildOrder, ExecutionPlan, ExecutionStrategy};

/// 지정가 실행 전략 (기본 전략)
pub struct LimitOrderStrategy {
    name: String,
    /// 최초 지정가 주문 대기 한도 (초)
    max_wait_secs: u64,
    /// 대기 초과 시 공격적 전환 여부
    aggressive_after_wait: bool,
}

impl LimitOrderStrategy {
    pub fn new(max_wait_secs: u64, aggressive_after_wait: bool) -> Self {
        LimitOrderStrategy {
            name: "limit_order".to_string(),
            max_wait_secs,
            aggressive_after_wait,
        }
    }
}

impl ExecutionStrategy for LimitOrderStrategy {
    fn plan(&self, order: &Order, snapshot: &MarketSnapshot) -> Result<ExecutionPlan, ExecutionError> {
        let limit_price = order
            .limit_price
            .unwrap_or_else(|| crate::strategies::reference_price(snapshot));

        let mut children = vec![ChildOrder {
            offset_ms: 0,
            order_type: OrderType::Limit,
            quantity: order.quantity,
            limit_price: Some(limit_price),
        }];

        // 대기 초과 시 미체결 잔량을 반대 호가로 건너가 잡는다.
        // 잔량 반영은 제출 시점에 실행기가 수행한다.
        if self.aggressive_after_wait {
            let aggressive_price = match order.side {
                OrderSide::Buy => snapshot.ask,
                OrderSide::Sell => snapshot.bid,
            };
            children.push(ChildOrder {
                offset_ms: self.max_wait_secs as i64 * 1000,
                order_type: OrderType::Limit,
                quantity: order.quantity,
                limit_price: Some(aggressive_price),
            });
        }

        Ok(ExecutionPlan {
            order_id: order.id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            strategy_name: self.name.clone(),
            sequential: false,
            children,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot::new("AAPL", 1000, 99.9, 100.1, 100.0)
    }

    #[test]
    fn test_limit_plan_uses_order_price() {
        let order = Order::new("pf-1", "AAPL", OrderSide::Buy, OrderType::Limit, 10.0)
            .with_limit_price(99.5);

        let plan = LimitOrderStrategy::new(30, false).plan(&order, &snapshot()).unwrap();

        assert_eq!(plan.children.len(), 1);
        assert_eq!(plan.children[0].limit_price, Some(99.5));
    }

    #[test]
    fn test_aggressive_follow_up_crosses_spread() {
        let order = Order::new("pf-1", "AAPL", OrderSide::Buy, OrderType::Limit, 10.0)
            .with_limit_price(99.5);

        let plan = LimitOrderStrategy::new(30, true).plan(&order, &snapshot()).unwrap();

        assert_eq!(plan.children.len(), 2);
        assert_eq!(plan.children[1].offset_ms, 30_000);
        // 매수는 매도 호가를 잡는다
        assert_eq!(plan.children[1].limit_price, Some(100.1));

        let order = Order::new("pf-1", "AAPL", OrderSide::Sell, OrderType::Limit, 10.0)
            .with_limit_price(100.5);
        let plan = LimitOrderStrategy::new(30, true).plan(&order, &snapshot()).unwrap();
        assert_eq!(plan.children[1].limit_price, Some(99.9));
    }
}
