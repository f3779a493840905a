//! Iceberg 전략
//!
//! 총 수량 중 노출 수량만 반복 제출해 대량 주문을 시장에 드러내지 않는 전략

use crate::error::ExecutionError;
use crate::models::market_data::MarketSnapshot;
use crate::models::order::{Order, OrderSide, OrderType};
use crate::strategies::{ChildOrder, ExecutionPlan, ExecutionStrategy};

/// Iceberg 실행 전략
pub struct IcebergStrategy {
    /// 전략 이름
    name: String,
    /// 한 번에 노출할 수량
    display_size: f64,
    /// 최우선 호가 대비 가격 개선 폭
    price_improvement: f64,
}

impl IcebergStrategy {
    /// 새 Iceberg 전략 생성
    pub fn new(display_size: f64, price_improvement: f64) -> Self {
        IcebergStrategy {
            name: "iceberg".to_string(),
            display_size,
            price_improvement,
        }
    }
}

impl ExecutionStrategy for IcebergStrategy {
    fn plan(&self, order: &Order, snapshot: &MarketSnapshot) -> Result<ExecutionPlan, ExecutionError> {
        if self.display_size <= 0.0 {
            return Err(ExecutionError::ConfigError("iceberg display_size must be positive".to_string()));
        }

        // 최우선 호가에서 개선 폭만큼 안쪽에 놓는다
        let price = match order.side {
            OrderSide::Buy => snapshot.bid + self.price_improvement,
            OrderSide::Sell => snapshot.ask - self.price_improvement,
        };

        let display = self.display_size.min(order.quantity);
        let num_children = (order.quantity / display).ceil() as usize;
        let mut children = Vec::with_capacity(num_children);
        let mut remaining = order.quantity;

        while remaining > 0.0 {
            let quantity = display.min(remaining);
            children.push(ChildOrder {
                offset_ms: 0,
                order_type: OrderType::Limit,
                quantity,
                limit_price: Some(price),
            });
            remaining -= quantity;
        }

        Ok(ExecutionPlan {
            order_id: order.id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            strategy_name: self.name.clone(),
            // 이전 노출분이 체결된 뒤에만 다음 분량을 드러낸다
            sequential: true,
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
    fn test_iceberg_reveals_display_size_only() {
        let order = Order::new("pf-1", "AAPL", OrderSide::Buy, OrderType::Limit, 10.0);
        let plan = IcebergStrategy::new(3.0, 0.01).plan(&order, &snapshot()).unwrap();

        assert!(plan.sequential);
        assert_eq!(plan.children.len(), 4); // 3 + 3 + 3 + 1
        assert!((plan.children[0].quantity - 3.0).abs() < 1e-9);
        assert!((plan.children[3].quantity - 1.0).abs() < 1e-9);
        assert!((plan.total_quantity() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_iceberg_price_improvement() {
        let order = Order::new("pf-1", "AAPL", OrderSide::Buy, OrderType::Limit, 5.0);
        let plan = IcebergStrategy::new(5.0, 0.05).plan(&order, &snapshot()).unwrap();

        // 매수는 최우선 매수 호가 위에 놓는다
        assert!((plan.children[0].limit_price.unwrap() - 99.95).abs() < 1e-9);

        let sell = Order::new("pf-1", "AAPL", OrderSide::Sell, OrderType::Limit, 5.0);
        let plan = IcebergStrategy::new(5.0, 0.05).plan(&sell, &snapshot()).unwrap();
        assert!((plan.children[0].limit_price.unwrap() - 100.05).abs() < 1e-9);
    }
}
