//! VWAP 전략
//!
//! 일중 거래량 프로파일에 비례해 수량을 분배하는 실행 전략

use crate::error::ExecutionError;
use crate::models::market_data::MarketSnapshot;
use crate::models::order::{Order, OrderType};
use crate::strategies::{ChildOrder, ExecutionPlan, ExecutionStrategy};

/// VWAP 실행 전략
pub struct VwapStrategy {
    /// 전략 이름
    name: String,
    /// 분할 수
    num_slices: usize,
    /// 실행 시작 오프셋 (초)
    start_offset_secs: u64,
    /// 실행 종료 오프셋 (초)
    end_offset_secs: u64,
}

impl VwapStrategy {
    /// 새 VWAP 전략 생성
    pub fn new(num_slices: usize, start_offset_secs: u64, end_offset_secs: u64) -> Self {
        VwapStrategy {
            name: "vwap".to_string(),
            num_slices,
            start_offset_secs,
            end_offset_secs,
        }
    }

    /// 거래량 프로파일을 분할 수에 맞는 비중으로 변환
    ///
    /// 프로파일이 없으면 균등 비중으로 대체한다.
    fn slice_weights(&self, profile: &[f64]) -> Vec<f64> {
        if profile.is_empty() || profile.iter().sum::<f64>() <= 0.0 {
            return vec![1.0 / self.num_slices as f64; self.num_slices];
        }

        // 프로파일 구간을 분할 버킷으로 합산
        let mut weights = vec![0.0; self.num_slices];
        for (i, v) in profile.iter().enumerate() {
            let bucket = i * self.num_slices / profile.len();
            weights[bucket.min(self.num_slices - 1)] += v.max(0.0);
        }

        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return vec![1.0 / self.num_slices as f64; self.num_slices];
        }

        weights.iter().map(|w| w / total).collect()
    }
}

impl ExecutionStrategy for VwapStrategy {
    fn plan(&self, order: &Order, snapshot: &MarketSnapshot) -> Result<ExecutionPlan, ExecutionError> {
        if self.num_slices == 0 {
            return Err(ExecutionError::ConfigError("vwap num_slices must be positive".to_string()));
        }
        if self.end_offset_secs <= self.start_offset_secs {
            return Err(ExecutionError::ConfigError(
                "vwap end offset must exceed start offset".to_string(),
            ));
        }

        let weights = self.slice_weights(&snapshot.volume_profile);
        let window_ms = (self.end_offset_secs - self.start_offset_secs) as i64 * 1000;
        let slice_interval_ms = window_ms / self.num_slices as i64;

        let mut children = Vec::with_capacity(self.num_slices);
        let mut allocated = 0.0;

        for (i, weight) in weights.iter().enumerate() {
            let quantity = if i == self.num_slices - 1 {
                order.quantity - allocated
            } else {
                order.quantity * weight
            };
            allocated += quantity;

            children.push(ChildOrder {
                offset_ms: self.start_offset_secs as i64 * 1000 + i as i64 * slice_interval_ms,
                order_type: OrderType::Market,
                quantity,
                limit_price: None,
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
    use crate::models::order::OrderSide;

    #[test]
    fn test_vwap_uniform_without_profile() {
        let order = Order::new("pf-1", "AAPL", OrderSide::Buy, OrderType::Market, 100.0);
        let snapshot = MarketSnapshot::new("AAPL", 1000, 99.9, 100.1, 100.0);

        let plan = VwapStrategy::new(4, 0, 1200).plan(&order, &snapshot).unwrap();

        assert_eq!(plan.children.len(), 4);
        for child in &plan.children {
            assert!((child.quantity - 25.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_vwap_follows_volume_profile() {
        let order = Order::new("pf-1", "AAPL", OrderSide::Buy, OrderType::Market, 100.0);
        let snapshot = MarketSnapshot::new("AAPL", 1000, 99.9, 100.1, 100.0)
            .with_volume_profile(vec![3.0, 1.0, 1.0, 1.0]);

        let plan = VwapStrategy::new(4, 0, 1200).plan(&order, &snapshot).unwrap();

        // 첫 구간에 거래량이 몰리면 첫 분할이 가장 크다
        assert!(plan.children[0].quantity > plan.children[1].quantity);
        assert!((plan.children[0].quantity - 50.0).abs() < 1e-9);
        assert!((plan.total_quantity() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_vwap_offsets_span_window() {
        let order = Order::new("pf-1", "AAPL", OrderSide::Buy, OrderType::Market, 100.0);
        let snapshot = MarketSnapshot::new("AAPL", 1000, 99.9, 100.1, 100.0);

        let plan = VwapStrategy::new(2, 600, 1800).plan(&order, &snapshot).unwrap();

        assert_eq!(plan.children[0].offset_ms, 600_000);
        assert_eq!(plan.children[1].offset_ms, 1_200_000);
    }

    #[test]
    fn test_vwap_invalid_window() {
        let order = Order::new("pf-1", "AAPL", OrderSide::Buy, OrderType::Market, 100.0);
        let snapshot = MarketSnapshot::new("AAPL", 1000, 99.9, 100.1, 100.0);

        assert!(VwapStrategy::new(2, 600, 600).plan(&order, &snapshot).is_err());
    }
}
