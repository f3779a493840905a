//! TWAP 전략
//!
//! 시간 가중 평균 가격 기반 주문 실행 전략

use crate::error::ExecutionError;
use crate::models::market_data::MarketSnapshot;
use crate::models::order::{Order, OrderSide, OrderType};
use crate::strategies::{ChildOrder, ExecutionPlan, ExecutionStrategy};

/// TWAP 실행 전략
///
/// 총 수량을 동일 크기 분할로 나누어 일정 간격으로 제출한다.
pub struct TwapStrategy {
    /// 전략 이름
    name: String,
    /// 분할 수
    num_slices: usize,
    /// 분할 간 간격 (초)
    interval_secs: u64,
    /// 기준가 대비 허용 가격 버퍼 (비율)
    price_limit_buffer: f64,
}

impl TwapStrategy {
    /// 새 TWAP 전략 생성
    pub fn new(num_slices: usize, interval_secs: u64, price_limit_buffer: f64) -> Self {
        TwapStrategy {
            name: "twap".to_string(),
            num_slices,
            interval_secs,
            price_limit_buffer,
        }
    }
}

impl ExecutionStrategy for TwapStrategy {
    fn plan(&self, order: &Order, snapshot: &MarketSnapshot) -> Result<ExecutionPlan, ExecutionError> {
        if self.num_slices == 0 {
            return Err(ExecutionError::ConfigError("twap num_slices must be positive".to_string()));
        }

        let reference = crate::strategies::reference_price(snapshot);

        // 매수는 버퍼만큼 위까지, 매도는 아래까지 허용
        let bounded_price = match order.side {
            OrderSide::Buy => reference * (1.0 + self.price_limit_buffer),
            OrderSide::Sell => reference * (1.0 - self.price_limit_buffer),
        };

        let slice_quantity = order.quantity / self.num_slices as f64;
        let mut children = Vec::with_capacity(self.num_slices);
        let mut allocated = 0.0;

        for i in 0..self.num_slices {
            // 반올림 잔량은 마지막 분할에 실어 합이 정확히 맞도록 한다
            let quantity = if i == self.num_slices - 1 {
                order.quantity - allocated
            } else {
                slice_quantity
            };
            allocated += quantity;

            children.push(ChildOrder {
                offset_ms: i as i64 * self.interval_secs as i64 * 1000,
                order_type: OrderType::Limit,
                quantity,
                limit_price: Some(bounded_price),
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
