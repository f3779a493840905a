//! 스마트 라우터
//!
//! 실시간 유동성/변동성/스프레드를 보고 전문 전략을 선택한다.
//! 여러 임계값이 동시에 걸리면 변동성 -> 유동성 -> 스프레드 순서로
//! 먼저 걸린 경로를 택하고, 아무것도 걸리지 않으면 지정가로 돌아간다.

use crate::config::ExecutionConfig;
use crate::error::ExecutionError;
use crate::models::market_data::MarketSnapshot;
use crate::models::order::Order;
use crate::strategies::{
    ExecutionPlan, ExecutionStrategy, IcebergStrategy, LimitOrderStrategy, TwapStrategy, VwapStrategy,
};

/// 스마트 라우팅 전략
pub struct SmartRouterStrategy {
    name: String,
    config: ExecutionConfig,
}

impl SmartRouterStrategy {
    pub fn new(config: ExecutionConfig) -> Self {
        SmartRouterStrategy {
            name: "smart_router".to_string(),
            config,
        }
    }

    /// 선택된 경로 이름 (관측/테스트용)
    pub fn route(&self, order: &Order, snapshot: &MarketSnapshot) -> &'static str {
        let thresholds = &self.config.smart_router;

        if snapshot.volatility > thresholds.volatility_threshold {
            return "twap";
        }

        if snapshot.day_volume > 0.0
            && order.quantity / snapshot.day_volume > thresholds.liquidity_threshold
        {
            return "iceberg";
        }

        if snapshot.spread_bps() > thresholds.spread_threshold_bps {
            return "vwap";
        }

        "limit_order"
    }
}

impl ExecutionStrategy for SmartRouterStrategy {
    fn plan(&self, order: &Order, snapshot: &MarketSnapshot) -> Result<ExecutionPlan, ExecutionError> {
        let delegate: Box<dyn ExecutionStrategy> = match self.route(order, snapshot) {
            "twap" => Box::new(TwapStrategy::new(
                self.config.twap.num_slices,
                self.config.twap.interval_secs,
                self.config.twap.price_limit_buffer,
            )),
            "iceberg" => Box::new(IcebergStrategy::new(
                self.config.iceberg.display_size,
                self.config.iceberg.price_improvement,
            )),
            "vwap" => Box::new(VwapStrategy::new(
                self.config.vwap.num_slices,
                self.config.vwap.start_offset_secs,
                self.config.vwap.end_offset_secs,
            )),
            _ => Box::new(LimitOrderStrategy::new(
                self.config.limit.max_wait_secs,
                self.config.limit.aggressive_after_wait,
            )),
        };

        let mut plan = delegate.plan(order, snapshot)?;
        plan.strategy_name = format!("{}:{}", self.name, plan.strategy_name);
        Ok(plan)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
