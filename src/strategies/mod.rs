pub mod iceberg;
pub mod limit;
pub mod market;
pub mod smart_router;
pub mod twap;
pub mod vwap;

use serde::{Deserialize, Serialize};

use crate::config::ExecutionConfig;
use crate::error::ExecutionError;
use crate::models::market_data::MarketSnapshot;
use crate::models::order::{Order, OrderId, OrderSide, OrderType};

/// 주문에 태그된 형태로 저장되는 전략 파라미터
///
/// 생략된 필드는 설정 기본값을 따른다.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyParams {
    MarketOrder,
    LimitOrder {
        max_wait_secs: Option<u64>,
        aggressive_after_wait: Option<bool>,
    },
    Twap {
        num_slices: Option<usize>,
        interval_secs: Option<u64>,
        price_limit_buffer: Option<f64>,
    },
    Vwap {
        num_slices: Option<usize>,
        start_offset_secs: Option<u64>,
        end_offset_secs: Option<u64>,
    },
    Iceberg {
        display_size: Option<f64>,
        price_improvement: Option<f64>,
    },
    SmartRouter,
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams::LimitOrder {
            max_wait_secs: None,
            aggressive_after_wait: None,
        }
    }
}

impl StrategyParams {
    pub fn kind(&self) -> &'static str {
        match self {
            StrategyParams::MarketOrder => "market_order",
            StrategyParams::LimitOrder { .. } => "limit_order",
            StrategyParams::Twap { .. } => "twap",
            StrategyParams::Vwap { .. } => "vwap",
            StrategyParams::Iceberg { .. } => "iceberg",
            StrategyParams::SmartRouter => "smart_router",
        }
    }
}

/// 부모 주문에서 파생된 자식 주문 지시
#[derive(Debug, Clone, PartialEq)]
pub struct ChildOrder {
    /// 계획 시작 시점 기준 제출 지연 (밀리초)
    pub offset_ms: i64,
    pub order_type: OrderType,
    pub quantity: f64,
    pub limit_price: Option<f64>,
}

/// 부모 주문 하나의 실행 계획 (전략 엔진이 소유, 저장하지 않음)
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub order_id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub strategy_name: String,
    /// true면 이전 자식이 체결된 뒤에만 다음 자식을 제출한다 (Iceberg)
    pub sequential: bool,
    pub children: Vec<ChildOrder>,
}

impl ExecutionPlan {
    pub fn total_quantity(&self) -> f64 {
        self.children.iter().map(|c| c.quantity).sum()
    }
}

/// 실행 전략 인터페이스
///
/// plan은 주문과 시장 스냅샷만으로 결정되는 순수 함수여야 한다.
pub trait ExecutionStrategy: Send + Sync {
    /// 부모 주문의 실행 계획 수립
    fn plan(&self, order: &Order, snapshot: &MarketSnapshot) -> Result<ExecutionPlan, ExecutionError>;

    /// 전략 이름 가져오기
    fn name(&self) -> &str;
}

/// 주문의 전략 태그에 맞는 플래너 선택
pub fn planner_for(params: &StrategyParams, config: &ExecutionConfig) -> Box<dyn ExecutionStrategy> {
    match params {
        StrategyParams::MarketOrder => Box::new(market::MarketOrderStrategy::new()),
        StrategyParams::LimitOrder {
            max_wait_secs,
            aggressive_after_wait,
        } => Box::new(limit::LimitOrderStrategy::new(
            max_wait_secs.unwrap_or(config.limit.max_wait_secs),
            aggressive_after_wait.unwrap_or(config.limit.aggressive_after_wait),
        )),
        StrategyParams::Twap {
            num_slices,
            interval_secs,
            price_limit_buffer,
        } => Box::new(twap::TwapStrategy::new(
            num_slices.unwrap_or(config.twap.num_slices),
            interval_secs.unwrap_or(config.twap.interval_secs),
            price_limit_buffer.unwrap_or(config.twap.price_limit_buffer),
        )),
        StrategyParams::Vwap {
            num_slices,
            start_offset_secs,
            end_offset_secs,
        } => Box::new(vwap::VwapStrategy::new(
            num_slices.unwrap_or(config.vwap.num_slices),
            start_offset_secs.unwrap_or(config.vwap.start_offset_secs),
            end_offset_secs.unwrap_or(config.vwap.end_offset_secs),
        )),
        StrategyParams::Iceberg {
            display_size,
            price_improvement,
        } => Box::new(iceberg::IcebergStrategy::new(
            display_size.unwrap_or(config.iceberg.display_size),
            price_improvement.unwrap_or(config.iceberg.price_improvement),
        )),
        StrategyParams::SmartRouter => Box::new(smart_router::SmartRouterStrategy::new(config.clone())),
    }
}

/// 스냅샷의 기준 가격 (호가가 있으면 중간가, 없으면 최근 체결가)
pub(crate) fn reference_price(snapshot: &MarketSnapshot) -> f64 {
    if snapshot.bid > 0.0 && snapshot.ask > 0.0 {
        snapshot.mid()
    } else {
        snapshot.last
    }
}

// 핵심 전략 재노출
pub use iceberg::IcebergStrategy;
pub use limit::LimitOrderStrategy;
pub use market::MarketOrderStrategy;
pub use smart_router::SmartRouterStrategy;
pub use twap::TwapStrategy;
pub use vwap::VwapStrategy;
