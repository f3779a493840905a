//! 실행 계획 테스트
//!
//! TWAP/VWAP/Iceberg/스마트 라우터 계획 수립 검증

use rstest::rstest;

use xExec::config::Config;
use xExec::models::market_data::MarketSnapshot;
use xExec::models::order::{Order, OrderSide, OrderType};
use xExec::strategies::{planner_for, ExecutionStrategy, StrategyParams, TwapStrategy};

fn snapshot() -> MarketSnapshot {
  MarketSnapshot::new("AAPL", 1_000, 99.9, 100.1, 100.0)
    .with_volume(10_000_000.0)
    .with_volatility(0.5)
}

fn order(quantity: f64) -> Order {
  Order::new("pf-1", "AAPL", OrderSide::Buy, OrderType::Limit, quantity).with_limit_price(100.0)
}

#[test]
fn test_twap_100_by_5_is_exactly_20_each() {
  let plan = TwapStrategy::new(5, 60, 0.002)
    .plan(&order(100.0), &snapshot())
    .unwrap();

  assert_eq!(plan.children.len(), 5);
  for child in &plan.children {
    assert!((child.quantity - 20.0).abs() < 1e-9);
  }
  assert!((plan.total_quantity() - 100.0).abs() < 1e-9);
}

#[rstest]
#[case(100.0, 5)]
#[case(10.0, 3)]
#[case(7.5, 4)]
#[case(1.0, 7)]
fn test_twap_slices_always_sum_to_total(#[case] quantity: f64, #[case] num_slices: usize) {
  let plan = TwapStrategy::new(num_slices, 60, 0.002)
    .plan(&order(quantity), &snapshot())
    .unwrap();

  assert_eq!(plan.children.len(), num_slices);
  // 반올림 잔량은 마지막 분할로 흡수된다
  assert!((plan.total_quantity() - quantity).abs() < 1e-9);
}

#[test]
fn test_vwap_weights_follow_profile() {
  let config = Config::default();
  let params = StrategyParams::Vwap {
    num_slices: Some(4),
    start_offset_secs: Some(0),
    end_offset_secs: Some(1200),
  };
  let snapshot = snapshot().with_volume_profile(vec![4.0, 2.0, 1.0, 1.0]);

  let plan = planner_for(&params, &config.execution)
    .plan(&order(80.0), &snapshot)
    .unwrap();

  assert_eq!(plan.children.len(), 4);
  assert!((plan.children[0].quantity - 40.0).abs() < 1e-9);
  assert!((plan.total_quantity() - 80.0).abs() < 1e-9);
}

#[test]
fn test_iceberg_is_sequential_with_display_slices() {
  let config = Config::default();
  let params = StrategyParams::Iceberg {
    display_size: Some(30.0),
    price_improvement: Some(0.01),
  };

  let plan = planner_for(&params, &config.execution)
    .plan(&order(100.0), &snapshot())
    .unwrap();

  assert!(plan.sequential);
  assert_eq!(plan.children.len(), 4); // 30 + 30 + 30 + 10
  assert!((plan.children[3].quantity - 10.0).abs() < 1e-9);
}

#[test]
fn test_default_strategy_is_limit_order() {
  let config = Config::default();
  let order = order(10.0);

  let plan = planner_for(&order.strategy, &config.execution)
    .plan(&order, &snapshot())
    .unwrap();

  assert!(plan.strategy_name.contains("limit_order"));
  assert_eq!(plan.children[0].limit_price, Some(100.0));
}

#[rstest]
#[case(5.0, 1_000_000.0, 1.0, "twap")] // 높은 변동성
#[case(0.5, 1_000.0, 100.0, "iceberg")] // 얕은 유동성
#[case(0.5, 10_000_000.0, 1.0, "limit_order")] // 평온한 시장
fn test_smart_router_threshold_paths(
  #[case] volatility: f64,
  #[case] day_volume: f64,
  #[case] quantity: f64,
  #[case] expected: &str,
) {
  let config = Config::default();
  let snapshot = MarketSnapshot::new("AAPL", 1_000, 99.99, 100.01, 100.0)
    .with_volume(day_volume)
    .with_volatility(volatility);

  let plan = planner_for(&StrategyParams::SmartRouter, &config.execution)
    .plan(&order(quantity), &snapshot)
    .unwrap();

  assert!(
    plan.strategy_name.ends_with(expected),
    "expected {} got {}",
    expected,
    plan.strategy_name
  );
}
