//! 주문 수명주기 통합 테스트
//!
//! 상태 기계, 체결 순서 보장, 취소 경합, 브로커 장애 경로 검증

use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;

use xExec::broker::mocks::{MockBroker, MockBrokerHandle, MockFillMode};
use xExec::broker::retry::{RetryPolicy, REASON_BROKER_UNAVAILABLE};
use xExec::broker::{BrokerGateway, FillRouter};
use xExec::config::Config;
use xExec::core::PlanExecutor;
use xExec::models::market_data::MarketSnapshot;
use xExec::models::order::{Order, OrderSide, OrderStatus, OrderType};
use xExec::order_core::{
  InMemoryOrderRepository, OrderEventBus, OrderManager, OrderRepository, ValidatedOrder,
};
use xExec::strategies::{planner_for, StrategyParams};

struct Harness {
  manager: Arc<OrderManager>,
  executor: PlanExecutor,
  gateway: Arc<BrokerGateway>,
  handle: MockBrokerHandle,
}

async fn harness(fill_mode: MockFillMode, retry: RetryPolicy) -> Harness {
  let repository: Arc<RwLock<dyn OrderRepository>> =
    Arc::new(RwLock::new(InMemoryOrderRepository::new()));
  let manager = Arc::new(OrderManager::new(repository, OrderEventBus::default()));

  let broker = MockBroker::new("mock").with_fill_mode(fill_mode);
  let handle = broker.handle();
  let gateway = Arc::new(BrokerGateway::new("mock", Box::new(broker), 6_000, retry));

  let (fill_router, fill_rx) = FillRouter::new(256);
  if let Some(stream) = gateway.take_fill_stream().await {
    fill_router.attach_stream("mock", stream);
  }
  manager.clone().spawn_fill_loop(fill_rx);

  let executor = PlanExecutor::new(manager.clone(), fill_router);
  Harness {
    manager,
    executor,
    gateway,
    handle,
  }
}

async fn submitted_order(h: &Harness, quantity: f64, strategy: StrategyParams) -> Order {
  let order = Order::new("pf-1", "AAPL", OrderSide::Buy, OrderType::Limit, quantity)
    .with_limit_price(100.0)
    .with_strategy(strategy);
  let order = h
    .manager
    .create_order(ValidatedOrder {
      order,
      reserved_notional: quantity * 100.0,
    })
    .await
    .unwrap();

  let snapshot = MarketSnapshot::new("AAPL", 1_000, 99.9, 100.1, 100.0).with_volume(1_000_000.0);
  let plan = planner_for(&order.strategy, &Config::default().execution)
    .plan(&order, &snapshot)
    .unwrap();
  h.executor.spawn(h.gateway.clone(), order.clone(), plan);
  order
}

async fn wait_for_status(h: &Harness, order: &Order, status: OrderStatus) -> Order {
  for _ in 0..100 {
    tokio::time::sleep(Duration::from_millis(10)).await;
    let current = h.manager.order(&order.id).await.unwrap();
    if current.status == status {
      return current;
    }
  }
  h.manager.order(&order.id).await.unwrap()
}

#[tokio::test]
async fn test_market_order_reaches_filled() {
  let h = harness(MockFillMode::Immediate, RetryPolicy::default()).await;
  let order = submitted_order(&h, 10.0, StrategyParams::MarketOrder).await;

  let finished = wait_for_status(&h, &order, OrderStatus::Filled).await;
  assert_eq!(finished.status, OrderStatus::Filled);
  assert!((finished.filled_quantity - 10.0).abs() < 1e-9);

  // 체결 합계는 주문 수량과 정확히 일치
  let trades = h.manager.trades(&order.id).await.unwrap();
  let total: f64 = trades.iter().map(|t| t.quantity).sum();
  assert!((total - finished.quantity).abs() < 1e-9);
}

#[tokio::test]
async fn test_out_of_order_fills_converge_to_same_result() {
  // 도착 순서만 다른 동일한 체결 묶음 두 개
  let fills = [(1u64, 4.0, 100.0), (2u64, 6.0, 101.0)];

  let mut results = Vec::new();
  for arrival in [[0usize, 1], [1, 0]] {
    let h = harness(MockFillMode::Manual, RetryPolicy::default()).await;
    let order = submitted_order(&h, 10.0, StrategyParams::MarketOrder).await;

    // 자식 주문 접수 대기
    wait_for_status(&h, &order, OrderStatus::Submitted).await;

    for idx in arrival {
      let (sequence, quantity, price) = fills[idx];
      h.handle.push_fill("mock-1", sequence, quantity, price);
    }

    let finished = wait_for_status(&h, &order, OrderStatus::Filled).await;
    results.push((finished.filled_quantity, finished.average_fill_price));
  }

  // 최종 상태는 도착 순서와 무관하다
  assert!((results[0].0 - results[1].0).abs() < 1e-9);
  assert!((results[0].1 - results[1].1).abs() < 1e-9);
  assert!((results[0].1 - 100.6).abs() < 1e-9);
}

#[tokio::test]
async fn test_filled_quantity_never_exceeds_quantity() {
  let h = harness(MockFillMode::Manual, RetryPolicy::default()).await;
  let order = submitted_order(&h, 10.0, StrategyParams::MarketOrder).await;

  wait_for_status(&h, &order, OrderStatus::Submitted).await;

  // 순차 체결로 전 구간에서 불변식 확인
  for sequence in 1..=5u64 {
    h.handle.push_fill("mock-1", sequence, 2.0, 100.0);
    tokio::time::sleep(Duration::from_millis(30)).await;
    let current = h.manager.order(&order.id).await.unwrap();
    assert!(current.filled_quantity <= current.quantity + 1e-9);
  }

  let finished = h.manager.order(&order.id).await.unwrap();
  assert_eq!(finished.status, OrderStatus::Filled);
}

#[tokio::test]
async fn test_cancel_already_filled_is_explicit_error() {
  let h = harness(MockFillMode::Immediate, RetryPolicy::default()).await;
  let order = submitted_order(&h, 10.0, StrategyParams::MarketOrder).await;
  wait_for_status(&h, &order, OrderStatus::Filled).await;

  let err = h.manager.request_cancel(&order.id).await.unwrap_err();
  assert!(matches!(err, xExec::ExecutionError::AlreadyTerminal(_)));
}

#[tokio::test]
async fn test_broker_unavailable_after_retry_exhaustion() {
  let mut retry = RetryPolicy::new(3, 1);
  retry.jitter = 0.0;
  let h = harness(MockFillMode::Manual, retry).await;
  h.handle.fail_next_submissions(10);

  let order = submitted_order(&h, 10.0, StrategyParams::MarketOrder).await;

  let finished = wait_for_status(&h, &order, OrderStatus::Rejected).await;
  assert_eq!(finished.status, OrderStatus::Rejected);
  assert_eq!(finished.reason.as_deref(), Some(REASON_BROKER_UNAVAILABLE));
  // 브로커에 접수된 주문은 없다
  assert_eq!(h.handle.submission_count(), 0);
}

#[tokio::test]
async fn test_late_fill_after_cancel_request_is_kept() {
  let h = harness(MockFillMode::Manual, RetryPolicy::default()).await;
  let order = submitted_order(&h, 10.0, StrategyParams::MarketOrder).await;

  for _ in 0..100 {
    tokio::time::sleep(Duration::from_millis(10)).await;
    if h.handle.submission_count() == 1 {
      break;
    }
  }
  wait_for_status(&h, &order, OrderStatus::Submitted).await;

  // 취소 전에 도착한 부분 체결
  h.handle.push_fill("mock-1", 1, 4.0, 100.0);
  wait_for_status(&h, &order, OrderStatus::PartiallyFilled).await;

  h.manager.request_cancel(&order.id).await.unwrap();

  // 취소 확정 대기 (실행기가 브로커 취소 후 확정)
  let finished = wait_for_status(&h, &order, OrderStatus::Cancelled).await;
  assert_eq!(finished.status, OrderStatus::Cancelled);
  // 부분 체결은 취소로 사라지지 않는다
  assert!((finished.filled_quantity - 4.0).abs() < 1e-9);

  let trades = h.manager.trades(&order.id).await.unwrap();
  assert_eq!(trades.len(), 1);
}
