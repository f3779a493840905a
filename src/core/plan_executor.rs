/**
* filename : plan_executor
* author : HAMA
* date: 2025. 5. 11.
* description:
**/

use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};

use crate::broker::{BrokerGateway, BrokerOrderRef, ChildOrderRequest, FillRouter};
use crate::error::ExecutionError;
use crate::models::order::Order;
use crate::order_core::OrderManager;
use crate::strategies::ExecutionPlan;

const QTY_EPS: f64 = 1e-9;
const SEQUENTIAL_POLL_MS: u64 = 200;

/// 실행 계획 스케줄러
///
/// 부모 주문 하나의 계획을 독립 태스크에서 실행한다.
/// 한 주문의 실행이 다른 주문을 막지 않는다.
pub struct PlanExecutor {
  manager: Arc<OrderManager>,
  fill_router: FillRouter,
}

impl PlanExecutor {
  pub fn new(manager: Arc<OrderManager>, fill_router: FillRouter) -> Self {
    PlanExecutor {
      manager,
      fill_router,
    }
  }

  /// 계획 실행 태스크 시작
  pub fn spawn(&self, gateway: Arc<BrokerGateway>, order: Order, plan: ExecutionPlan) {
    let manager = self.manager.clone();
    let fill_router = self.fill_router.clone();

    tokio::spawn(async move {
      if let Err(e) = Self::run(manager, fill_router, gateway, order, plan).await {
        crate::utils::logging::log_error("계획 실행", &e);
      }
    });
  }

  async fn run(
    manager: Arc<OrderManager>,
    fill_router: FillRouter,
    gateway: Arc<BrokerGateway>,
    order: Order,
    plan: ExecutionPlan,
  ) -> Result<(), ExecutionError> {
    let mut cancel = manager.cancel_receiver(&order.id).await;
    let started = Instant::now();
    let mut outstanding: Vec<BrokerOrderRef> = Vec::new();

    log::info!(
      "계획 실행 시작: 주문 = {} - 전략 = {} - 분할 = {}",
      order.id,
      plan.strategy_name,
      plan.children.len()
    );

    for child in &plan.children {
      // 분할 사이의 취소 신호를 관찰하며 제출 시점까지 대기
      let offset = Duration::from_millis(child.offset_ms.max(0) as u64);
      loop {
        let elapsed = started.elapsed();
        if elapsed >= offset {
          break;
        }
        let remaining_wait = offset - elapsed;
        tokio::select! {
          _ = sleep(remaining_wait) => {}
          _ = cancel.changed() => {}
        }
        if *cancel.borrow() {
          return Self::abort_cancelled(&manager, &gateway, &order, &outstanding).await;
        }
      }
      if *cancel.borrow() {
        return Self::abort_cancelled(&manager, &gateway, &order, &outstanding).await;
      }

      // 현재 잔량에 맞게 자식 수량 보정
      let current = manager.order(&order.id).await?;
      if current.status.is_terminal() {
        return Ok(());
      }
      let remaining = current.remaining_quantity();
      if remaining <= QTY_EPS {
        return Ok(());
      }
      let quantity = child.quantity.min(remaining);
      if quantity <= QTY_EPS {
        continue;
      }

      let request = ChildOrderRequest {
        symbol: order.symbol.clone(),
        side: order.side,
        order_type: child.order_type,
        quantity,
        limit_price: child.limit_price,
        time_in_force: order.time_in_force,
        extended_hours: order.extended_hours,
      };

      match gateway.submit(&request).await {
        Ok(broker_ref) => {
          // 체결이 상태 기계로 흘러갈 수 있도록 접수 직후 경로를 등록한다
          fill_router.register(broker_ref.0.clone(), order.id.clone()).await;
          manager.handle_ack(&order.id, &broker_ref).await?;
          outstanding.push(broker_ref);
        }
        Err(ExecutionError::BrokerPermanent(reason)) => {
          let current = manager.order(&order.id).await?;
          if current.filled_quantity <= QTY_EPS && outstanding.is_empty() {
            manager.handle_reject(&order.id, reason).await?;
          } else {
            // 일부가 이미 제출/체결된 뒤의 실패는 동결 후 수동 처리
            manager.freeze_for_reconciliation(&order.id, reason).await?;
          }
          return Ok(());
        }
        Err(e) => {
          manager
            .freeze_for_reconciliation(&order.id, format!("submission failure: {}", e))
            .await?;
          return Err(e);
        }
      }

      // 순차 계획(Iceberg)은 이전 노출분이 소화된 뒤에만 진행한다
      if plan.sequential {
        let target = (current.filled_quantity + quantity).min(order.quantity);
        loop {
          if *cancel.borrow() {
            return Self::abort_cancelled(&manager, &gateway, &order, &outstanding).await;
          }
          let latest = manager.order(&order.id).await?;
          if latest.status.is_terminal() || latest.filled_quantity >= target - QTY_EPS {
            break;
          }
          tokio::select! {
            _ = sleep(Duration::from_millis(SEQUENTIAL_POLL_MS)) => {}
            _ = cancel.changed() => {}
          }
        }
      }
    }

    // 모든 분할 제출 후에도 주문이 종료될 때까지 취소 신호를 감시한다
    loop {
      if *cancel.borrow() {
        return Self::abort_cancelled(&manager, &gateway, &order, &outstanding).await;
      }
      let latest = manager.order(&order.id).await?;
      if latest.status.is_terminal() {
        return Ok(());
      }
      tokio::select! {
        _ = sleep(Duration::from_millis(SEQUENTIAL_POLL_MS)) => {}
        _ = cancel.changed() => {}
      }
    }
  }

  /// 취소 경로 - 미체결 자식을 브로커에서 거두고 확정한다
  async fn abort_cancelled(
    manager: &Arc<OrderManager>,
    gateway: &Arc<BrokerGateway>,
    order: &Order,
    outstanding: &[BrokerOrderRef],
  ) -> Result<(), ExecutionError> {
    for broker_ref in outstanding {
      match gateway.cancel(broker_ref).await {
        Ok(true) => {
          log::info!("자식 주문 취소 확인: 브로커 주문 ID = {}", broker_ref);
        }
        Ok(false) => {
          // 브로커가 이미 종결로 아는 주문 - 체결이 경합했을 수 있다
          log::warn!("브로커에 이미 없는 자식 주문: 브로커 주문 ID = {}", broker_ref);
        }
        Err(e) => {
          crate::utils::logging::log_error("자식 주문 취소", &e);
        }
      }
    }

    manager.confirm_cancel(&order.id, "user requested").await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use tokio::sync::RwLock;

  use crate::broker::mocks::{MockBroker, MockFillMode};
  use crate::broker::retry::RetryPolicy;
  use crate::config::Config;
  use crate::models::market_data::MarketSnapshot;
  use crate::models::order::{OrderSide, OrderStatus, OrderType};
  use crate::order_core::{InMemoryOrderRepository, OrderEventBus, OrderRepository, ValidatedOrder};
  use crate::strategies::{planner_for, ExecutionStrategy, StrategyParams};

  async fn setup(
    fill_mode: MockFillMode,
  ) -> (
    Arc<OrderManager>,
    PlanExecutor,
    Arc<BrokerGateway>,
    crate::broker::mocks::MockBrokerHandle,
  ) {
    let repository: Arc<RwLock<dyn OrderRepository>> =
      Arc::new(RwLock::new(InMemoryOrderRepository::new()));
    let manager = Arc::new(OrderManager::new(repository, OrderEventBus::default()));

    let broker = MockBroker::new("mock").with_fill_mode(fill_mode);
    let handle = broker.handle();
    let gateway = Arc::new(BrokerGateway::new(
      "mock",
      Box::new(broker),
      6000,
      RetryPolicy::default(),
    ));

    let (fill_router, fill_rx) = FillRouter::new(64);
    if let Some(stream) = gateway.take_fill_stream().await {
      fill_router.attach_stream("mock", stream);
    }
    manager.clone().spawn_fill_loop(fill_rx);

    let executor = PlanExecutor::new(manager.clone(), fill_router);
    (manager, executor, gateway, handle)
  }

  async fn create_order(manager: &Arc<OrderManager>, quantity: f64) -> Order {
    let order = Order::new("pf-1", "AAPL", OrderSide::Buy, OrderType::Limit, quantity)
      .with_limit_price(100.0)
      .with_strategy(StrategyParams::MarketOrder);
    manager
      .create_order(ValidatedOrder {
        order,
        reserved_notional: quantity * 100.0,
      })
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn test_market_plan_fills_order() {
    let (manager, executor, gateway, _) = setup(MockFillMode::Immediate).await;
    let order = create_order(&manager, 10.0).await;

    let snapshot = MarketSnapshot::new("AAPL", 1000, 99.9, 100.1, 100.0);
    let plan = planner_for(&order.strategy, &Config::default().execution)
      .plan(&order, &snapshot)
      .unwrap();

    executor.spawn(gateway, order.clone(), plan);

    // 체결 전파 대기
    for _ in 0..50 {
      tokio::time::sleep(Duration::from_millis(10)).await;
      if manager.order(&order.id).await.unwrap().status == OrderStatus::Filled {
        break;
      }
    }

    let finished = manager.order(&order.id).await.unwrap();
    assert_eq!(finished.status, OrderStatus::Filled);
    assert!((finished.filled_quantity - 10.0).abs() < 1e-9);
  }

  #[tokio::test]
  async fn test_cancel_between_slices_stops_plan() {
    let (manager, executor, gateway, handle) = setup(MockFillMode::Manual).await;
    let order = create_order(&manager, 100.0).await;

    // 분할 간격이 긴 TWAP 계획
    let snapshot = MarketSnapshot::new("AAPL", 1000, 99.9, 100.1, 100.0);
    let params = StrategyParams::Twap {
      num_slices: Some(5),
      interval_secs: Some(60),
      price_limit_buffer: None,
    };
    let plan = planner_for(&params, &Config::default().execution)
      .plan(&order, &snapshot)
      .unwrap();

    executor.spawn(gateway, order.clone(), plan);

    // 첫 분할 제출까지 대기
    for _ in 0..50 {
      tokio::time::sleep(Duration::from_millis(10)).await;
      if handle.submission_count() == 1 {
        break;
      }
    }
    assert_eq!(handle.submission_count(), 1);

    manager.request_cancel(&order.id).await.unwrap();

    // 취소 확정 대기
    for _ in 0..50 {
      tokio::time::sleep(Duration::from_millis(10)).await;
      if manager.order(&order.id).await.unwrap().status == OrderStatus::Cancelled {
        break;
      }
    }

    let finished = manager.order(&order.id).await.unwrap();
    assert_eq!(finished.status, OrderStatus::Cancelled);
    // 남은 분할은 제출되지 않는다
    assert_eq!(handle.submission_count(), 1);
  }
}
