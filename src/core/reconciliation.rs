/**
* filename : reconciliation
* author : HAMA
* date: 2025. 5. 12.
* description:
**/

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::broker::BrokerGateway;
use crate::error::ExecutionError;
use crate::order_core::OrderManager;

/// 기동 정합성 점검 결과
#[derive(Debug, Clone, Default)]
pub struct ReconciliationSummary {
  /// 점검한 원장 미종료 주문 수
  pub checked: usize,
  /// 동결된 주문 수
  pub frozen: usize,
  /// 원장이 모르는 브로커 측 미체결 주문
  pub unmatched_broker_orders: Vec<String>,
}

/// 원장-브로커 정합성 점검기
///
/// 원장이 단일 진실 공급원이고, 메모리 상태는 재기동 시
/// 원장과 브로커 조회로 다시 만든다. 불일치는 추측으로 메우지 않고
/// 주문을 동결해 수동/자동 해소를 기다린다.
pub struct Reconciler {
  manager: Arc<OrderManager>,
  gateways: HashMap<String, Arc<BrokerGateway>>,
}

impl Reconciler {
  pub fn new(manager: Arc<OrderManager>, gateways: HashMap<String, Arc<BrokerGateway>>) -> Self {
    Reconciler { manager, gateways }
  }

  /// 기동 시 각 활성 브로커 계정의 미체결 주문과 원장을 대조한다
  pub async fn run_startup_reconciliation(&self) -> Result<ReconciliationSummary, ExecutionError> {
    let mut summary = ReconciliationSummary::default();

    // 브로커 측 미체결 주문 수집
    let mut broker_open: HashSet<String> = HashSet::new();
    for (name, gateway) in &self.gateways {
      match gateway.open_orders().await {
        Ok(refs) => {
          for broker_ref in refs {
            broker_open.insert(broker_ref.0);
          }
        }
        Err(e) => {
          log::error!("브로커 미체결 조회 실패: 브로커 = {} - {}", name, e);
        }
      }
    }

    // 원장 측 미종료 주문 대조
    let open_orders = self.manager.open_orders().await?;
    summary.checked = open_orders.len();
    let mut matched: HashSet<String> = HashSet::new();

    for order in open_orders {
      match &order.broker_order_id {
        Some(broker_order_id) if broker_open.contains(broker_order_id) => {
          matched.insert(broker_order_id.clone());
        }
        Some(broker_order_id) => {
          // 원장은 열려 있다고 믿지만 브로커는 모르는 주문
          self
            .manager
            .freeze_for_reconciliation(
              &order.id,
              format!("broker does not report open order {}", broker_order_id),
            )
            .await?;
          summary.frozen += 1;
        }
        None => {
          // 접수 확인 전에 중단된 주문
          self
            .manager
            .freeze_for_reconciliation(&order.id, "no broker acknowledgement on record")
            .await?;
          summary.frozen += 1;
        }
      }
    }

    // 브로커만 아는 주문은 보고만 하고 건드리지 않는다
    for broker_order_id in broker_open {
      if !matched.contains(&broker_order_id) {
        log::error!(
          "원장에 없는 브로커 미체결 주문: 브로커 주문 ID = {}",
          broker_order_id
        );
        summary.unmatched_broker_orders.push(broker_order_id);
      }
    }

    log::info!(
      "기동 정합성 점검 완료: 점검 = {} - 동결 = {} - 미매칭 = {}",
      summary.checked,
      summary.frozen,
      summary.unmatched_broker_orders.len()
    );

    Ok(summary)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::sync::RwLock;

  use crate::broker::mocks::{MockBroker, MockFillMode};
  use crate::broker::retry::RetryPolicy;
  use crate::broker::traits::BrokerOrderRef;
  use crate::models::order::{Order, OrderSide, OrderStatus, OrderType};
  use crate::order_core::{InMemoryOrderRepository, OrderEventBus, OrderRepository, ValidatedOrder};

  async fn setup() -> (Arc<OrderManager>, Arc<BrokerGateway>) {
    let repository: Arc<RwLock<dyn OrderRepository>> =
      Arc::new(RwLock::new(InMemoryOrderRepository::new()));
    let manager = Arc::new(OrderManager::new(repository, OrderEventBus::default()));
    let broker = MockBroker::new("mock").with_fill_mode(MockFillMode::Manual);
    let gateway = Arc::new(BrokerGateway::new(
      "mock",
      Box::new(broker),
      6000,
      RetryPolicy::default(),
    ));
    (manager, gateway)
  }

  async fn create_submitted(manager: &Arc<OrderManager>, broker_order_id: &str) -> Order {
    let order = Order::new("pf-1", "AAPL", OrderSide::Buy, OrderType::Limit, 10.0)
      .with_limit_price(100.0);
    let created = manager
      .create_order(ValidatedOrder {
        order,
        reserved_notional: 1_000.0,
      })
      .await
      .unwrap();
    manager
      .handle_ack(&created.id, &BrokerOrderRef(broker_order_id.to_string()))
      .await
      .unwrap();
    created
  }

  #[tokio::test]
  async fn test_ledger_open_unknown_to_broker_is_frozen() {
    let (manager, gateway) = setup().await;

    // 브로커는 모르는 broker_order_id를 가진 원장 주문
    let order = create_submitted(&manager, "ghost-1").await;

    let reconciler = Reconciler::new(
      manager.clone(),
      HashMap::from([("mock".to_string(), gateway)]),
    );
    let summary = reconciler.run_startup_reconciliation().await.unwrap();

    assert_eq!(summary.frozen, 1);
    let frozen = manager.order(&order.id).await.unwrap();
    assert_eq!(frozen.status, OrderStatus::NeedsReconciliation);
  }

  #[tokio::test]
  async fn test_matching_orders_stay_untouched() {
    let (manager, gateway) = setup().await;

    // 브로커에 실제로 제출해 양쪽이 아는 주문을 만든다
    let request = crate::broker::ChildOrderRequest {
      symbol: "AAPL".to_string(),
      side: OrderSide::Buy,
      order_type: OrderType::Limit,
      quantity: 10.0,
      limit_price: Some(100.0),
      time_in_force: crate::models::order::TimeInForce::GTC,
      extended_hours: false,
    };
    let broker_ref = gateway.submit(&request).await.unwrap();
    let order = create_submitted(&manager, &broker_ref.0).await;

    let reconciler = Reconciler::new(
      manager.clone(),
      HashMap::from([("mock".to_string(), gateway)]),
    );
    let summary = reconciler.run_startup_reconciliation().await.unwrap();

    assert_eq!(summary.frozen, 0);
    assert!(summary.unmatched_broker_orders.is_empty());
    let untouched = manager.order(&order.id).await.unwrap();
    assert_eq!(untouched.status, OrderStatus::Submitted);
  }
}
