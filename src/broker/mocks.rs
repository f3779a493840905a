use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::broker::traits::{BrokerAdapter, BrokerOrderRef, ChildOrderRequest, FillEvent};
use crate::error::ExecutionError;

/// How the mock reports fills for accepted orders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockFillMode {
    /// Fill the full quantity immediately after submission
    Immediate,
    /// Fill the given ratio immediately, leave the rest open
    Partial(f64),
    /// Report nothing until the test pushes fills explicitly
    Manual,
}

struct MockState {
    orders: HashMap<String, (ChildOrderRequest, bool)>,
    counter: u64,
    fill_mode: MockFillMode,
    fail_submissions: u32,
    submission_count: u64,
    sequences: HashMap<String, u64>,
}

/// A mock implementation of the BrokerAdapter trait for testing and development
pub struct MockBroker {
    name: String,
    state: Arc<Mutex<MockState>>,
    fill_tx: mpsc::Sender<FillEvent>,
    fill_rx: Option<mpsc::Receiver<FillEvent>>,
}

/// Test-side handle for scripting the mock from outside the adapter box
#[derive(Clone)]
pub struct MockBrokerHandle {
    state: Arc<Mutex<MockState>>,
    fill_tx: mpsc::Sender<FillEvent>,
}

impl MockBroker {
    pub fn new(name: impl Into<String>) -> Self {
        let (fill_tx, fill_rx) = mpsc::channel(256);
        MockBroker {
            name: name.into(),
            state: Arc::new(Mutex::new(MockState {
                orders: HashMap::new(),
                counter: 0,
                fill_mode: MockFillMode::Immediate,
                fail_submissions: 0,
                submission_count: 0,
                sequences: HashMap::new(),
            })),
            fill_tx,
            fill_rx: Some(fill_rx),
        }
    }

    pub fn with_fill_mode(self, fill_mode: MockFillMode) -> Self {
        self.state.lock().unwrap().fill_mode = fill_mode;
        self
    }

    pub fn handle(&self) -> MockBrokerHandle {
        MockBrokerHandle {
            state: self.state.clone(),
            fill_tx: self.fill_tx.clone(),
        }
    }

    fn emit_fill(&self, broker_order_id: &str, quantity: f64, price: f64) {
        let sequence = {
            let mut state = self.state.lock().unwrap();
            let seq = state.sequences.entry(broker_order_id.to_string()).or_insert(0);
            *seq += 1;
            *seq
        };
        let _ = self.fill_tx.try_send(FillEvent {
            broker_order_id: broker_order_id.to_string(),
            sequence,
            quantity,
            price,
            commission: 0.0,
            executed_at: Utc::now().timestamp_millis(),
        });
    }
}

impl MockBrokerHandle {
    /// 다음 N번의 제출을 일시 오류로 실패시킨다 (재시도 테스트용)
    pub fn fail_next_submissions(&self, n: u32) {
        self.state.lock().unwrap().fail_submissions = n;
    }

    /// 브로커가 접수한 주문 수
    pub fn submission_count(&self) -> u64 {
        self.state.lock().unwrap().submission_count
    }

    pub fn is_open(&self, broker_order_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .orders
            .get(broker_order_id)
            .map(|(_, open)| *open)
            .unwrap_or(false)
    }

    /// 명시적 체결 주입 (시퀀스 번호 직접 지정 가능)
    pub fn push_fill(&self, broker_order_id: &str, sequence: u64, quantity: f64, price: f64) {
        let _ = self.fill_tx.try_send(FillEvent {
            broker_order_id: broker_order_id.to_string(),
            sequence,
            quantity,
            price,
            commission: 0.0,
            executed_at: Utc::now().timestamp_millis(),
        });
    }
}

#[async_trait]
impl BrokerAdapter for MockBroker {
    async fn submit(&mut self, request: &ChildOrderRequest) -> Result<BrokerOrderRef, ExecutionError> {
        let (broker_order_id, fill_mode) = {
            let mut state = self.state.lock().unwrap();

            if state.fail_submissions > 0 {
                state.fail_submissions -= 1;
                return Err(ExecutionError::BrokerTransient(
                    "simulated rate limit rejection".to_string(),
                ));
            }

            state.counter += 1;
            state.submission_count += 1;
            let id = format!("mock-{}", state.counter);
            state.orders.insert(id.clone(), (request.clone(), true));
            (id, state.fill_mode)
        };

        let price = request.limit_price.unwrap_or(100.0);
        match fill_mode {
            MockFillMode::Immediate => {
                self.emit_fill(&broker_order_id, request.quantity, price);
                if let Some(entry) = self.state.lock().unwrap().orders.get_mut(&broker_order_id) {
                    entry.1 = false;
                }
            }
            MockFillMode::Partial(ratio) => {
                self.emit_fill(&broker_order_id, request.quantity * ratio, price);
            }
            MockFillMode::Manual => {}
        }

        Ok(BrokerOrderRef(broker_order_id))
    }

    async fn cancel(&mut self, broker_order_ref: &BrokerOrderRef) -> Result<bool, ExecutionError> {
        let mut state = self.state.lock().unwrap();
        match state.orders.get_mut(&broker_order_ref.0) {
            Some((_, open)) if *open => {
                *open = false;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn open_orders(&self) -> Result<Vec<BrokerOrderRef>, ExecutionError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .orders
            .iter()
            .filter(|(_, (_, open))| *open)
            .map(|(id, _)| BrokerOrderRef(id.clone()))
            .collect())
    }

    fn take_fill_stream(&mut self) -> Option<mpsc::Receiver<FillEvent>> {
        self.fill_rx.take()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{OrderSide, OrderType, TimeInForce};

    fn request(quantity: f64) -> ChildOrderRequest {
        ChildOrderRequest {
            symbol: "AAPL".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            quantity,
            limit_price: Some(50.0),
            time_in_force: TimeInForce::GTC,
            extended_hours: false,
        }
    }

    #[tokio::test]
    async fn test_immediate_fill_reports_full_quantity() {
        let mut broker = MockBroker::new("mock");
        let mut fills = broker.take_fill_stream().unwrap();

        let broker_ref = broker.submit(&request(10.0)).await.unwrap();
        let fill = fills.recv().await.unwrap();

        assert_eq!(fill.broker_order_id, broker_ref.0);
        assert_eq!(fill.sequence, 1);
        assert!((fill.quantity - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cancel_known_open_order() {
        let mut broker = MockBroker::new("mock").with_fill_mode(MockFillMode::Manual);
        let broker_ref = broker.submit(&request(10.0)).await.unwrap();

        assert!(broker.cancel(&broker_ref).await.unwrap());
        // 두 번째 취소는 이미 닫힌 주문
        assert!(!broker.cancel(&broker_ref).await.unwrap());
    }

    #[tokio::test]
    async fn test_open_orders_lists_unfilled_only() {
        let mut broker = MockBroker::new("mock").with_fill_mode(MockFillMode::Manual);
        let first = broker.submit(&request(10.0)).await.unwrap();
        let _second = broker.submit(&request(5.0)).await.unwrap();

        broker.cancel(&first).await.unwrap();
        let open = broker.open_orders().await.unwrap();
        assert_eq!(open.len(), 1);
    }
}
