//! 주문 생애주기 이벤트
//!
//! 리스크 모니터링과 포트폴리오 평가 협력 서비스가 구독한다.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::order::{Order, OrderId};
use crate::models::trade::Trade;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderCreated {
        order: Order,
    },
    TradeExecuted {
        trade: Trade,
    },
    OrderFilled {
        order_id: OrderId,
        filled_quantity: f64,
        average_fill_price: f64,
    },
    OrderCancelled {
        order_id: OrderId,
        reason: String,
    },
}

/// 주문 이벤트 버스
#[derive(Clone)]
pub struct OrderEventBus {
    tx: broadcast::Sender<OrderEvent>,
}

impl OrderEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        OrderEventBus { tx }
    }

    /// 구독자가 없어도 발행은 실패하지 않는다
    pub fn publish(&self, event: OrderEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.tx.subscribe()
    }
}

impl Default for OrderEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
