//! 체결 이벤트 라우터
//!
//! 브로커별 장수명 체결 스트림을 받아 broker_order_id로 부모 주문을 찾고,
//! 단일 소비자(주문 관리자) 채널로 모아 보낸다. 네트워크 어댑터와
//! 상태 기계가 가변 상태를 공유하지 않도록 메시지 전달로만 잇는다.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::broker::traits::FillEvent;
use crate::models::order::OrderId;

struct RouteTable {
    routes: HashMap<String, OrderId>,
    // 접수 등록 직전에 도착한 체결은 등록될 때까지 보류한다
    unmatched: HashMap<String, Vec<FillEvent>>,
}

#[derive(Clone)]
pub struct FillRouter {
    table: Arc<RwLock<RouteTable>>,
    tx: mpsc::Sender<(OrderId, FillEvent)>,
}

impl FillRouter {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<(OrderId, FillEvent)>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            FillRouter {
                table: Arc::new(RwLock::new(RouteTable {
                    routes: HashMap::new(),
                    unmatched: HashMap::new(),
                })),
                tx,
            },
            rx,
        )
    }

    /// 브로커 주문 ID를 부모 주문에 연결 (접수 시점에 등록)
    ///
    /// 등록 전에 도착해 보류 중이던 체결이 있으면 순서대로 흘려보낸다.
    pub async fn register(&self, broker_order_id: impl Into<String>, order_id: OrderId) {
        let broker_order_id = broker_order_id.into();
        let held = {
            let mut table = self.table.write().await;
            table.routes.insert(broker_order_id.clone(), order_id.clone());
            table.unmatched.remove(&broker_order_id)
        };

        if let Some(fills) = held {
            for fill in fills {
                if self.tx.send((order_id.clone(), fill)).await.is_err() {
                    break;
                }
            }
        }
    }

    /// 브로커 체결 스트림 하나를 붙여 소비 태스크를 띄운다
    pub fn attach_stream(&self, broker_name: impl Into<String>, mut rx: mpsc::Receiver<FillEvent>) {
        let broker_name = broker_name.into();
        let table = self.table.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            while let Some(fill) = rx.recv().await {
                let order_id = table.read().await.routes.get(&fill.broker_order_id).cloned();
                match order_id {
                    Some(order_id) => {
                        if tx.send((order_id, fill)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        log::warn!(
                            "등록 전 체결 보류: 브로커 = {} - 브로커 주문 ID = {}",
                            broker_name,
                            fill.broker_order_id
                        );
                        let mut table = table.write().await;
                        table
                            .unmatched
                            .entry(fill.broker_order_id.clone())
                            .or_insert_with(Vec::new)
                            .push(fill);
                    }
                }
            }
        });
    }
}
