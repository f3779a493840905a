use std::collections::HashMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;
use crate::models::order::{Order, OrderId, OrderStatus};
use crate::models::trade::Trade;

/// 원장에 남는 이벤트 기록 (재기동 시 스냅샷 + 이벤트로 상태 복원)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: i64,
    pub order_id: OrderId,
    pub kind: String,
    pub details: serde_json::Value,
}

/// 주문 저장소 인터페이스
///
/// 주문 원장이 단일 진실 공급원이다. 상태 전이는 촉발 이벤트와
/// 함께 원자적으로 기록된다.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// 주문 저장
    async fn save(&mut self, order: &Order) -> Result<(), ExecutionError>;

    /// 주문 업데이트
    async fn update(&mut self, order: &Order) -> Result<(), ExecutionError>;

    /// 체결 반영 - 주문 갱신과 체결 기록을 한 번에 적용
    async fn record_fill(&mut self, order: &Order, trade: &Trade) -> Result<(), ExecutionError>;

    /// ID로 주문 찾기
    async fn find_by_id(&self, order_id: &OrderId) -> Result<Option<Order>, ExecutionError>;

    /// 상태별 주문 찾기
    async fn find_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>, ExecutionError>;

    /// 모든 주문 가져오기
    async fn find_all(&self) -> Result<Vec<Order>, ExecutionError>;

    /// 주문의 체결 내역 (기록 순서 = 시퀀스 순서)
    async fn trades_for_order(&self, order_id: &OrderId) -> Result<Vec<Trade>, ExecutionError>;

    /// 이벤트 저널 (복구/감사용)
    async fn journal(&self) -> Result<Vec<JournalEntry>, ExecutionError>;
}

/// 메모리 기반 주문 저장소 구현
pub struct InMemoryOrderRepository {
    orders: HashMap<String, Order>,
    trades: HashMap<String, Vec<Trade>>,
    journal: Vec<JournalEntry>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        InMemoryOrderRepository {
            orders: HashMap::new(),
            trades: HashMap::new(),
            journal: Vec::new(),
        }
    }

    fn append_journal(&mut self, order: &Order, kind: &str, details: serde_json::Value) {
        self.journal.push(JournalEntry {
            timestamp: chrono::Utc::now().timestamp_millis(),
            order_id: order.id.clone(),
            kind: kind.to_string(),
            details,
        });
    }
}

impl Default for InMemoryOrderRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save(&mut self, order: &Order) -> Result<(), ExecutionError> {
        self.orders.insert(order.id.0.clone(), order.clone());
        self.append_journal(order, "created", serde_json::json!({ "status": order.status }));
        Ok(())
    }

    async fn update(&mut self, order: &Order) -> Result<(), ExecutionError> {
        if !self.orders.contains_key(&order.id.0) {
            return Err(ExecutionError::OrderNotFound(order.id.clone()));
        }
        self.orders.insert(order.id.0.clone(), order.clone());
        self.append_journal(
            order,
            "updated",
            serde_json::json!({ "status": order.status, "reason": order.reason }),
        );
        Ok(())
    }

    async fn record_fill(&mut self, order: &Order, trade: &Trade) -> Result<(), ExecutionError> {
        if !self.orders.contains_key(&order.id.0) {
            return Err(ExecutionError::OrderNotFound(order.id.clone()));
        }

        // 주문 갱신과 체결 기록은 같은 호출에서 함께 반영된다
        self.orders.insert(order.id.0.clone(), order.clone());
        self.trades
            .entry(order.id.0.clone())
            .or_insert_with(Vec::new)
            .push(trade.clone());
        self.append_journal(
            order,
            "fill",
            serde_json::json!({
                "sequence": trade.sequence,
                "quantity": trade.quantity,
                "price": trade.price,
                "status": order.status,
            }),
        );
        Ok(())
    }

    async fn find_by_id(&self, order_id: &OrderId) -> Result<Option<Order>, ExecutionError> {
        Ok(self.orders.get(&order_id.0).cloned())
    }

    async fn find_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>, ExecutionError> {
        let filtered: Vec<Order> = self
            .orders
            .values()
            .filter(|o| statuses.contains(&o.status))
            .cloned()
            .collect();
        Ok(filtered)
    }

    async fn find_all(&self) -> Result<Vec<Order>, ExecutionError> {
        Ok(self.orders.values().cloned().collect())
    }

    async fn trades_for_order(&self, order_id: &OrderId) -> Result<Vec<Trade>, ExecutionError> {
        Ok(self.trades.get(&order_id.0).cloned().unwrap_or_default())
    }

    async fn journal(&self) -> Result<Vec<JournalEntry>, ExecutionError> {
        Ok(self.journal.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{OrderSide, OrderType};

    #[tokio::test]
    async fn test_update_unknown_order_fails() {
        let mut repo = InMemoryOrderRepository::new();
        let order = Order::new("pf-1", "AAPL", OrderSide::Buy, OrderType::Limit, 10.0);

        assert!(repo.update(&order).await.is_err());
        repo.save(&order).await.unwrap();
        assert!(repo.update(&order).await.is_ok());
    }

    #[tokio::test]
    async fn test_journal_records_every_mutation() {
        let mut repo = InMemoryOrderRepository::new();
        let mut order = Order::new("pf-1", "AAPL", OrderSide::Buy, OrderType::Limit, 10.0);

        repo.save(&order).await.unwrap();
        order.status = crate::models::order::OrderStatus::PendingSubmission;
        repo.update(&order).await.unwrap();

        let journal = repo.journal().await.unwrap();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal[0].kind, "created");
        assert_eq!(journal[1].kind, "updated");
    }
}
