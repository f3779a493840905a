use serde::{Deserialize, Serialize};

use crate::models::order::{OrderId, OrderSide};

/// 확정된 브로커 체결 기록 (기록 이후 불변)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub order_id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub commission: f64,
    pub sequence: u64,
    pub executed_at: i64,
}

impl Trade {
    pub fn new(
        id: impl Into<String>,
        order_id: OrderId,
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        price: f64,
        commission: f64,
        sequence: u64,
        executed_at: i64,
    ) -> Self {
        Trade {
            id: id.into(),
            order_id,
            symbol: symbol.into(),
            side,
            quantity,
            price,
            commission,
            sequence,
            executed_at,
        }
    }

    pub fn value(&self) -> f64 {
        self.price * self.quantity
    }
}
