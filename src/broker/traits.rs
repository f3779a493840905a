use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

use crate::error::ExecutionError;
use crate::models::order::{OrderSide, OrderType, TimeInForce};

/// Broker-assigned identifier for a submitted child order.
/// This is the only broker-side identifier that may appear in logs.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, Hash, PartialEq)]
pub struct BrokerOrderRef(pub String);

impl fmt::Display for BrokerOrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized submission payload sent to any broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub limit_price: Option<f64>,
    pub time_in_force: TimeInForce,
    pub extended_hours: bool,
}

/// A confirmed fill reported by a broker stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillEvent {
    pub broker_order_id: String,
    /// Per-order fill sequence number assigned by the reporting side.
    pub sequence: u64,
    pub quantity: f64,
    pub price: f64,
    pub commission: f64,
    pub executed_at: i64,
}

/// The `BrokerAdapter` trait normalizes heterogeneous broker APIs into one
/// order submission/cancellation/fill-reporting interface.
/// It is implemented by real broker connectors and mock implementations.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Submit a child order to the broker
    async fn submit(&mut self, request: &ChildOrderRequest) -> Result<BrokerOrderRef, ExecutionError>;

    /// Cancel a previously submitted child order.
    /// Returns false when the broker no longer knows the order as open.
    async fn cancel(&mut self, broker_order_ref: &BrokerOrderRef) -> Result<bool, ExecutionError>;

    /// Open orders currently known to the broker (startup reconciliation)
    async fn open_orders(&self) -> Result<Vec<BrokerOrderRef>, ExecutionError>;

    /// Take the long-lived fill event stream for this broker account.
    /// Returns None after the first call.
    fn take_fill_stream(&mut self) -> Option<mpsc::Receiver<FillEvent>>;

    /// Broker name for routing and logs
    fn name(&self) -> &str;
}
