use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use async_trait::async_trait;

use crate::error::ExecutionError;
use crate::models::market_data::MarketSnapshot;

/// 시장 스냅샷 공급 인터페이스
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// 심볼의 현재 스냅샷 조회
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot, ExecutionError>;
}

/// 고정 스냅샷 공급자 (테스트 및 개발용)
pub struct StaticMarketData {
    snapshots: Arc<RwLock<HashMap<String, MarketSnapshot>>>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        StaticMarketData {
            snapshots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn set_snapshot(&self, snapshot: MarketSnapshot) {
        self.snapshots
            .write()
            .await
            .insert(snapshot.symbol.clone(), snapshot);
    }
}

impl Default for StaticMarketData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataSource for StaticMarketData {
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot, ExecutionError> {
        self.snapshots
            .read()
            .await
            .get(symbol)
            .cloned()
            .ok_or_else(|| ExecutionError::Unknown(format!("No market data for symbol: {}", symbol)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_snapshot_roundtrip() {
        let source = StaticMarketData::new();
        source
            .set_snapshot(MarketSnapshot::new("AAPL", 1000, 99.9, 100.1, 100.0))
            .await;

        let snapshot = source.snapshot("AAPL").await.unwrap();
        assert!((snapshot.mid() - 100.0).abs() < 1e-9);

        assert!(source.snapshot("MSFT").await.is_err());
    }
}
