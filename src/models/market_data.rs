use serde::{Deserialize, Serialize};

/// 실행 계획 수립에 쓰이는 시장 스냅샷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub timestamp: i64,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub day_volume: f64,
    /// 실현 변동성 (일중, %)
    pub volatility: f64,
    /// 일중 구간별 거래량 프로파일 (VWAP 분할 비중 계산용)
    pub volume_profile: Vec<f64>,
}

impl MarketSnapshot {
    pub fn new(symbol: impl Into<String>, timestamp: i64, bid: f64, ask: f64, last: f64) -> Self {
        MarketSnapshot {
            symbol: symbol.into(),
            timestamp,
            bid,
            ask,
            last,
            day_volume: 0.0,
            volatility: 0.0,
            volume_profile: Vec::new(),
        }
    }

    pub fn with_volume(mut self, day_volume: f64) -> Self {
        self.day_volume = day_volume;
        self
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    pub fn with_volume_profile(mut self, volume_profile: Vec<f64>) -> Self {
        self.volume_profile = volume_profile;
        self
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread(&self) -> f64 {
        (self.ask - self.bid).max(0.0)
    }

    pub fn spread_bps(&self) -> f64 {
        let mid = self.mid();
        if mid > 0.0 {
            self.spread() / mid * 10_000.0
        } else {
            0.0
        }
    }
}
