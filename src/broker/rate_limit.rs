//! 브로커별 토큰 버킷 제한기
//!
//! 브로커마다 다른 분당 요청 한도를 제출 전에 맞춘다.

use tokio::time::{Duration, Instant};

/// 토큰 버킷
///
/// 분당 허용 요청 수를 용량으로 하고, 시간에 비례해 다시 채운다.
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_ms: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// 분당 요청 수 기준으로 버킷 생성
    pub fn per_minute(rate_limit_rpm: u32) -> Self {
        let capacity = rate_limit_rpm as f64;
        TokenBucket {
            capacity,
            tokens: capacity,
            refill_per_ms: capacity / 60_000.0,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.last_refill).as_millis() as f64;
        self.tokens = (self.tokens + elapsed_ms * self.refill_per_ms).min(self.capacity);
        self.last_refill = now;
    }

    /// 토큰이 있으면 즉시 소비
    pub fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// 토큰이 생길 때까지 대기 후 소비
    pub async fn acquire(&mut self) {
        loop {
            if self.try_acquire() {
                return;
            }
            let deficit = 1.0 - self.tokens;
            let wait_ms = (deficit / self.refill_per_ms).ceil() as u64;
            tokio::time::sleep(Duration::from_millis(wait_ms.max(1))).await;
        }
    }

    /// 남은 토큰 수 (관측용)
    pub fn available(&mut self) -> f64 {
        self.refill();
        self.tokens
    }
}
