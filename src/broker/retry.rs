//! 브로커 호출 재시도 정책
//!
//! 일시 장애는 지수 백오프로 재시도하고, 한도를 넘으면
//! `broker_unavailable` 사유로 주문을 거부한다.

use rand::Rng;
use tokio::time::Duration;

/// 재시도 한도 초과 시 주문에 남는 사유
pub const REASON_BROKER_UNAVAILABLE: &str = "broker_unavailable";

/// 재시도 정책
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    /// 백오프에 더해지는 무작위 지터 비율 (0.1 = 최대 +10%)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff_ms: u64) -> Self {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms,
            ..Default::default()
        }
    }
}

/// 지수 백오프 계산기
///
/// 기본 지연은 시도마다 엄격히 증가하고, 지터는 위쪽으로만 더한다.
pub struct BackoffSchedule {
    policy: RetryPolicy,
    attempt: u32,
}

impl BackoffSchedule {
    pub fn new(policy: RetryPolicy) -> Self {
        BackoffSchedule { policy, attempt: 0 }
    }

    /// 다음 대기 시간. 한도 초과 시 None
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }

        let base = self.base_backoff_ms(self.attempt);
        let jittered = self.apply_jitter(base);
        self.attempt += 1;

        Some(Duration::from_millis(jittered))
    }

    /// 지터 없는 기본 지연 (테스트와 단조 증가 검증용)
    pub fn base_backoff_ms(&self, attempt: u32) -> u64 {
        let multiplied = self.policy.initial_backoff_ms as f64 * self.policy.multiplier.powi(attempt as i32);
        (multiplied as u64).min(self.policy.max_backoff_ms)
    }

    fn apply_jitter(&self, base_ms: u64) -> u64 {
        if self.policy.jitter <= 0.0 {
            return base_ms;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.policy.jitter) * base_ms as f64;
        base_ms + extra as u64
    }

    pub fn attempts_used(&self) -> u32 {
        self.attempt
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.policy.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_without_jitter() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            initial_backoff_ms: 100,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
            jitter: 0.0,
        }
    }

    #[test]
    fn test_backoff_is_strictly_increasing() {
        let mut schedule = BackoffSchedule::new(policy_without_jitter());

        let delays: Vec<Duration> = std::iter::from_fn(|| schedule.next_backoff()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
            ]
        );
    }

    #[test]
    fn test_backoff_exhausts_after_max_attempts() {
        let mut schedule = BackoffSchedule::new(policy_without_jitter());
        for _ in 0..4 {
            assert!(schedule.next_backoff().is_some());
        }
        assert!(schedule.next_backoff().is_none());
        assert!(schedule.exhausted());
    }

    #[test]
    fn test_backoff_respects_cap() {
        let mut policy = policy_without_jitter();
        policy.max_attempts = 12;
        policy.max_backoff_ms = 1_000;
        let schedule = BackoffSchedule::new(policy);

        assert_eq!(schedule.base_backoff_ms(10), 1_000);
    }

    #[test]
    fn test_jitter_only_adds_delay() {
        let mut policy = policy_without_jitter();
        policy.jitter = 0.5;
        let mut schedule = BackoffSchedule::new(policy);

        for attempt in 0..4 {
            let base = schedule.base_backoff_ms(attempt);
            let delay = schedule.next_backoff().unwrap();
            assert!(delay >= Duration::from_millis(base));
            assert!(delay <= Duration::from_millis(base + base / 2 + 1));
        }
    }
}
