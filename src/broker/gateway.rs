//! 브로커 게이트웨이
//!
//! 어댑터 앞단에서 토큰 버킷과 재시도 정책을 적용하는 제출 경로.
//! 재시도 한도를 넘긴 주문은 broker_unavailable 사유로 거부된다.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::broker::rate_limit::TokenBucket;
use crate::broker::retry::{BackoffSchedule, RetryPolicy, REASON_BROKER_UNAVAILABLE};
use crate::broker::traits::{BrokerAdapter, BrokerOrderRef, ChildOrderRequest, FillEvent};
use crate::error::ExecutionError;

pub struct BrokerGateway {
    name: String,
    adapter: Arc<RwLock<Box<dyn BrokerAdapter>>>,
    limiter: Mutex<TokenBucket>,
    retry_policy: RetryPolicy,
}

impl BrokerGateway {
    pub fn new(
        name: impl Into<String>,
        adapter: Box<dyn BrokerAdapter>,
        rate_limit_rpm: u32,
        retry_policy: RetryPolicy,
    ) -> Self {
        BrokerGateway {
            name: name.into(),
            adapter: Arc::new(RwLock::new(adapter)),
            limiter: Mutex::new(TokenBucket::per_minute(rate_limit_rpm)),
            retry_policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 자식 주문 제출
    ///
    /// 일시 장애는 지수 백오프로 재시도하고, 소진되면
    /// broker_unavailable 사유의 영구 오류로 바꾼다.
    pub async fn submit(&self, request: &ChildOrderRequest) -> Result<BrokerOrderRef, ExecutionError> {
        let mut schedule = BackoffSchedule::new(self.retry_policy.clone());

        loop {
            self.limiter.lock().await.acquire().await;

            let result = {
                let mut adapter = self.adapter.write().await;
                adapter.submit(request).await
            };

            match result {
                Ok(broker_ref) => {
                    log::info!(
                        "주문 제출 완료: 브로커 = {} - 브로커 주문 ID = {}",
                        self.name,
                        broker_ref
                    );
                    return Ok(broker_ref);
                }
                Err(e) if e.is_retryable() => match schedule.next_backoff() {
                    Some(delay) => {
                        log::warn!(
                            "브로커 일시 오류, 재시도 예정: 브로커 = {} - 시도 = {} - 대기 = {:?}",
                            self.name,
                            schedule.attempts_used(),
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        log::error!(
                            "브로커 재시도 한도 초과: 브로커 = {} - 시도 = {}",
                            self.name,
                            schedule.attempts_used()
                        );
                        return Err(ExecutionError::BrokerPermanent(
                            REASON_BROKER_UNAVAILABLE.to_string(),
                        ));
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// 자식 주문 취소 (브로커가 이미 모르는 주문이면 false)
    pub async fn cancel(&self, broker_order_ref: &BrokerOrderRef) -> Result<bool, ExecutionError> {
        self.limiter.lock().await.acquire().await;
        let mut adapter = self.adapter.write().await;
        adapter.cancel(broker_order_ref).await
    }

    /// 기동 정합성 점검용 미체결 주문 조회
    pub async fn open_orders(&self) -> Result<Vec<BrokerOrderRef>, ExecutionError> {
        let adapter = self.adapter.read().await;
        adapter.open_orders().await
    }

    /// 체결 스트림 인수 (최초 1회)
    pub async fn take_fill_stream(&self) -> Option<mpsc::Receiver<FillEvent>> {
        let mut adapter = self.adapter.write().await;
        adapter.take_fill_stream()
    }
}
