use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use uuid::Uuid;

use crate::broker::traits::{BrokerOrderRef, FillEvent};
use crate::config::{ExecutionConfig, MarketHoursConfig};
use crate::error::ExecutionError;
use crate::models::order::{Order, OrderId, OrderStatus, TimeInForce};
use crate::models::trade::Trade;
use crate::order_core::events::{OrderEvent, OrderEventBus};
use crate::order_core::repository::OrderRepository;
use crate::order_core::validator::ValidatedOrder;

const QTY_EPS: f64 = 1e-9;

/// 주문별 체결 시퀀스 적용 상태
///
/// 체결은 도착 순서가 아니라 시퀀스 번호 순서로 적용한다.
/// 순서가 건너뛴 체결은 빈 자리가 채워질 때까지 보류한다.
struct FillSequenceState {
    next_sequence: u64,
    pending: BTreeMap<u64, FillEvent>,
}

impl FillSequenceState {
    fn new() -> Self {
        FillSequenceState {
            next_sequence: 1,
            pending: BTreeMap::new(),
        }
    }
}

/// 주문 관리자 - 주문 생명주기 관리
///
/// 체결 이벤트는 단일 소비자 루프에서만 적용되어 네트워크 어댑터와
/// 상태 기계가 가변 상태를 공유하지 않는다.
pub struct OrderManager {
    repository: Arc<RwLock<dyn OrderRepository>>,
    events: OrderEventBus,
    fill_sequences: Mutex<HashMap<String, FillSequenceState>>,
    cancel_signals: Mutex<HashMap<String, watch::Sender<bool>>>,
}

impl OrderManager {
    pub fn new(repository: Arc<RwLock<dyn OrderRepository>>, events: OrderEventBus) -> Self {
        OrderManager {
            repository,
            events,
            fill_sequences: Mutex::new(HashMap::new()),
            cancel_signals: Mutex::new(HashMap::new()),
        }
    }

    pub fn events(&self) -> &OrderEventBus {
        &self.events
    }

    /// 검증 통과한 주문 생성 및 제출 대기 전환
    pub async fn create_order(&self, validated: ValidatedOrder) -> Result<Order, ExecutionError> {
        let mut order = validated.order;

        {
            let mut repo = self.repository.write().await;
            repo.save(&order).await?;
        }

        self.persist_transition(&mut order, OrderStatus::PendingSubmission, None)
            .await?;

        self.events.publish(OrderEvent::OrderCreated {
            order: order.clone(),
        });
        crate::utils::logging::log_order_created(
            &order.id.0,
            &order.symbol,
            &format!("{:?}", order.side),
            order.quantity,
            order.limit_price.unwrap_or(0.0),
        );

        Ok(order)
    }

    /// 주문 조회
    pub async fn order(&self, order_id: &OrderId) -> Result<Order, ExecutionError> {
        let repo = self.repository.read().await;
        repo.find_by_id(order_id)
            .await?
            .ok_or_else(|| ExecutionError::OrderNotFound(order_id.clone()))
    }

    /// 모든 주문 조회
    pub async fn all_orders(&self) -> Result<Vec<Order>, ExecutionError> {
        let repo = self.repository.read().await;
        repo.find_all().await
    }

    /// 주문의 체결 내역 조회
    pub async fn trades(&self, order_id: &OrderId) -> Result<Vec<Trade>, ExecutionError> {
        let repo = self.repository.read().await;
        repo.trades_for_order(order_id).await
    }

    /// 미종료 주문 조회
    pub async fn open_orders(&self) -> Result<Vec<Order>, ExecutionError> {
        let repo = self.repository.read().await;
        repo.find_by_status(&[
            OrderStatus::PendingSubmission,
            OrderStatus::Submitted,
            OrderStatus::PartiallyFilled,
            OrderStatus::Cancelling,
        ])
        .await
    }

    /// 브로커 접수 처리 - broker_order_id 저장 후 Submitted 전환
    pub async fn handle_ack(
        &self,
        order_id: &OrderId,
        broker_ref: &BrokerOrderRef,
    ) -> Result<(), ExecutionError> {
        let mut order = self.order(order_id).await?;

        if order.status.is_terminal() {
            // 종료 주문에 대한 접수는 브로커 쪽에 고아 주문이 남았다는 뜻
            log::error!("종료 주문에 브로커 접수 도착: {} - {}", order_id, broker_ref);
            return Err(ExecutionError::AlreadyTerminal(order_id.clone()));
        }
        order.broker_order_id = Some(broker_ref.0.clone());

        if order.status == OrderStatus::PendingSubmission {
            self.persist_transition(&mut order, OrderStatus::Submitted, None)
                .await?;
        } else {
            order.updated_at = chrono::Utc::now().timestamp_millis();
            let mut repo = self.repository.write().await;
            repo.update(&order).await?;
        }

        Ok(())
    }

    /// 브로커 거부 처리
    pub async fn handle_reject(
        &self,
        order_id: &OrderId,
        reason: impl Into<String>,
    ) -> Result<(), ExecutionError> {
        let mut order = self.order(order_id).await?;
        let reason = reason.into();
        log::warn!("주문 거부: {} - 사유: {}", order_id, reason);
        self.persist_transition(&mut order, OrderStatus::Rejected, Some(reason))
            .await
    }

    /// 체결 적용 (시퀀스 번호 순서 보장)
    pub async fn apply_fill(&self, order_id: &OrderId, fill: FillEvent) -> Result<(), ExecutionError> {
        let mut sequences = self.fill_sequences.lock().await;
        let state = sequences
            .entry(order_id.0.clone())
            .or_insert_with(FillSequenceState::new);

        if fill.sequence < state.next_sequence {
            log::warn!(
                "이미 적용된 시퀀스의 체결 무시: 주문 = {} - 시퀀스 = {}",
                order_id,
                fill.sequence
            );
            return Ok(());
        }
        state.pending.insert(fill.sequence, fill);

        // 다음 시퀀스가 준비된 동안 순서대로 적용한다
        loop {
            let next_sequence = state.next_sequence;
            let Some(next) = state.pending.remove(&next_sequence) else {
                break;
            };
            self.apply_in_sequence(order_id, next).await?;
            state.next_sequence += 1;
        }

        Ok(())
    }

    async fn apply_in_sequence(&self, order_id: &OrderId, fill: FillEvent) -> Result<(), ExecutionError> {
        let mut order = self.order(order_id).await?;

        if order.status.is_terminal() {
            // 종료 상태 이후 체결은 원장과 브로커의 불일치 신호
            log::error!(
                "종료 주문에 체결 도착: 주문 = {} - 상태 = {} - 시퀀스 = {}",
                order_id,
                order.status,
                fill.sequence
            );
            return Err(ExecutionError::ReconciliationConflict(format!(
                "fill after terminal state for order {}",
                order_id
            )));
        }

        let new_filled = order.filled_quantity + fill.quantity;
        if new_filled > order.quantity + QTY_EPS {
            log::error!(
                "초과 체결 감지: 주문 = {} - 요청 = {} - 누적 = {}",
                order_id,
                order.quantity,
                new_filled
            );
            self.persist_transition(
                &mut order,
                OrderStatus::NeedsReconciliation,
                Some("overfill reported by broker".to_string()),
            )
            .await?;
            return Err(ExecutionError::ReconciliationConflict(format!(
                "overfill for order {}",
                order_id
            )));
        }

        // 평균 체결가 갱신
        order.average_fill_price = if new_filled > QTY_EPS {
            (order.average_fill_price * order.filled_quantity + fill.price * fill.quantity) / new_filled
        } else {
            0.0
        };
        order.filled_quantity = new_filled;
        order.commission += fill.commission;

        let next_status = if order.remaining_quantity() <= QTY_EPS {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };

        if !order.status.can_transition_to(next_status) {
            return Err(ExecutionError::InvalidTransition(format!(
                "{} -> {} for order {}",
                order.status, next_status, order_id
            )));
        }
        order.status = next_status;
        order.updated_at = chrono::Utc::now().timestamp_millis();
        if next_status == OrderStatus::Filled {
            order.reason = Some("fully filled".to_string());
        }

        let trade = Trade::new(
            Uuid::new_v4().to_string(),
            order.id.clone(),
            order.symbol.clone(),
            order.side,
            fill.quantity,
            fill.price,
            fill.commission,
            fill.sequence,
            fill.executed_at,
        );

        {
            let mut repo = self.repository.write().await;
            repo.record_fill(&order, &trade).await?;
        }

        self.events.publish(OrderEvent::TradeExecuted {
            trade: trade.clone(),
        });
        crate::utils::logging::log_order_filled(&order.id.0, &order.symbol, fill.quantity, fill.price);

        if next_status == OrderStatus::Filled {
            self.events.publish(OrderEvent::OrderFilled {
                order_id: order.id.clone(),
                filled_quantity: order.filled_quantity,
                average_fill_price: order.average_fill_price,
            });
        }

        Ok(())
    }

    /// 취소 요청
    ///
    /// 브로커 확인 전까지는 권고 상태(Cancelling)로만 표시한다.
    /// 이미 종료된 주문 취소는 명시적 오류이며 조용히 성공하지 않는다.
    pub async fn request_cancel(&self, order_id: &OrderId) -> Result<Order, ExecutionError> {
        let mut order = self.order(order_id).await?;

        if order.status.is_terminal() || order.remaining_quantity() <= QTY_EPS {
            return Err(ExecutionError::AlreadyTerminal(order_id.clone()));
        }

        self.persist_transition(&mut order, OrderStatus::Cancelling, None)
            .await?;

        // 실행기가 분할 사이에서 관찰하는 취소 신호.
        // 실행기가 아직 구독 전이어도 신호 값은 유지된다.
        let mut signals = self.cancel_signals.lock().await;
        let sender = signals
            .entry(order_id.0.clone())
            .or_insert_with(|| watch::channel(false).0);
        let _ = sender.send(true);

        Ok(order)
    }

    /// 브로커가 취소를 확인한 뒤 호출
    ///
    /// 취소와 경합한 체결이 주문을 이미 채웠다면 취소는 무효가 된다.
    pub async fn confirm_cancel(
        &self,
        order_id: &OrderId,
        reason: impl Into<String>,
    ) -> Result<(), ExecutionError> {
        let mut order = self.order(order_id).await?;

        if order.status == OrderStatus::Filled {
            log::info!("취소 전 전량 체결됨: {}", order_id);
            return Ok(());
        }
        if order.status.is_terminal() {
            return Ok(());
        }

        let reason = reason.into();
        self.persist_transition(&mut order, OrderStatus::Cancelled, Some(reason.clone()))
            .await?;

        self.events.publish(OrderEvent::OrderCancelled {
            order_id: order_id.clone(),
            reason,
        });
        crate::utils::logging::log_order_cancelled(&order_id.0);

        Ok(())
    }

    /// 실행기가 취소 신호를 받을 수신기
    pub async fn cancel_receiver(&self, order_id: &OrderId) -> watch::Receiver<bool> {
        let mut signals = self.cancel_signals.lock().await;
        signals
            .entry(order_id.0.clone())
            .or_insert_with(|| watch::channel(false).0)
            .subscribe()
    }

    /// 시간 제약 만료 처리
    pub async fn expire_order(&self, order_id: &OrderId) -> Result<(), ExecutionError> {
        let mut order = self.order(order_id).await?;
        if order.status.is_terminal() {
            return Ok(());
        }
        log::warn!("주문 시간 제약 만료: {}", order_id);
        self.persist_transition(
            &mut order,
            OrderStatus::Expired,
            Some("time in force elapsed".to_string()),
        )
        .await
    }

    /// 정합성 문제로 주문 동결
    pub async fn freeze_for_reconciliation(
        &self,
        order_id: &OrderId,
        reason: impl Into<String>,
    ) -> Result<(), ExecutionError> {
        let mut order = self.order(order_id).await?;
        if order.status.is_terminal() || order.status == OrderStatus::NeedsReconciliation {
            return Ok(());
        }
        let reason = reason.into();
        log::error!("주문 동결 (정합성 점검 필요): {} - 사유: {}", order_id, reason);
        self.persist_transition(&mut order, OrderStatus::NeedsReconciliation, Some(reason))
            .await
    }

    async fn persist_transition(
        &self,
        order: &mut Order,
        next: OrderStatus,
        reason: Option<String>,
    ) -> Result<(), ExecutionError> {
        if !order.status.can_transition_to(next) {
            return Err(ExecutionError::InvalidTransition(format!(
                "{} -> {} for order {}",
                order.status, next, order.id
            )));
        }

        order.status = next;
        if reason.is_some() {
            order.reason = reason;
        }
        order.updated_at = chrono::Utc::now().timestamp_millis();

        let mut repo = self.repository.write().await;
        repo.update(order).await
    }

    /// 체결 라우터에서 들어오는 단일 소비자 루프 시작
    pub fn spawn_fill_loop(self: Arc<Self>, mut rx: mpsc::Receiver<(OrderId, FillEvent)>) {
        tokio::spawn(async move {
            while let Some((order_id, fill)) = rx.recv().await {
                if let Err(e) = self.apply_fill(&order_id, fill).await {
                    crate::utils::logging::log_error("체결 적용", &e);
                }
            }
        });
    }

    /// 접수 시한과 시간 제약(TIF) 감시 시작
    pub fn start_expiry_monitor(
        self: Arc<Self>,
        execution: ExecutionConfig,
        market_hours: MarketHoursConfig,
    ) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(1));

            loop {
                interval.tick().await;
                let now = chrono::Utc::now().timestamp_millis();
                let ack_deadline_ms = execution.ack_timeout_secs as i64 * 1000;

                let pending = {
                    let repo = self.repository.read().await;
                    repo.find_by_status(&[
                        OrderStatus::PendingSubmission,
                        OrderStatus::Submitted,
                        OrderStatus::PartiallyFilled,
                    ])
                    .await
                };
                let Ok(pending) = pending else { continue };

                for order in pending {
                    match order.status {
                        // 접수 확인이 시한 내에 오지 않으면 에스컬레이션
                        OrderStatus::PendingSubmission => {
                            if now - order.updated_at > ack_deadline_ms {
                                let _ = self
                                    .freeze_for_reconciliation(
                                        &order.id,
                                        "broker acknowledgement timeout",
                                    )
                                    .await;
                            }
                        }
                        OrderStatus::Submitted | OrderStatus::PartiallyFilled => {
                            if Self::time_in_force_elapsed(&order, &market_hours, ack_deadline_ms, now) {
                                let _ = self.expire_order(&order.id).await;
                            }
                        }
                        _ => {}
                    }
                }
            }
        });
    }

    fn time_in_force_elapsed(
        order: &Order,
        market_hours: &MarketHoursConfig,
        ack_deadline_ms: i64,
        now: i64,
    ) -> bool {
        match order.time_in_force {
            TimeInForce::GTC => false,
            // 즉시 체결 제약은 접수 시한을 실행 창으로 쓴다
            TimeInForce::IOC | TimeInForce::FOK => now - order.created_at > ack_deadline_ms,
            TimeInForce::Day => {
                let day_start = order.created_at - order.created_at.rem_euclid(86_400_000);
                let close = day_start + market_hours.close_minute as i64 * 60_000;
                now >= close
            }
        }
    }
}
