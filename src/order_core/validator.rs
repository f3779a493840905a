//! 주문 검증기
//!
//! 심볼, 장 운영 시간, 매수 여력, 리스크 한도, 중복 여부를
//! 순서대로 검사하고 첫 실패에서 바로 끊는다.
//! 실패 시 어떤 부수 효과도 남기지 않는다.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{ExecutionError, ValidationError};
use crate::models::order::{Order, OrderIntent};

/// 매수 여력 원장 협력 서비스
///
/// 예약은 포트폴리오 단위로 직렬화되어 동시 주문이
/// 같은 자본을 초과 지출하지 못한다.
#[async_trait]
pub trait AccountLedger: Send + Sync {
    async fn buying_power(&self, portfolio_id: &str) -> Result<f64, ExecutionError>;

    /// 주문 명목 금액 예약. 여력이 부족하면 실패한다.
    async fn reserve(&self, portfolio_id: &str, amount: f64) -> Result<(), ValidationError>;

    /// 예약 해제 (후속 검사 실패 또는 주문 종료 시)
    async fn release(&self, portfolio_id: &str, amount: f64);
}

/// 메모리 기반 원장 구현 (테스트 및 개발용)
pub struct InMemoryLedger {
    // 쓰기 락 하나로 예약 경로 전체를 직렬화한다
    balances: RwLock<HashMap<String, f64>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        InMemoryLedger {
            balances: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set_balance(&self, portfolio_id: impl Into<String>, amount: f64) {
        self.balances.write().await.insert(portfolio_id.into(), amount);
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountLedger for InMemoryLedger {
    async fn buying_power(&self, portfolio_id: &str) -> Result<f64, ExecutionError> {
        Ok(self.balances.read().await.get(portfolio_id).copied().unwrap_or(0.0))
    }

    async fn reserve(&self, portfolio_id: &str, amount: f64) -> Result<(), ValidationError> {
        let mut balances = self.balances.write().await;
        let available = balances.get(portfolio_id).copied().unwrap_or(0.0);
        if available < amount {
            return Err(ValidationError::InsufficientFunds {
                required: amount,
                available,
            });
        }
        balances.insert(portfolio_id.to_string(), available - amount);
        Ok(())
    }

    async fn release(&self, portfolio_id: &str, amount: f64) {
        let mut balances = self.balances.write().await;
        let available = balances.get(portfolio_id).copied().unwrap_or(0.0);
        balances.insert(portfolio_id.to_string(), available + amount);
    }
}

/// 리스크 한도 협력 서비스
#[async_trait]
pub trait RiskService: Send + Sync {
    async fn check(&self, intent: &OrderIntent, notional: f64) -> Result<(), ValidationError>;
}

/// 설정 한도 기반 리스크 서비스
pub struct StaticRiskService {
    max_position_size: f64,
    max_notional_value: f64,
    max_sector_exposure: f64,
    sector_by_symbol: HashMap<String, String>,
    sector_exposure: RwLock<HashMap<String, f64>>,
}

impl StaticRiskService {
    pub fn new(config: &Config) -> Self {
        StaticRiskService {
            max_position_size: config.risk.max_position_size,
            max_notional_value: config.risk.max_notional_value,
            max_sector_exposure: config.risk.max_sector_exposure,
            sector_by_symbol: HashMap::new(),
            sector_exposure: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_sector(mut self, symbol: impl Into<String>, sector: impl Into<String>) -> Self {
        self.sector_by_symbol.insert(symbol.into(), sector.into());
        self
    }

    pub async fn set_sector_exposure(&self, sector: impl Into<String>, ratio: f64) {
        self.sector_exposure.write().await.insert(sector.into(), ratio);
    }
}

#[async_trait]
impl RiskService for StaticRiskService {
    async fn check(&self, intent: &OrderIntent, notional: f64) -> Result<(), ValidationError> {
        if intent.quantity > self.max_position_size {
            return Err(ValidationError::RiskLimitExceeded(format!(
                "Order exceeds maximum position size: {}",
                self.max_position_size
            )));
        }

        if notional > self.max_notional_value {
            return Err(ValidationError::RiskLimitExceeded(format!(
                "Order exceeds maximum notional value: {}",
                self.max_notional_value
            )));
        }

        if let Some(sector) = self.sector_by_symbol.get(&intent.symbol) {
            let exposure = self
                .sector_exposure
                .read()
                .await
                .get(sector)
                .copied()
                .unwrap_or(0.0);
            if exposure > self.max_sector_exposure {
                return Err(ValidationError::RiskLimitExceeded(format!(
                    "Sector '{}' exposure {} exceeds limit {}",
                    sector, exposure, self.max_sector_exposure
                )));
            }
        }

        Ok(())
    }
}

/// 검증을 통과해 제출 가능해진 주문
#[derive(Debug, Clone)]
pub struct ValidatedOrder {
    pub order: Order,
    /// 원장에 예약된 명목 금액
    pub reserved_notional: f64,
}

/// 주문 검증기
pub struct OrderValidator {
    config: Config,
    ledger: Arc<dyn AccountLedger>,
    risk: Arc<dyn RiskService>,
    // (지문, 수락 시각) - 수락된 주문만 기록한다
    recent: Mutex<VecDeque<(String, i64)>>,
}

impl OrderValidator {
    pub fn new(config: Config, ledger: Arc<dyn AccountLedger>, risk: Arc<dyn RiskService>) -> Self {
        OrderValidator {
            config,
            ledger,
            risk,
            recent: Mutex::new(VecDeque::new()),
        }
    }

    /// 현재 시각 기준 검증
    pub async fn validate(
        &self,
        intent: &OrderIntent,
        reference_price: f64,
    ) -> Result<ValidatedOrder, ValidationError> {
        self.validate_at(intent, reference_price, chrono::Utc::now().timestamp_millis())
            .await
    }

    /// 주어진 시각 기준 검증 (검사 순서 고정, 첫 실패에서 중단)
    pub async fn validate_at(
        &self,
        intent: &OrderIntent,
        reference_price: f64,
        now_ms: i64,
    ) -> Result<ValidatedOrder, ValidationError> {
        // 1. 심볼 거래 가능 여부
        if !self.config.symbols.iter().any(|s| s == &intent.symbol) {
            return Err(ValidationError::InvalidSymbol(intent.symbol.clone()));
        }

        // 2. 장 운영 시간
        self.check_market_hours(intent, now_ms)?;

        // 3. 매수 여력 예약 (포트폴리오 단위 직렬화)
        let notional = intent.quantity * intent.limit_price.unwrap_or(reference_price);
        self.ledger.reserve(&intent.portfolio_id, notional).await?;

        // 4. 리스크 한도 - 실패 시 예약을 되돌린다
        if let Err(e) = self.risk.check(intent, notional).await {
            self.ledger.release(&intent.portfolio_id, notional).await;
            return Err(e);
        }

        // 5. 중복 주문 - 실패 시 예약을 되돌린다
        let fingerprint = Self::fingerprint(intent);
        if self.is_duplicate(&fingerprint, now_ms).await {
            self.ledger.release(&intent.portfolio_id, notional).await;
            return Err(ValidationError::DuplicateOrder(fingerprint));
        }

        // 수락된 주문만 중복 판정 대상으로 기록한다
        self.record_accepted(fingerprint, now_ms).await;

        Ok(ValidatedOrder {
            order: self.build_order(intent),
            reserved_notional: notional,
        })
    }

    fn check_market_hours(&self, intent: &OrderIntent, now_ms: i64) -> Result<(), ValidationError> {
        let minute_of_day = ((now_ms / 60_000) % 1_440) as u32;
        let hours = &self.config.market_hours;

        let in_regular = minute_of_day >= hours.open_minute && minute_of_day < hours.close_minute;
        let in_extended =
            minute_of_day >= hours.extended_open_minute && minute_of_day < hours.extended_close_minute;

        if in_regular || (intent.extended_hours && in_extended) {
            Ok(())
        } else {
            Err(ValidationError::MarketClosed(intent.symbol.clone()))
        }
    }

    fn fingerprint(intent: &OrderIntent) -> String {
        format!(
            "{}|{}|{:?}|{}|{}",
            intent.portfolio_id,
            intent.symbol,
            intent.side,
            intent.quantity,
            intent.effective_price()
        )
    }

    async fn is_duplicate(&self, fingerprint: &str, now_ms: i64) -> bool {
        let window_ms = self.config.execution.dedup_window_secs as i64 * 1000;
        let recent = self.recent.lock().await;
        recent
            .iter()
            .any(|(fp, ts)| fp == fingerprint && now_ms - ts < window_ms)
    }

    async fn record_accepted(&self, fingerprint: String, now_ms: i64) {
        let window_ms = self.config.execution.dedup_window_secs as i64 * 1000;
        let mut recent = self.recent.lock().await;
        while let Some((_, ts)) = recent.front() {
            if now_ms - ts >= window_ms {
                recent.pop_front();
            } else {
                break;
            }
        }
        recent.push_back((fingerprint, now_ms));
    }

    fn build_order(&self, intent: &OrderIntent) -> Order {
        let mut order = Order::new(
            intent.portfolio_id.clone(),
            intent.symbol.clone(),
            intent.side,
            intent.order_type,
            intent.quantity,
        );
        order.limit_price = intent.limit_price;
        order.stop_price = intent.stop_price;
        order.time_in_force = intent
            .time_in_force
            .unwrap_or(self.config.execution.default_time_in_force);
        order.strategy = intent.strategy.clone().unwrap_or_default();
        order.extended_hours = intent.extended_hours;
        order.client_order_id = intent.client_order_id.clone();
        order
    }
}
