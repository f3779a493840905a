/**
* filename : engine
* author : HAMA
* date: 2025. 5. 12.
* description:
**/

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::broker::alpaca::AlpacaBroker;
use crate::broker::binance::BinanceBroker;
use crate::broker::mocks::MockBroker;
use crate::broker::{
  BrokerAdapter, BrokerGateway, FillRouter, RetryPolicy, SecretsProvider,
};
use crate::config::{BrokerConfig, Config};
use crate::core::plan_executor::PlanExecutor;
use crate::core::reconciliation::{Reconciler, ReconciliationSummary};
use crate::core::tca::{BenchmarkPrices, TcaReport, TcaReporter, TcaStore};
use crate::error::ExecutionError;
use crate::market_data::MarketDataSource;
use crate::models::broker_account::BrokerAccount;
use crate::models::order::{Order, OrderId, OrderIntent};
use crate::order_core::{
  AccountLedger, InMemoryOrderRepository, OrderEventBus, OrderManager, OrderRepository,
  OrderValidator, RiskService,
};
use crate::strategies::planner_for;

/// 실행 엔진
///
/// 주문 의도 수신부터 검증, 계획 수립, 브로커 제출, 체결 반영,
/// 사후 비용 분석까지의 전체 경로를 묶는다.
pub struct ExecutionEngine {
  config: Config,
  validator: Arc<OrderValidator>,
  manager: Arc<OrderManager>,
  market_data: Arc<dyn MarketDataSource>,
  gateways: HashMap<String, Arc<BrokerGateway>>,
  executor: PlanExecutor,
  tca_reporter: TcaReporter,
  tca_store: Arc<TcaStore>,
  // 주문 도착 시점 기준가 (TCA 도착가 벤치마크)
  arrival_prices: RwLock<HashMap<String, f64>>,
}

impl ExecutionEngine {
  /// 설정만으로 전체 실행 경로를 조립한다
  pub async fn bootstrap(
    config: Config,
    secrets: Arc<dyn SecretsProvider>,
    market_data: Arc<dyn MarketDataSource>,
    ledger: Arc<dyn AccountLedger>,
    risk: Arc<dyn RiskService>,
  ) -> Result<Arc<Self>, ExecutionError> {
    config.validate()?;

    let repository: Arc<RwLock<dyn OrderRepository>> =
      Arc::new(RwLock::new(InMemoryOrderRepository::new()));
    let events = OrderEventBus::default();
    let manager = Arc::new(OrderManager::new(repository, events));

    let (fill_router, fill_rx) = FillRouter::new(1024);
    manager.clone().spawn_fill_loop(fill_rx);
    manager
      .clone()
      .start_expiry_monitor(config.execution.clone(), config.market_hours.clone());

    let retry_policy = RetryPolicy::new(
      config.execution.max_retry_attempts,
      config.execution.retry_initial_backoff_ms,
    );

    let mut gateways = HashMap::new();
    for broker_cfg in &config.brokers {
      let adapter = Self::build_adapter(broker_cfg, secrets.as_ref())?;
      let gateway = Arc::new(BrokerGateway::new(
        broker_cfg.name.clone(),
        adapter,
        broker_cfg.rate_limit_rpm,
        retry_policy.clone(),
      ));

      // 브로커 계정마다 장수명 체결 스트림 하나를 라우터에 붙인다
      if let Some(stream) = gateway.take_fill_stream().await {
        fill_router.attach_stream(broker_cfg.name.clone(), stream);
      }
      gateways.insert(broker_cfg.name.clone(), gateway);
    }

    let validator = Arc::new(OrderValidator::new(config.clone(), ledger, risk));
    let executor = PlanExecutor::new(manager.clone(), fill_router);

    let engine = Arc::new(ExecutionEngine {
      validator,
      manager: manager.clone(),
      market_data,
      executor,
      tca_reporter: TcaReporter::new(config.tca.benchmark.clone()),
      tca_store: Arc::new(TcaStore::new(config.tca.retention_days)),
      arrival_prices: RwLock::new(HashMap::new()),
      gateways,
      config,
    });

    // 재기동 시 메모리 상태는 원장 + 브로커 대조로 재구성한다
    engine.run_reconciliation().await?;

    Ok(engine)
  }

  fn build_adapter(
    broker_cfg: &BrokerConfig,
    secrets: &dyn SecretsProvider,
  ) -> Result<Box<dyn BrokerAdapter>, ExecutionError> {
    if broker_cfg.use_mock {
      return Ok(Box::new(MockBroker::new(broker_cfg.name.clone())));
    }

    let account = BrokerAccount {
      id: broker_cfg.name.clone(),
      broker: broker_cfg.name.clone(),
      account_number: broker_cfg.account_number.clone(),
      api_key_env: broker_cfg.api_key_env.clone(),
      api_secret_env: broker_cfg.api_secret_env.clone(),
      fractional_shares: broker_cfg.fractional_shares,
      extended_hours: broker_cfg.extended_hours,
      short_selling: broker_cfg.short_selling,
      active: true,
    };

    match broker_cfg.name.as_str() {
      "alpaca" => {
        let base_url = broker_cfg
          .base_url
          .clone()
          .unwrap_or_else(|| "https://paper-api.alpaca.markets".to_string());
        Ok(Box::new(AlpacaBroker::new(&account, base_url, secrets)?))
      }
      "binance" => {
        let base_url = broker_cfg
          .base_url
          .clone()
          .unwrap_or_else(|| "https://fapi.binance.com".to_string());
        Ok(Box::new(BinanceBroker::new(&account, base_url, secrets)?))
      }
      other => Err(ExecutionError::ConfigError(format!(
        "Unsupported broker: {}",
        other
      ))),
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn manager(&self) -> &Arc<OrderManager> {
    &self.manager
  }

  pub fn events(&self) -> &OrderEventBus {
    self.manager.events()
  }

  /// 주문 의도 접수 - 검증 후 계획을 세우고 실행 태스크를 띄운다
  pub async fn submit_intent(&self, intent: OrderIntent) -> Result<Order, ExecutionError> {
    let snapshot = self.market_data.snapshot(&intent.symbol).await?;
    let reference = if snapshot.bid > 0.0 && snapshot.ask > 0.0 {
      snapshot.mid()
    } else {
      snapshot.last
    };

    let validated = self.validator.validate(&intent, reference).await?;
    let order = self.manager.create_order(validated).await?;

    self
      .arrival_prices
      .write()
      .await
      .insert(order.id.0.clone(), reference);

    let planner = planner_for(&order.strategy, &self.config.execution);
    let plan = planner.plan(&order, &snapshot)?;
    log::info!(
      "실행 계획 수립: 주문 = {} - 전략 = {} - 자식 = {}",
      order.id,
      plan.strategy_name,
      plan.children.len()
    );

    let gateway = self.gateway_for(&self.config.default_broker)?;
    self.executor.spawn(gateway, order.clone(), plan);

    Ok(order)
  }

  /// 주문 취소 요청
  pub async fn cancel_order(&self, order_id: &OrderId) -> Result<Order, ExecutionError> {
    self.manager.request_cancel(order_id).await
  }

  /// 주문 정정 - 기존 주문을 취소 요청하고 새 의도로 대체한다
  pub async fn replace_order(
    &self,
    order_id: &OrderId,
    intent: OrderIntent,
  ) -> Result<Order, ExecutionError> {
    self.manager.request_cancel(order_id).await?;
    self.submit_intent(intent).await
  }

  pub async fn order(&self, order_id: &OrderId) -> Result<Order, ExecutionError> {
    self.manager.order(order_id).await
  }

  pub async fn orders(&self) -> Result<Vec<Order>, ExecutionError> {
    self.manager.all_orders().await
  }

  /// 종료 주문의 거래 비용 보고서 (최초 요청 시 생성, 이후 불변)
  pub async fn tca_report(&self, order_id: &OrderId) -> Result<TcaReport, ExecutionError> {
    if let Some(existing) = self.tca_store.reports_for(order_id).await.into_iter().next() {
      return Ok(existing);
    }

    let order = self.manager.order(order_id).await?;
    let trades = self.manager.trades(order_id).await?;

    let snapshot = self.market_data.snapshot(&order.symbol).await?;
    let arrival = self
      .arrival_prices
      .read()
      .await
      .get(&order_id.0)
      .copied()
      .unwrap_or_else(|| snapshot.mid());

    // 시장 이력 협력 서비스가 없을 때는 현재 스냅샷으로 벤치마크를 근사한다
    let benchmarks = BenchmarkPrices {
      arrival,
      vwap: snapshot.mid(),
      twap: snapshot.mid(),
      close: snapshot.last,
    };

    let report = self.tca_reporter.analyze(&order, &trades, &benchmarks)?;
    self.tca_store.append(report.clone()).await;
    Ok(report)
  }

  /// 원장-브로커 정합성 점검 실행
  pub async fn run_reconciliation(&self) -> Result<ReconciliationSummary, ExecutionError> {
    let reconciler = Reconciler::new(self.manager.clone(), self.gateways.clone());
    reconciler.run_startup_reconciliation().await
  }

  fn gateway_for(&self, broker: &str) -> Result<Arc<BrokerGateway>, ExecutionError> {
    self
      .gateways
      .get(broker)
      .cloned()
      .ok_or_else(|| ExecutionError::BrokerAccountNotFound(broker.to_string()))
  }
}
