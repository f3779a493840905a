use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, RwLock};

use crate::broker::secrets::SecretsProvider;
use crate::broker::traits::{BrokerAdapter, BrokerOrderRef, ChildOrderRequest, FillEvent};
use crate::error::ExecutionError;
use crate::models::broker_account::BrokerAccount;
use crate::models::order::{OrderSide, OrderType, TimeInForce};

/// Alpaca trading REST connector (minimal subset)
pub struct AlpacaBroker {
  name: String,
  base_url: String,
  api_key: String,
  api_secret: String,
  http: reqwest::Client,
  fill_tx: mpsc::Sender<FillEvent>,
  fill_rx: Option<mpsc::Receiver<FillEvent>>,
  // broker_order_id -> 마지막 보고 체결 수량 및 시퀀스
  watched: Arc<RwLock<HashMap<String, (f64, u64)>>>,
  poller_started: bool,
}

impl AlpacaBroker {
  /// 계정의 자격 증명 참조를 주입된 공급자로 해석한다.
  /// 키와 시크릿 값은 로그에 절대 남기지 않는다.
  pub fn new(
    account: &BrokerAccount,
    base_url: impl Into<String>,
    secrets: &dyn SecretsProvider,
  ) -> Result<Self, ExecutionError> {
    let api_key = account
      .api_key_env
      .as_deref()
      .and_then(|env| secrets.get(env))
      .ok_or_else(|| ExecutionError::ConfigError(format!("Missing API key for account {}", account.id)))?;
    let api_secret = account
      .api_secret_env
      .as_deref()
      .and_then(|env| secrets.get(env))
      .ok_or_else(|| ExecutionError::ConfigError(format!("Missing API secret for account {}", account.id)))?;

    let (fill_tx, fill_rx) = mpsc::channel(256);
    Ok(AlpacaBroker {
      name: "alpaca".to_string(),
      base_url: base_url.into(),
      api_key,
      api_secret,
      http: reqwest::Client::new(),
      fill_tx,
      fill_rx: Some(fill_rx),
      watched: Arc::new(RwLock::new(HashMap::new())),
      poller_started: false,
    })
  }

  fn map_http_error(status: reqwest::StatusCode, context: &str) -> ExecutionError {
    if status.as_u16() == 429 || status.is_server_error() {
      ExecutionError::BrokerTransient(format!("{} failed: {}", context, status))
    } else {
      ExecutionError::BrokerPermanent(format!("{} failed: {}", context, status))
    }
  }

  /// 미체결 주문의 체결 증가분을 주기적으로 조회해 스트림으로 내보낸다
  fn spawn_fill_poller(&mut self) {
    if self.poller_started {
      return;
    }
    self.poller_started = true;

    let http = self.http.clone();
    let base_url = self.base_url.clone();
    let api_key = self.api_key.clone();
    let api_secret = self.api_secret.clone();
    let watched = self.watched.clone();
    let fill_tx = self.fill_tx.clone();

    tokio::spawn(async move {
      let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(1));
      loop {
        interval.tick().await;

        let ids: Vec<String> = watched.read().await.keys().cloned().collect();
        for id in ids {
          let url = format!("{}/v2/orders/{}", base_url, id);
          let res = http
            .get(url)
            .header("APCA-API-KEY-ID", &api_key)
            .header("APCA-API-SECRET-KEY", &api_secret)
            .send()
            .await;

          let Ok(res) = res else { continue };
          if !res.status().is_success() {
            continue;
          }
          let Ok(json) = res.json::<serde_json::Value>().await else { continue };

          let filled = json
            .get("filled_qty")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);
          let avg_price = json
            .get("filled_avg_price")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);
          let status = json.get("status").and_then(|v| v.as_str()).unwrap_or("");

          let mut map = watched.write().await;
          if let Some((last_filled, sequence)) = map.get_mut(&id) {
            if filled > *last_filled {
              *sequence += 1;
              let _ = fill_tx
                .send(FillEvent {
                  broker_order_id: id.clone(),
                  sequence: *sequence,
                  quantity: filled - *last_filled,
                  price: avg_price,
                  commission: 0.0,
                  executed_at: Utc::now().timestamp_millis(),
                })
                .await;
              *last_filled = filled;
            }
            if matches!(status, "filled" | "canceled" | "expired" | "rejected") {
              map.remove(&id);
            }
          }
        }
      }
    });
  }

  fn side_str(side: OrderSide) -> &'static str {
    match side {
      OrderSide::Buy => "buy",
      OrderSide::Sell => "sell",
    }
  }

  fn type_str(order_type: OrderType) -> &'static str {
    match order_type {
      OrderType::Market => "market",
      OrderType::Limit => "limit",
      OrderType::Stop => "stop",
      OrderType::StopLimit => "stop_limit",
    }
  }

  fn tif_str(tif: TimeInForce) -> &'static str {
    match tif {
      TimeInForce::GTC => "gtc",
      TimeInForce::IOC => "ioc",
      TimeInForce::FOK => "fok",
      TimeInForce::Day => "day",
    }
  }
}

#[async_trait]
impl BrokerAdapter for AlpacaBroker {
  async fn submit(&mut self, request: &ChildOrderRequest) -> Result<BrokerOrderRef, ExecutionError> {
    let mut body = serde_json::json!({
      "symbol": request.symbol,
      "qty": request.quantity.to_string(),
      "side": Self::side_str(request.side),
      "type": Self::type_str(request.order_type),
      "time_in_force": Self::tif_str(request.time_in_force),
      "extended_hours": request.extended_hours,
    });
    if let Some(limit_price) = request.limit_price {
      body["limit_price"] = serde_json::json!(limit_price.to_string());
    }

    let url = format!("{}/v2/orders", self.base_url);
    let res = self
      .http
      .post(url)
      .header("APCA-API-KEY-ID", &self.api_key)
      .header("APCA-API-SECRET-KEY", &self.api_secret)
      .json(&body)
      .send()
      .await
      .map_err(|e| ExecutionError::BrokerTransient(format!("submit http error: {}", e)))?;

    if !res.status().is_success() {
      return Err(Self::map_http_error(res.status(), "submit"));
    }

    let json = res
      .json::<serde_json::Value>()
      .await
      .map_err(|e| ExecutionError::BrokerPermanent(format!("submit parse error: {}", e)))?;
    let broker_order_id = json
      .get("id")
      .and_then(|v| v.as_str())
      .ok_or_else(|| ExecutionError::BrokerPermanent("submit response missing id".to_string()))?
      .to_string();

    self.watched.write().await.insert(broker_order_id.clone(), (0.0, 0));
    self.spawn_fill_poller();

    Ok(BrokerOrderRef(broker_order_id))
  }

  async fn cancel(&mut self, broker_order_ref: &BrokerOrderRef) -> Result<bool, ExecutionError> {
    let url = format!("{}/v2/orders/{}", self.base_url, broker_order_ref.0);
    let res = self
      .http
      .delete(url)
      .header("APCA-API-KEY-ID", &self.api_key)
      .header("APCA-API-SECRET-KEY", &self.api_secret)
      .send()
      .await
      .map_err(|e| ExecutionError::BrokerTransient(format!("cancel http error: {}", e)))?;

    match res.status().as_u16() {
      204 => Ok(true),
      // 브로커가 더 이상 미체결로 알지 못하는 주문
      404 | 422 => Ok(false),
      _ => Err(Self::map_http_error(res.status(), "cancel")),
    }
  }

  async fn open_orders(&self) -> Result<Vec<BrokerOrderRef>, ExecutionError> {
    let url = format!("{}/v2/orders?status=open", self.base_url);
    let res = self
      .http
      .get(url)
      .header("APCA-API-KEY-ID", &self.api_key)
      .header("APCA-API-SECRET-KEY", &self.api_secret)
      .send()
      .await
      .map_err(|e| ExecutionError::BrokerTransient(format!("open_orders http error: {}", e)))?;

    if !res.status().is_success() {
      return Err(Self::map_http_error(res.status(), "open_orders"));
    }

    let json = res
      .json::<serde_json::Value>()
      .await
      .map_err(|e| ExecutionError::BrokerPermanent(format!("open_orders parse error: {}", e)))?;

    let refs = json
      .as_array()
      .map(|orders| {
        orders
          .iter()
          .filter_map(|o| o.get("id").and_then(|v| v.as_str()))
          .map(|id| BrokerOrderRef(id.to_string()))
          .collect()
      })
      .unwrap_or_default();

    Ok(refs)
  }

  fn take_fill_stream(&mut self) -> Option<mpsc::Receiver<FillEvent>> {
    self.fill_rx.take()
  }

  fn name(&self) -> &str {
    &self.name
  }
}
