use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::{mpsc, RwLock};

use crate::broker::secrets::SecretsProvider;
use crate::broker::traits::{BrokerAdapter, BrokerOrderRef, ChildOrderRequest, FillEvent};
use crate::error::ExecutionError;
use crate::models::broker_account::BrokerAccount;
use crate::models::order::{OrderSide, OrderType, TimeInForce};

type HmacSha256 = Hmac<Sha256>;

/// Binance USDT-M Futures REST connector (minimal subset)
pub struct BinanceBroker {
  name: String,
  base_url: String,
  api_key: String,
  api_secret: String,
  http: reqwest::Client,
  fill_tx: mpsc::Sender<FillEvent>,
  fill_rx: Option<mpsc::Receiver<FillEvent>>,
  // broker_order_id -> (symbol, 마지막 보고 체결 수량, 시퀀스)
  watched: Arc<RwLock<HashMap<String, (String, f64, u64)>>>,
  poller_started: bool,
}

impl BinanceBroker {
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
    Ok(BinanceBroker {
      name: "binance".to_string(),
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

  fn sign(&self, query: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
      .expect("HMAC accepts keys of any length");
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
  }

  fn map_http_error(status: reqwest::StatusCode, context: &str) -> ExecutionError {
    if status.as_u16() == 429 || status.as_u16() == 418 || status.is_server_error() {
      ExecutionError::BrokerTransient(format!("{} failed: {}", context, status))
    } else {
      ExecutionError::BrokerPermanent(format!("{} failed: {}", context, status))
    }
  }

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
      let sign = move |secret: &str, query: &str| {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
          .expect("HMAC accepts keys of any length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
      };

      let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(1));
      loop {
        interval.tick().await;

        let entries: Vec<(String, String)> = watched
          .read()
          .await
          .iter()
          .map(|(id, (symbol, _, _))| (id.clone(), symbol.clone()))
          .collect();

        for (id, symbol) in entries {
          let query = format!(
            "symbol={}&orderId={}&timestamp={}",
            symbol,
            id,
            Utc::now().timestamp_millis()
          );
          let signature = sign(&api_secret, &query);
          let url = format!("{}/fapi/v1/order?{}&signature={}", base_url, query, signature);

          let res = http.get(url).header("X-MBX-APIKEY", &api_key).send().await;
          let Ok(res) = res else { continue };
          if !res.status().is_success() {
            continue;
          }
          let Ok(json) = res.json::<serde_json::Value>().await else { continue };

          let executed = json
            .get("executedQty")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);
          let avg_price = json
            .get("avgPrice")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);
          let status = json.get("status").and_then(|v| v.as_str()).unwrap_or("");

          let mut map = watched.write().await;
          if let Some((_, last_filled, sequence)) = map.get_mut(&id) {
            if executed > *last_filled {
              *sequence += 1;
              let _ = fill_tx
                .send(FillEvent {
                  broker_order_id: id.clone(),
                  sequence: *sequence,
                  quantity: executed - *last_filled,
                  price: avg_price,
                  commission: 0.0,
                  executed_at: Utc::now().timestamp_millis(),
                })
                .await;
              *last_filled = executed;
            }
            if matches!(status, "FILLED" | "CANCELED" | "EXPIRED" | "REJECTED") {
              map.remove(&id);
            }
          }
        }
      }
    });
  }

  fn side_str(side: OrderSide) -> &'static str {
    match side {
      OrderSide::Buy => "BUY",
      OrderSide::Sell => "SELL",
    }
  }

  fn tif_str(tif: TimeInForce) -> &'static str {
    match tif {
      TimeInForce::GTC => "GTC",
      TimeInForce::IOC => "IOC",
      TimeInForce::FOK => "FOK",
      TimeInForce::Day => "GTD",
    }
  }
}

#[async_trait]
impl BrokerAdapter for BinanceBroker {
  async fn submit(&mut self, request: &ChildOrderRequest) -> Result<BrokerOrderRef, ExecutionError> {
    let order_type = match request.order_type {
      OrderType::Market => "MARKET",
      OrderType::Limit => "LIMIT",
      OrderType::Stop => "STOP_MARKET",
      OrderType::StopLimit => "STOP",
    };

    let ts = Utc::now().timestamp_millis();
    let mut params = vec![
      format!("symbol={}", request.symbol),
      format!("side={}", Self::side_str(request.side)),
      format!("type={}", order_type),
      format!("quantity={}", request.quantity),
      format!("timestamp={}", ts),
    ];
    if let Some(limit_price) = request.limit_price {
      params.push(format!("price={}", limit_price));
      params.push(format!("timeInForce={}", Self::tif_str(request.time_in_force)));
    }
    let query = params.join("&");
    let signature = self.sign(&query);
    let url = format!("{}/fapi/v1/order?{}&signature={}", self.base_url, query, signature);

    let res = self
      .http
      .post(url)
      .header("X-MBX-APIKEY", &self.api_key)
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
      .get("orderId")
      .and_then(|v| v.as_i64())
      .map(|id| id.to_string())
      .ok_or_else(|| ExecutionError::BrokerPermanent("submit response missing orderId".to_string()))?;

    self
      .watched
      .write()
      .await
      .insert(broker_order_id.clone(), (request.symbol.clone(), 0.0, 0));
    self.spawn_fill_poller();

    Ok(BrokerOrderRef(broker_order_id))
  }

  async fn cancel(&mut self, broker_order_ref: &BrokerOrderRef) -> Result<bool, ExecutionError> {
    let symbol = self
      .watched
      .read()
      .await
      .get(&broker_order_ref.0)
      .map(|(symbol, _, _)| symbol.clone());
    let Some(symbol) = symbol else {
      return Ok(false);
    };

    let query = format!(
      "symbol={}&orderId={}&timestamp={}",
      symbol,
      broker_order_ref.0,
      Utc::now().timestamp_millis()
    );
    let signature = self.sign(&query);
    let url = format!("{}/fapi/v1/order?{}&signature={}", self.base_url, query, signature);

    let res = self
      .http
      .delete(url)
      .header("X-MBX-APIKEY", &self.api_key)
      .send()
      .await
      .map_err(|e| ExecutionError::BrokerTransient(format!("cancel http error: {}", e)))?;

    match res.status().as_u16() {
      200 => Ok(true),
      400 | 404 => Ok(false),
      _ => Err(Self::map_http_error(res.status(), "cancel")),
    }
  }

  async fn open_orders(&self) -> Result<Vec<BrokerOrderRef>, ExecutionError> {
    let query = format!("timestamp={}", Utc::now().timestamp_millis());
    let signature = self.sign(&query);
    let url = format!("{}/fapi/v1/openOrders?{}&signature={}", self.base_url, query, signature);

    let res = self
      .http
      .get(url)
      .header("X-MBX-APIKEY", &self.api_key)
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
          .filter_map(|o| o.get("orderId").and_then(|v| v.as_i64()))
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

#[cfg(test)]
mod tests {
  use super::*;
  use crate::broker::secrets::StaticSecrets;

  fn account() -> BrokerAccount {
    BrokerAccount::new("acc-2", "binance", "B-001")
      .with_credential_envs("BINANCE_KEY", "BINANCE_SECRET")
  }

  #[test]
  fn test_signature_is_deterministic_hex() {
    let secrets = StaticSecrets::new()
      .with("BINANCE_KEY", "key")
      .with("BINANCE_SECRET", "secret");
    let broker = BinanceBroker::new(&account(), "https://fapi.binance.com", &secrets).unwrap();

    let first = broker.sign("symbol=BTCUSDT&timestamp=1000");
    let second = broker.sign("symbol=BTCUSDT&timestamp=1000");

    assert_eq!(first, second);
    assert_eq!(first.len(), 64);
    assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn test_missing_credentials_is_config_error() {
    let account = BrokerAccount::new("acc-2", "binance", "B-001");
    let result = BinanceBroker::new(&account, "https://fapi.binance.com", &StaticSecrets::new());
    assert!(matches!(result, Err(ExecutionError::ConfigError(_))));
  }
}
