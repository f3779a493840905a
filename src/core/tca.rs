/**
* filename : tca
* author : HAMA
* date: 2025. 5. 11.
* description:
**/

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ExecutionError;
use crate::models::order::{Order, OrderId, OrderSide};
use crate::models::trade::Trade;

/// 거래 비용 분석 기준 가격
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkPrices {
  /// 주문 도착 시점 가격
  pub arrival: f64,
  /// 실행 구간 VWAP
  pub vwap: f64,
  /// 실행 구간 TWAP
  pub twap: f64,
  /// 종가
  pub close: f64,
}

/// 사후 거래 비용 분석 보고서 (추가 전용, 불변)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcaReport {
  pub order_id: OrderId,
  pub symbol: String,
  pub strategy: String,
  pub benchmark: String,
  pub filled_quantity: f64,
  pub average_fill_price: f64,
  pub arrival_price: f64,
  /// 도착가 대비 평균 체결가 차이 (bps, 불리하면 양수)
  pub slippage_bps: f64,
  /// 도착가 기준 페이퍼 포트폴리오 대비 실현 비용 (통화 단위, 수수료 포함)
  pub implementation_shortfall: f64,
  /// 실행 구간 동안의 가격 이동 (bps, 주문 방향 기준)
  pub market_impact_bps: f64,
  /// 기준 대비 실행 타이밍 비용 (bps)
  pub timing_cost_bps: f64,
  /// 유효 스프레드 (bps)
  pub effective_spread_bps: f64,
  pub commission: f64,
  pub trade_count: usize,
  pub generated_at: i64,
}

/// 거래 비용 분석기
///
/// 종료 상태의 주문과 그 체결만 읽는다. 어떤 것도 변경하지 않는다.
pub struct TcaReporter {
  benchmark: String,
}

impl TcaReporter {
  pub fn new(benchmark: impl Into<String>) -> Self {
    TcaReporter {
      benchmark: benchmark.into(),
    }
  }

  /// 종료 주문의 실행 비용 분석
  pub fn analyze(
    &self,
    order: &Order,
    trades: &[Trade],
    benchmarks: &BenchmarkPrices,
  ) -> Result<TcaReport, ExecutionError> {
    if !order.is_terminal() {
      return Err(ExecutionError::Unknown(format!(
        "TCA requires a terminal order: {} is {}",
        order.id, order.status
      )));
    }
    if trades.is_empty() || order.filled_quantity <= 0.0 {
      return Err(ExecutionError::Unknown(format!(
        "TCA requires fills: order {} has none",
        order.id
      )));
    }
    if benchmarks.arrival <= 0.0 {
      return Err(ExecutionError::Unknown("arrival price must be positive".to_string()));
    }

    // 매수는 비싸게 사면 비용, 매도는 싸게 팔면 비용
    let sign = match order.side {
      OrderSide::Buy => 1.0,
      OrderSide::Sell => -1.0,
    };

    let avg_fill = Self::volume_weighted_price(trades);
    let arrival = benchmarks.arrival;

    let slippage_bps = sign * (avg_fill - arrival) / arrival * 10_000.0;
    let implementation_shortfall =
      sign * (avg_fill - arrival) * order.filled_quantity + order.commission;
    let market_impact_bps = sign * (benchmarks.close - arrival) / arrival * 10_000.0;
    let timing_cost_bps = sign * (benchmarks.vwap - arrival) / arrival * 10_000.0;
    let effective_spread_bps = 2.0 * (avg_fill - arrival).abs() / arrival * 10_000.0;

    Ok(TcaReport {
      order_id: order.id.clone(),
      symbol: order.symbol.clone(),
      strategy: order.strategy.kind().to_string(),
      benchmark: self.benchmark.clone(),
      filled_quantity: order.filled_quantity,
      average_fill_price: avg_fill,
      arrival_price: arrival,
      slippage_bps,
      implementation_shortfall,
      market_impact_bps,
      timing_cost_bps,
      effective_spread_bps,
      commission: order.commission,
      trade_count: trades.len(),
      generated_at: chrono::Utc::now().timestamp_millis(),
    })
  }

  fn volume_weighted_price(trades: &[Trade]) -> f64 {
    let total_value: f64 = trades.iter().map(|t| t.value()).sum();
    let total_quantity: f64 = trades.iter().map(|t| t.quantity).sum();
    if total_quantity > 0.0 {
      total_value / total_quantity
    } else {
      0.0
    }
  }
}

/// 추가 전용 보고서 저장소
///
/// 설정된 보존 기간이 지난 보고서만 정리 대상이 된다.
pub struct TcaStore {
  retention_ms: i64,
  reports: RwLock<Vec<TcaReport>>,
}

impl TcaStore {
  pub fn new(retention_days: i64) -> Self {
    TcaStore {
      retention_ms: retention_days * 86_400_000,
      reports: RwLock::new(Vec::new()),
    }
  }

  pub async fn append(&self, report: TcaReport) {
    self.reports.write().await.push(report);
  }

  pub async fn reports_for(&self, order_id: &OrderId) -> Vec<TcaReport> {
    self
      .reports
      .read()
      .await
      .iter()
      .filter(|r| &r.order_id == order_id)
      .cloned()
      .collect()
  }

  pub async fn all_reports(&self) -> Vec<TcaReport> {
    self.reports.read().await.clone()
  }

  /// 보존 기간이 지난 보고서 정리
  pub async fn prune(&self, now_ms: i64) {
    let retention_ms = self.retention_ms;
    self
      .reports
      .write()
      .await
      .retain(|r| now_ms - r.generated_at < retention_ms);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::order::{OrderStatus, OrderType};

  fn filled_order(side: OrderSide, avg_price: f64) -> Order {
    let mut order = Order::new("pf-1", "AAPL", side, OrderType::Limit, 10.0);
    order.status = OrderStatus::Filled;
    order.filled_quantity = 10.0;
    order.average_fill_price = avg_price;
    order.commission = 1.0;
    order
  }

  fn trade(order: &Order, quantity: f64, price: f64, sequence: u64) -> Trade {
    Trade::new(
      format!("t-{}", sequence),
      order.id.clone(),
      order.symbol.clone(),
      order.side,
      quantity,
      price,
      0.5,
      sequence,
      1_000,
    )
  }

  fn benchmarks() -> BenchmarkPrices {
    BenchmarkPrices {
      arrival: 100.0,
      vwap: 100.2,
      twap: 100.1,
      close: 100.5,
    }
  }

  #[test]
  fn test_buy_slippage_positive_when_paying_up() {
    let order = filled_order(OrderSide::Buy, 100.3);
    let trades = vec![trade(&order, 10.0, 100.3, 1)];

    let report = TcaReporter::new("arrival")
      .analyze(&order, &trades, &benchmarks())
      .unwrap();

    // 100 도착가에 100.3 체결 = 30bps 불리
    assert!((report.slippage_bps - 30.0).abs() < 1e-6);
    // (100.3 - 100) * 10 + 수수료 1.0
    assert!((report.implementation_shortfall - 4.0).abs() < 1e-9);
    assert!(report.market_impact_bps > 0.0);
  }

  #[test]
  fn test_sell_slippage_positive_when_selling_down() {
    let order = filled_order(OrderSide::Sell, 99.7);
    let trades = vec![trade(&order, 10.0, 99.7, 1)];

    let report = TcaReporter::new("arrival")
      .analyze(&order, &trades, &benchmarks())
      .unwrap();

    assert!((report.slippage_bps - 30.0).abs() < 1e-6);
  }

  #[test]
  fn test_average_price_is_volume_weighted() {
    let order = filled_order(OrderSide::Buy, 0.0);
    let trades = vec![trade(&order, 8.0, 100.0, 1), trade(&order, 2.0, 102.0, 2)];

    let report = TcaReporter::new("arrival")
      .analyze(&order, &trades, &benchmarks())
      .unwrap();

    assert!((report.average_fill_price - 100.4).abs() < 1e-9);
    assert_eq!(report.trade_count, 2);
  }

  #[test]
  fn test_non_terminal_order_rejected() {
    let mut order = filled_order(OrderSide::Buy, 100.0);
    order.status = OrderStatus::PartiallyFilled;
    let trades = vec![trade(&order, 10.0, 100.0, 1)];

    assert!(TcaReporter::new("arrival")
      .analyze(&order, &trades, &benchmarks())
      .is_err());
  }

  #[tokio::test]
  async fn test_store_is_append_only_with_retention() {
    let store = TcaStore::new(1);
    let order = filled_order(OrderSide::Buy, 100.0);
    let trades = vec![trade(&order, 10.0, 100.0, 1)];
    let mut report = TcaReporter::new("arrival")
      .analyze(&order, &trades, &benchmarks())
      .unwrap();

    store.append(report.clone()).await;
    assert_eq!(store.reports_for(&order.id).await.len(), 1);

    // 보존 기간을 넘긴 보고서는 정리된다
    report.generated_at -= 2 * 86_400_000;
    store.append(report).await;
    let now = chrono::Utc::now().timestamp_millis();
    store.prune(now).await;
    assert_eq!(store.reports_for(&order.id).await.len(), 1);
  }
}
