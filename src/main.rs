/**
* filename : lib
* author : HAMA
* date: 2025. 5. 8.
* description:
**/

mod api;
mod broker;
mod config;
mod core;
mod error;
mod market_data;
mod models;
mod order_core;
mod strategies;
mod utils;

use std::sync::Arc;

use crate::broker::EnvSecrets;
use crate::config::Config;
use crate::core::ExecutionEngine;
use crate::market_data::{MarketDataSource, StaticMarketData};
use crate::models::market_data::MarketSnapshot;
use crate::order_core::{InMemoryLedger, StaticRiskService};
use crate::utils::logging;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // 로깅 초기화
    logging::init()?;
    log::info!("주문 실행 엔진 시작...");

    // 설정 로드 (잘못된 전략 파라미터나 자격 증명 누락은 여기서 치명 오류)
    let config = Config::load()?;
    log::info!("설정 로드 완료: 기본 브로커 = {}", config.default_broker);

    // 시장 데이터 공급자 생성 (실서비스에서는 외부 피드 협력 서비스)
    let market_data = Arc::new(StaticMarketData::new());
    for symbol in &config.symbols {
        market_data
            .set_snapshot(
                MarketSnapshot::new(
                    symbol.clone(),
                    chrono::Utc::now().timestamp_millis(),
                    99.9,
                    100.1,
                    100.0,
                )
                .with_volume(1_000_000.0)
                .with_volatility(1.0),
            )
            .await;
    }

    // 매수 여력 원장 및 리스크 협력 서비스
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.set_balance("default", 1_000_000.0).await;
    let risk = Arc::new(StaticRiskService::new(&config));

    // 실행 엔진 조립 (기동 시 원장-브로커 정합성 점검 포함)
    let engine = ExecutionEngine::bootstrap(
        config.clone(),
        Arc::new(EnvSecrets),
        market_data.clone() as Arc<dyn MarketDataSource>,
        ledger,
        risk,
    )
    .await?;
    log::info!("실행 엔진 초기화 완료");

    // API 라우트 초기화
    let routes = api::routes::create_routes(engine);
    log::info!("API 라우트 초기화 완료");

    // Warp 서버 시작
    let addr: std::net::SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;
    log::info!("서버 시작: http://{}/", addr);
    warp::serve(routes).run(addr).await;

    Ok(())
}
