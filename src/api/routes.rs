use std::sync::Arc;
use warp::Filter;

use crate::api::handlers;
use crate::core::ExecutionEngine;

/// 실행 엔진의 API 라우트 생성
pub fn create_routes(
    engine: Arc<ExecutionEngine>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    // 헬스체크 라우트
    let health = warp::path("health")
        .and(warp::get())
        .and_then(handlers::health_handler);

    // 상태 필터 생성
    let engine_filter = warp::any().map(move || engine.clone());

    // 주문 관리 라우트
    let orders = warp::path("orders");

    let order_routes = orders
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(engine_filter.clone())
        .and_then(handlers::create_order)
        .or(orders
            .and(warp::path::end())
            .and(warp::get())
            .and(engine_filter.clone())
            .and_then(handlers::get_orders))
        .or(orders
            .and(warp::path::param::<String>())
            .and(warp::path::end())
            .and(warp::get())
            .and(engine_filter.clone())
            .and_then(handlers::get_order))
        .or(orders
            .and(warp::path::param::<String>())
            .and(warp::path::end())
            .and(warp::delete())
            .and(engine_filter.clone())
            .and_then(handlers::cancel_order))
        .or(orders
            .and(warp::path::param::<String>())
            .and(warp::path::end())
            .and(warp::put())
            .and(warp::body::json())
            .and(engine_filter.clone())
            .and_then(handlers::replace_order))
        .or(orders
            .and(warp::path::param::<String>())
            .and(warp::path("tca"))
            .and(warp::path::end())
            .and(warp::get())
            .and(engine_filter.clone())
            .and_then(handlers::get_tca_report));

    health.or(order_routes)
}
