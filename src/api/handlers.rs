use std::sync::Arc;
use serde_json::json;
use warp::http::StatusCode;

use crate::core::ExecutionEngine;
use crate::error::ExecutionError;
use crate::models::order::{OrderId, OrderIntent};

/// 헬스체크 핸들러
pub async fn health_handler() -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&json!({ "status": "ok" })))
}

/// 주문 의도 접수 핸들러
pub async fn create_order(
    intent: OrderIntent,
    engine: Arc<ExecutionEngine>,
) -> Result<impl warp::Reply, warp::Rejection> {
    match engine.submit_intent(intent).await {
        Ok(order) => Ok(warp::reply::with_status(
            warp::reply::json(&order),
            StatusCode::CREATED,
        )),
        Err(ExecutionError::Validation(e)) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({
                "error": e.to_string(),
                "reason_code": e.reason_code(),
            })),
            StatusCode::BAD_REQUEST,
        )),
        Err(e) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": e.to_string() })),
            StatusCode::INTERNAL_SERVER_ERROR,
        )),
    }
}

/// 전체 주문 조회 핸들러
pub async fn get_orders(engine: Arc<ExecutionEngine>) -> Result<impl warp::Reply, warp::Rejection> {
    match engine.orders().await {
        Ok(orders) => Ok(warp::reply::with_status(
            warp::reply::json(&orders),
            StatusCode::OK,
        )),
        Err(e) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": e.to_string() })),
            StatusCode::INTERNAL_SERVER_ERROR,
        )),
    }
}

/// 단일 주문 조회 핸들러
pub async fn get_order(
    order_id: String,
    engine: Arc<ExecutionEngine>,
) -> Result<impl warp::Reply, warp::Rejection> {
    match engine.order(&OrderId(order_id)).await {
        Ok(order) => Ok(warp::reply::with_status(
            warp::reply::json(&order),
            StatusCode::OK,
        )),
        Err(ExecutionError::OrderNotFound(id)) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": format!("Order not found: {}", id) })),
            StatusCode::NOT_FOUND,
        )),
        Err(e) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": e.to_string() })),
            StatusCode::INTERNAL_SERVER_ERROR,
        )),
    }
}

/// 주문 취소 핸들러
pub async fn cancel_order(
    order_id: String,
    engine: Arc<ExecutionEngine>,
) -> Result<impl warp::Reply, warp::Rejection> {
    match engine.cancel_order(&OrderId(order_id)).await {
        Ok(order) => Ok(warp::reply::with_status(
            warp::reply::json(&order),
            StatusCode::OK,
        )),
        Err(ExecutionError::AlreadyTerminal(id)) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": format!("Order already terminal: {}", id) })),
            StatusCode::CONFLICT,
        )),
        Err(ExecutionError::OrderNotFound(id)) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": format!("Order not found: {}", id) })),
            StatusCode::NOT_FOUND,
        )),
        Err(e) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": e.to_string() })),
            StatusCode::INTERNAL_SERVER_ERROR,
        )),
    }
}

/// 주문 정정 핸들러 - 취소 후 새 의도로 대체
pub async fn replace_order(
    order_id: String,
    intent: OrderIntent,
    engine: Arc<ExecutionEngine>,
) -> Result<impl warp::Reply, warp::Rejection> {
    match engine.replace_order(&OrderId(order_id), intent).await {
        Ok(order) => Ok(warp::reply::with_status(
            warp::reply::json(&order),
            StatusCode::OK,
        )),
        Err(ExecutionError::AlreadyTerminal(id)) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": format!("Order already terminal: {}", id) })),
            StatusCode::CONFLICT,
        )),
        Err(ExecutionError::Validation(e)) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({
                "error": e.to_string(),
                "reason_code": e.reason_code(),
            })),
            StatusCode::BAD_REQUEST,
        )),
        Err(e) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": e.to_string() })),
            StatusCode::INTERNAL_SERVER_ERROR,
        )),
    }
}

/// 거래 비용 보고서 핸들러
pub async fn get_tca_report(
    order_id: String,
    engine: Arc<ExecutionEngine>,
) -> Result<impl warp::Reply, warp::Rejection> {
    match engine.tca_report(&OrderId(order_id)).await {
        Ok(report) => Ok(warp::reply::with_status(
            warp::reply::json(&report),
            StatusCode::OK,
        )),
        Err(ExecutionError::OrderNotFound(id)) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": format!("Order not found: {}", id) })),
            StatusCode::NOT_FOUND,
        )),
        Err(e) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": e.to_string() })),
            StatusCode::UNPROCESSABLE_ENTITY,
        )),
    }
}
