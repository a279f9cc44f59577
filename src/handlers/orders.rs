use crate::handlers::common::{
    created_response, message_response, require_cart_session, success_response,
};
use crate::{
    entities::OrderStatus,
    errors::ServiceError,
    services::orders::{CreateOrderInput, UpdateOrderInput},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

/// Order routes: checkout, lookup, mutation and cancellation.
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/{id}", get(get_order))
        .route("/{id}", put(update_order))
        .route("/{id}/status", put(update_order_status))
        .route("/{id}", delete(cancel_order))
}

async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let session_id = require_cart_session(&headers)?;
    let order = state
        .services
        .orders
        .create_order(session_id, payload)
        .await?;
    Ok(created_response(json!({ "order": order })))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get_order(id).await?;
    Ok(success_response(json!({ "order": order })))
}

async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.update_order(id, payload).await?;
    Ok(message_response(
        json!({ "order": order }),
        "Order updated successfully",
    ))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    status: OrderStatus,
    tracking_number: Option<String>,
}

async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .update_order_status(id, payload.status, payload.tracking_number)
        .await?;
    Ok(message_response(
        json!({ "order": order }),
        "Order status updated",
    ))
}

#[derive(Debug, Default, Deserialize)]
struct CancelOrderRequest {
    reason: Option<String>,
}

async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    // Body is optional on cancel; a bare DELETE means "customer request"
    let reason = serde_json::from_slice::<CancelOrderRequest>(&body)
        .ok()
        .and_then(|p| p.reason);
    let order = state.services.orders.cancel_order(id, reason).await?;
    Ok(message_response(
        json!({ "order": order }),
        "Order cancelled successfully",
    ))
}
