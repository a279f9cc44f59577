use crate::handlers::common::{
    cart_session_id, message_response, require_cart_session, success_response, validate_input,
};
use crate::{errors::ServiceError, services::carts::CartView, AppState};
use axum::{
    extract::{Json, Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use validator::Validate;

/// Routes for the anonymous shopping cart. The cart session travels in the
/// `X-Cart-Session` header; adding the first item creates it.
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/", delete(clear_cart))
        .route("/items", post(add_item))
        .route("/items/{id}", put(update_item))
        .route("/items/{id}", delete(remove_item))
        .route("/apply-coupon", post(apply_coupon))
        .route("/remove-coupon", delete(remove_coupon))
}

async fn get_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    let view = match cart_session_id(&headers) {
        Some(session_id) => state.services.carts.get_cart(session_id).await?,
        None => CartView {
            cart: None,
            items: Vec::new(),
            totals: crate::services::carts::CartTotals::empty(),
        },
    };
    Ok(success_response(view))
}

#[derive(Debug, Deserialize, Validate)]
struct AddItemRequest {
    pub product_id: i32,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub product_variant_id: Option<i32>,
}

async fn add_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    // First add creates the cart session; its id comes back in the view
    let session_id = match cart_session_id(&headers) {
        Some(session_id) => session_id,
        None => state.services.carts.create_session().await?.id,
    };

    let view = state
        .services
        .carts
        .add_item(
            session_id,
            payload.product_id,
            payload.quantity,
            payload.product_variant_id,
        )
        .await?;

    Ok(message_response(view, "Item added to cart"))
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateItemRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
}

async fn update_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(item_id): Path<i32>,
    Json(payload): Json<UpdateItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let session_id = require_cart_session(&headers)?;

    let view = state
        .services
        .carts
        .update_item(session_id, item_id, payload.quantity)
        .await?;
    Ok(message_response(view, "Cart item updated"))
}

async fn remove_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(item_id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    let session_id = require_cart_session(&headers)?;
    let view = state.services.carts.remove_item(session_id, item_id).await?;
    Ok(message_response(view, "Item removed from cart"))
}

async fn clear_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    match cart_session_id(&headers) {
        Some(session_id) => {
            state.services.carts.clear_cart(session_id).await?;
            Ok(message_response(serde_json::json!(null), "Cart cleared"))
        }
        None => Ok(message_response(
            serde_json::json!(null),
            "Cart is already empty",
        )),
    }
}

#[derive(Debug, Deserialize, Validate)]
struct ApplyCouponRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
}

async fn apply_coupon(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ApplyCouponRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let session_id = require_cart_session(&headers)?;

    let view = state
        .services
        .carts
        .apply_coupon(session_id, &payload.code)
        .await?;
    Ok(message_response(view, "Coupon applied successfully"))
}

async fn remove_coupon(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    let session_id = require_cart_session(&headers)?;
    let view = state.services.carts.remove_coupon(session_id).await?;
    Ok(message_response(view, "Coupon removed"))
}
