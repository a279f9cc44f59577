use crate::handlers::common::{message_response, success_response, validate_input};
use crate::{
    errors::ServiceError,
    services::payments::{ConfirmPaymentInput, CreatePaymentIntentInput},
    AppState,
};
use axum::{
    body::Bytes,
    extract::{Json, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
    Router,
};
use serde_json::json;

/// Payment routes. The webhook endpoints are unauthenticated but
/// signature-verified where the gateway supports it.
pub fn payments_routes() -> Router<AppState> {
    Router::new()
        .route("/intent", post(create_intent))
        .route("/confirm", post(confirm_payment))
        .route("/webhook/stripe", post(stripe_webhook))
        .route("/webhook/paypal", post(paypal_webhook))
}

/// Create a gateway payment intent for an order.
#[utoipa::path(
    post,
    path = "/api/v1/payments/intent",
    request_body = CreatePaymentIntentInput,
    responses(
        (status = 200, description = "Payment intent created"),
        (status = 400, description = "Order already paid or method unsupported", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn create_intent(
    State(state): State<AppState>,
    Json(payload): Json<CreatePaymentIntentInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let intent = state.services.payments.create_intent(payload).await?;
    Ok(message_response(intent, "Payment intent created"))
}

/// Confirm a pending payment against the gateway.
#[utoipa::path(
    post,
    path = "/api/v1/payments/confirm",
    request_body = ConfirmPaymentInput,
    responses(
        (status = 200, description = "Payment confirmation result"),
        (status = 400, description = "Transaction already processed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Transaction not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    Json(payload): Json<ConfirmPaymentInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let result = state.services.payments.confirm_payment(payload).await?;
    Ok(message_response(result, "Payment confirmed"))
}

async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok());

    state
        .services
        .payments
        .handle_stripe_webhook(&body, signature)
        .await?;

    Ok(success_response(json!({ "status": "success" })))
}

async fn paypal_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.payments.handle_paypal_webhook(&body).await?;
    Ok(success_response(json!({ "status": "success" })))
}
