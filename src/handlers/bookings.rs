use crate::handlers::common::{created_response, message_response, success_response};
use crate::{errors::ServiceError, services::bookings::CreateBookingInput, AppState};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde_json::json;

/// Routes for creating, fetching and cancelling bookings.
pub fn bookings_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_booking))
        .route("/{booking_number}", get(get_booking))
        .route("/{booking_number}/cancel", put(cancel_booking))
}

async fn create_booking(
    State(state): State<AppState>,
    Json(payload): Json<CreateBookingInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let booking = state.services.bookings.create_booking(payload).await?;
    Ok(created_response(json!({
        "message": "Booking created successfully",
        "booking": booking,
    })))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(booking_number): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let booking = state.services.bookings.get_booking(&booking_number).await?;
    Ok(success_response(booking))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_number): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .bookings
        .cancel_booking(&booking_number)
        .await?;
    Ok(message_response(
        json!({ "booking_number": booking_number }),
        "Booking cancelled successfully",
    ))
}
