use crate::handlers::common::success_response;
use crate::{errors::ServiceError, services::sessions::SessionFilters, AppState};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;

/// Routes for browsing sessions, session types and trainers.
pub fn sessions_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sessions))
        .route("/types", get(list_session_types))
        .route("/trainers", get(list_trainers))
        .route("/{id}", get(get_session))
        .route("/{id}/availability", get(get_availability))
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(filters): Query<SessionFilters>,
) -> Result<impl IntoResponse, ServiceError> {
    let sessions = state.services.sessions.list_sessions(&filters).await?;

    Ok(success_response(json!({
        "sessions": sessions,
        "total": sessions.len(),
        "filters_applied": {
            "date": filters.date,
            "type": filters.session_type,
            "trainer_id": filters.trainer_id,
            "duration": filters.duration,
        },
    })))
}

async fn list_session_types(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let types = state.services.sessions.list_session_types().await?;
    Ok(success_response(json!({ "session_types": types })))
}

#[derive(Debug, Deserialize)]
struct TrainerQuery {
    specialization: Option<String>,
}

async fn list_trainers(
    State(state): State<AppState>,
    Query(query): Query<TrainerQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let trainers = state
        .services
        .sessions
        .list_trainers(query.specialization.as_deref())
        .await?;
    Ok(success_response(json!({ "trainers": trainers })))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state.services.sessions.get_session(id).await?;
    Ok(success_response(session))
}

async fn get_availability(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    let availability = state.services.sessions.get_availability(id).await?;
    Ok(success_response(availability))
}
