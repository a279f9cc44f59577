//! Matchable API Library
//!
//! Backend for the Matchable training studio storefront: catalog browsing,
//! anonymous carts, session bookings, orders, and payment capture.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateways;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod rate_limiter;
pub mod services;

use axum::{extract::State, response::Json, routing::get, Router};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

/// Shared application state. Everything inside is cheaply cloneable; the
/// database handle is an injected `Arc`, never a process-global.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// Success envelope for every 2xx response.
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.to_string()),
        }
    }
}

/// Common query parameters for list endpoints
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

/// Versioned API routes.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .nest("/sessions", handlers::sessions::sessions_routes())
        .nest("/bookings", handlers::bookings::bookings_routes())
        .nest("/products", handlers::products::products_routes())
        .nest("/cart", handlers::carts::carts_routes())
        .nest("/orders", handlers::orders::orders_routes())
        .nest("/payments", handlers::payments::payments_routes())
}

async fn api_status() -> Json<ApiResponse<Value>> {
    let status = json!({
        "status": "ok",
        "service": "matchable-api",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    Json(ApiResponse::success(status))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health = json!({
        "status": db_status,
        "checks": { "database": db_status },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    Ok(Json(ApiResponse::success(health)))
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[test]
    fn success_envelope_shape() {
        let response = ApiResponse::success(json!({"ok": true}));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["ok"], true);
        assert!(value.get("message").is_none());
    }

    #[test]
    fn message_is_included_when_set() {
        let response = ApiResponse::success_with_message(json!(null), "done");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["message"], "done");
    }
}
