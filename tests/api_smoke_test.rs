mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{seed_session, seed_session_type, seed_trainer, TestApp};
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use serde_json::Value;
use tower::ServiceExt;

fn router(app: &TestApp) -> Router {
    matchable_api::api_v1_routes().with_state(app.state.clone())
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn status_endpoint_reports_ok() {
    let app = TestApp::new().await;
    let response = router(&app)
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["service"], "matchable-api");
}

#[tokio::test]
async fn sessions_listing_returns_envelope() {
    let app = TestApp::new().await;
    let trainer = seed_trainer(&app, "Ana Costa").await;
    let session_type = seed_session_type(&app, "padel").await;
    seed_session(&app, session_type.id, trainer.id, dec!(50.00), 4).await;

    let response = router(&app)
        .oneshot(Request::get("/sessions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["total"], 1);
    let session = &body["data"]["sessions"][0];
    assert_eq!(session["session_type"]["name"], "padel");
    assert_eq!(session["trainer"]["name"], "Ana Costa");
    assert_eq!(session["available_spots"], 4);
}

#[tokio::test]
async fn missing_session_is_a_404_envelope() {
    let app = TestApp::new().await;
    let response = router(&app)
        .oneshot(Request::get("/sessions/999").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn cart_without_header_is_empty() {
    let app = TestApp::new().await;
    let response = router(&app)
        .oneshot(Request::get("/cart").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"]["cart"], Value::Null);
    assert_eq!(body["data"]["items"], serde_json::json!([]));
}

#[tokio::test]
async fn invalid_booking_payload_is_a_422() {
    let app = TestApp::new().await;
    let payload = serde_json::json!({
        "client_name": "J",
        "client_email": "not-an-email",
        "client_phone": "123",
        "sessions": [1],
        "terms_accepted": true,
    });

    let response = router(&app)
        .oneshot(
            Request::post("/bookings")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["details"].get("client_email").is_some());
}

#[tokio::test]
async fn non_numeric_session_ids_are_rejected_at_the_edge() {
    let app = TestApp::new().await;
    let payload = serde_json::json!({
        "client_name": "Jamie Doe",
        "client_email": "jamie@example.com",
        "client_phone": "5551234567",
        "sessions": ["abc"],
        "terms_accepted": true,
    });

    let response = router(&app)
        .oneshot(
            Request::post("/bookings")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    // Typed deserialization refuses the payload before any handler runs
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
