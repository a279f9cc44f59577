mod common;

use async_trait::async_trait;
use chrono::Utc;
use common::{seed_order, TestApp};
use hmac::{Hmac, Mac};
use matchable_api::{
    entities::{order, payment_transaction, OrderStatus, PaymentMethod, PaymentTransactionStatus},
    errors::ServiceError,
    gateways::{GatewayIntent, GatewayPayment, IntentRequest, PaymentGateway},
    services::payments::{ConfirmPaymentInput, CreatePaymentIntentInput, PaymentService},
};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::json;
use sha2::Sha256;
use std::sync::Arc;

/// Gateway double: records nothing, answers deterministically.
struct StubGateway {
    succeed: bool,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_intent(&self, request: &IntentRequest) -> Result<GatewayIntent, ServiceError> {
        Ok(GatewayIntent {
            gateway_transaction_id: Some(format!("gw_{}", request.transaction_id)),
            client_secret: Some("cs_test_secret".to_string()),
            approval_url: None,
            raw: json!({ "id": format!("gw_{}", request.transaction_id) }),
        })
    }

    async fn fetch_payment(
        &self,
        gateway_transaction_id: &str,
    ) -> Result<GatewayPayment, ServiceError> {
        Ok(GatewayPayment {
            succeeded: self.succeed,
            gateway_transaction_id: gateway_transaction_id.to_string(),
            raw: json!({ "status": if self.succeed { "succeeded" } else { "failed" } }),
        })
    }
}

fn payment_service(app: &TestApp, succeed: bool) -> PaymentService {
    PaymentService::new(
        app.state.db.clone(),
        Arc::new(app.state.event_sender.clone()),
        "USD".to_string(),
        Some("whsec_test".to_string()),
        Some("pk_test".to_string()),
        300,
    )
    .with_gateway(PaymentMethod::Stripe, Arc::new(StubGateway { succeed }))
}

fn stripe_signature(payload: &[u8], secret: &str) -> String {
    let timestamp = Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[tokio::test]
async fn intent_records_pending_transaction() {
    let app = TestApp::new().await;
    let payments = payment_service(&app, true);
    let order = seed_order(&app, dec!(86.80)).await;

    let intent = payments
        .create_intent(CreatePaymentIntentInput {
            order_id: order.id,
            payment_method: PaymentMethod::Stripe,
        })
        .await
        .expect("intent should be created");

    assert_eq!(intent.client_secret.as_deref(), Some("cs_test_secret"));
    assert_eq!(intent.publishable_key.as_deref(), Some("pk_test"));

    let row = payment_transaction::Entity::find()
        .filter(payment_transaction::Column::TransactionId.eq(intent.transaction_id.clone()))
        .one(app.db())
        .await
        .unwrap()
        .expect("transaction row recorded");
    assert_eq!(row.status, PaymentTransactionStatus::Pending);
    assert_eq!(row.amount, dec!(86.80));
    assert_eq!(row.order_id, order.id);
}

#[tokio::test]
async fn intent_rejected_for_paid_order() {
    let app = TestApp::new().await;
    let payments = payment_service(&app, true);
    let order = seed_order(&app, dec!(50.00)).await;

    let mut paid: order::ActiveModel = order.clone().into();
    paid.payment_status = Set("paid".to_string());
    paid.update(app.db()).await.unwrap();

    let err = payments
        .create_intent(CreatePaymentIntentInput {
            order_id: order.id,
            payment_method: PaymentMethod::Stripe,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn unconfigured_method_is_rejected() {
    let app = TestApp::new().await;
    let payments = payment_service(&app, true); // only stripe registered
    let order = seed_order(&app, dec!(50.00)).await;

    let err = payments
        .create_intent(CreatePaymentIntentInput {
            order_id: order.id,
            payment_method: PaymentMethod::Paypal,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn successful_confirmation_marks_order_paid() {
    let app = TestApp::new().await;
    let payments = payment_service(&app, true);
    let order = seed_order(&app, dec!(86.80)).await;

    let intent = payments
        .create_intent(CreatePaymentIntentInput {
            order_id: order.id,
            payment_method: PaymentMethod::Stripe,
        })
        .await
        .unwrap();

    let result = payments
        .confirm_payment(ConfirmPaymentInput {
            transaction_id: intent.transaction_id.clone(),
            payment_method: PaymentMethod::Stripe,
            gateway_data: None,
        })
        .await
        .unwrap();
    assert!(result.success);

    let row = payment_transaction::Entity::find()
        .filter(payment_transaction::Column::TransactionId.eq(intent.transaction_id.clone()))
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, PaymentTransactionStatus::Completed);
    assert!(row.processed_at.is_some());

    let updated = order::Entity::find_by_id(order.id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.payment_status, "paid");
    assert_eq!(updated.status, OrderStatus::Processing);

    // A second confirmation attempt is rejected
    let err = payments
        .confirm_payment(ConfirmPaymentInput {
            transaction_id: intent.transaction_id,
            payment_method: PaymentMethod::Stripe,
            gateway_data: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn failed_confirmation_leaves_order_unpaid() {
    let app = TestApp::new().await;
    let payments = payment_service(&app, false);
    let order = seed_order(&app, dec!(30.00)).await;

    let intent = payments
        .create_intent(CreatePaymentIntentInput {
            order_id: order.id,
            payment_method: PaymentMethod::Stripe,
        })
        .await
        .unwrap();

    let result = payments
        .confirm_payment(ConfirmPaymentInput {
            transaction_id: intent.transaction_id.clone(),
            payment_method: PaymentMethod::Stripe,
            gateway_data: None,
        })
        .await
        .unwrap();
    assert!(!result.success);

    let row = payment_transaction::Entity::find()
        .filter(payment_transaction::Column::TransactionId.eq(intent.transaction_id))
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, PaymentTransactionStatus::Failed);

    let updated = order::Entity::find_by_id(order.id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.payment_status, "pending");
    assert_eq!(updated.status, OrderStatus::Pending);
}

#[tokio::test]
async fn stripe_webhook_resolves_transaction_by_metadata() {
    let app = TestApp::new().await;
    let payments = payment_service(&app, true);
    let order = seed_order(&app, dec!(86.80)).await;

    let intent = payments
        .create_intent(CreatePaymentIntentInput {
            order_id: order.id,
            payment_method: PaymentMethod::Stripe,
        })
        .await
        .unwrap();

    let payload = serde_json::to_vec(&json!({
        "type": "payment_intent.succeeded",
        "data": { "object": {
            "id": format!("gw_{}", intent.transaction_id),
            "metadata": { "transaction_id": intent.transaction_id },
        }}
    }))
    .unwrap();
    let header = stripe_signature(&payload, "whsec_test");

    payments
        .handle_stripe_webhook(&payload, Some(&header))
        .await
        .expect("webhook accepted");

    let row = payment_transaction::Entity::find()
        .filter(payment_transaction::Column::TransactionId.eq(intent.transaction_id.clone()))
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, PaymentTransactionStatus::Completed);

    // Redelivery is idempotent
    payments
        .handle_stripe_webhook(&payload, Some(&header))
        .await
        .expect("redelivery accepted");
}

#[tokio::test]
async fn stripe_webhook_rejects_bad_signature() {
    let app = TestApp::new().await;
    let payments = payment_service(&app, true);

    let payload = br#"{"type":"payment_intent.succeeded"}"#;
    let header = stripe_signature(payload, "whsec_wrong");

    let err = payments
        .handle_stripe_webhook(payload, Some(&header))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));

    let err = payments.handle_stripe_webhook(payload, None).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));
}

#[tokio::test]
async fn paypal_webhook_resolves_transaction_by_custom_id() {
    let app = TestApp::new().await;
    let payments = payment_service(&app, true)
        .with_gateway(PaymentMethod::Paypal, Arc::new(StubGateway { succeed: true }));
    let order = seed_order(&app, dec!(42.00)).await;

    let intent = payments
        .create_intent(CreatePaymentIntentInput {
            order_id: order.id,
            payment_method: PaymentMethod::Paypal,
        })
        .await
        .unwrap();

    let payload = serde_json::to_vec(&json!({
        "event_type": "PAYMENT.CAPTURE.COMPLETED",
        "resource": {
            "id": "CAPTURE-1",
            "custom_id": intent.transaction_id,
        }
    }))
    .unwrap();

    payments
        .handle_paypal_webhook(&payload)
        .await
        .expect("webhook accepted");

    let row = payment_transaction::Entity::find()
        .filter(payment_transaction::Column::TransactionId.eq(intent.transaction_id))
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, PaymentTransactionStatus::Completed);

    let updated = order::Entity::find_by_id(order.id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.payment_status, "paid");
}
