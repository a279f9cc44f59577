use crate::{
    entities::{
        order, payment_transaction, PaymentMethod, PaymentTransactionStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    gateways::{IntentRequest, PaymentGateway},
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePaymentIntentInput {
    pub order_id: i32,
    /// `stripe` or `paypal`
    #[schema(value_type = String, example = "stripe")]
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentIntentResponse {
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publishable_key: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConfirmPaymentInput {
    #[validate(length(min = 1))]
    pub transaction_id: String,
    /// `stripe` or `paypal`
    #[schema(value_type = String, example = "stripe")]
    pub payment_method: PaymentMethod,
    /// Gateway-specific data, e.g. `{"payment_intent_id": "pi_..."}`
    #[schema(value_type = Object)]
    pub gateway_data: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfirmPaymentResult {
    pub success: bool,
    pub transaction_id: String,
    pub message: String,
}

/// Payment intents, confirmation and webhook-driven status updates.
///
/// Confirmation is synchronous — the caller needs the result — while the
/// webhook path performs the identical transaction/order update when the
/// gateway pushes the final state asynchronously.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    gateways: HashMap<PaymentMethod, Arc<dyn PaymentGateway>>,
    currency: String,
    stripe_webhook_secret: Option<String>,
    stripe_publishable_key: Option<String>,
    webhook_tolerance_secs: u64,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        currency: String,
        stripe_webhook_secret: Option<String>,
        stripe_publishable_key: Option<String>,
        webhook_tolerance_secs: u64,
    ) -> Self {
        Self {
            db,
            event_sender,
            gateways: HashMap::new(),
            currency,
            stripe_webhook_secret,
            stripe_publishable_key,
            webhook_tolerance_secs,
        }
    }

    /// Register a gateway client for a payment method.
    pub fn with_gateway(mut self, method: PaymentMethod, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(method, gateway);
        self
    }

    fn gateway(&self, method: PaymentMethod) -> Result<&Arc<dyn PaymentGateway>, ServiceError> {
        self.gateways.get(&method).ok_or_else(|| {
            ServiceError::InvalidOperation(format!("Unsupported payment method: {method}"))
        })
    }

    /// Create a gateway payment intent for an order and record the pending
    /// transaction row.
    #[instrument(skip(self), fields(order_id = input.order_id))]
    pub async fn create_intent(
        &self,
        input: CreatePaymentIntentInput,
    ) -> Result<PaymentIntentResponse, ServiceError> {
        let order = order::Entity::find_by_id(input.order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        if order.payment_status != "pending" {
            return Err(ServiceError::InvalidOperation(
                "Order payment already processed".to_string(),
            ));
        }

        let transaction_id = Uuid::new_v4().to_string();
        let gateway = self.gateway(input.payment_method)?;
        let intent = gateway
            .create_intent(&IntentRequest {
                order_id: order.id,
                transaction_id: transaction_id.clone(),
                amount: order.total_amount,
                currency: self.currency.clone(),
            })
            .await?;

        payment_transaction::ActiveModel {
            order_id: Set(order.id),
            transaction_id: Set(transaction_id.clone()),
            payment_method: Set(input.payment_method),
            status: Set(PaymentTransactionStatus::Pending),
            amount: Set(order.total_amount),
            currency: Set(self.currency.clone()),
            gateway_transaction_id: Set(intent.gateway_transaction_id.clone()),
            gateway_response: Set(Some(intent.raw.clone())),
            processed_at: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!(order_id = order.id, transaction_id, "payment intent created");

        Ok(PaymentIntentResponse {
            transaction_id,
            client_secret: intent.client_secret,
            approval_url: intent.approval_url,
            publishable_key: match input.payment_method {
                PaymentMethod::Stripe => self.stripe_publishable_key.clone(),
                PaymentMethod::Paypal => None,
            },
        })
    }

    /// Confirm a pending transaction by querying the gateway for its final
    /// status, then update the transaction and, on success, the order —
    /// one transaction.
    #[instrument(skip(self, input), fields(transaction_id = %input.transaction_id))]
    pub async fn confirm_payment(
        &self,
        input: ConfirmPaymentInput,
    ) -> Result<ConfirmPaymentResult, ServiceError> {
        input.validate()?;

        let transaction = payment_transaction::Entity::find()
            .filter(payment_transaction::Column::TransactionId.eq(input.transaction_id.clone()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Transaction not found".to_string()))?;

        if transaction.status != PaymentTransactionStatus::Pending {
            return Err(ServiceError::InvalidOperation(
                "Transaction already processed".to_string(),
            ));
        }

        let gateway_transaction_id = input
            .gateway_data
            .as_ref()
            .and_then(|d| d.get("payment_intent_id"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| transaction.gateway_transaction_id.clone())
            .ok_or_else(|| {
                ServiceError::PaymentFailed("Gateway transaction id required".to_string())
            })?;

        let gateway = self.gateway(input.payment_method)?;
        let payment = gateway.fetch_payment(&gateway_transaction_id).await?;

        self.record_gateway_result(
            &input.transaction_id,
            payment.succeeded,
            &payment.gateway_transaction_id,
            payment.raw,
        )
        .await?;

        Ok(ConfirmPaymentResult {
            success: payment.succeeded,
            transaction_id: input.transaction_id,
            message: if payment.succeeded {
                "Payment completed successfully".to_string()
            } else {
                "Payment failed".to_string()
            },
        })
    }

    /// Shared terminal-state update used by confirmation and webhooks: the
    /// transaction row and the order's payment/fulfillment status move in
    /// one database transaction. Already-processed transactions are left
    /// untouched, which makes webhook delivery idempotent.
    pub async fn record_gateway_result(
        &self,
        transaction_id: &str,
        succeeded: bool,
        gateway_transaction_id: &str,
        raw: serde_json::Value,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let transaction = payment_transaction::Entity::find()
            .filter(payment_transaction::Column::TransactionId.eq(transaction_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Transaction not found".to_string()))?;

        if transaction.status != PaymentTransactionStatus::Pending {
            info!(transaction_id, "transaction already processed, skipping");
            return Ok(());
        }

        let order_id = transaction.order_id;
        let mut active: payment_transaction::ActiveModel = transaction.into();
        active.status = Set(if succeeded {
            PaymentTransactionStatus::Completed
        } else {
            PaymentTransactionStatus::Failed
        });
        active.gateway_transaction_id = Set(Some(gateway_transaction_id.to_string()));
        active.gateway_response = Set(Some(raw));
        active.processed_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        if succeeded {
            let order = order::Entity::find_by_id(order_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;
            let mut order: order::ActiveModel = order.into();
            order.payment_status = Set("paid".to_string());
            order.status = Set(crate::entities::OrderStatus::Processing);
            order.updated_at = Set(Utc::now());
            order.update(&txn).await?;
        }

        txn.commit().await?;

        let event = if succeeded {
            Event::PaymentCompleted {
                order_id,
                transaction_id: transaction_id.to_string(),
            }
        } else {
            Event::PaymentFailed {
                order_id,
                transaction_id: transaction_id.to_string(),
            }
        };
        self.event_sender.send_or_log(event).await;

        Ok(())
    }

    /// Handle a Stripe webhook delivery. The signature is verified when a
    /// webhook secret is configured; processing failures after signature
    /// acceptance are logged, not surfaced, so the gateway does not retry
    /// forever against a poisoned event.
    #[instrument(skip_all)]
    pub async fn handle_stripe_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<(), ServiceError> {
        if let Some(secret) = &self.stripe_webhook_secret {
            let header = signature_header
                .ok_or_else(|| ServiceError::Unauthorized("Missing signature".to_string()))?;
            if !verify_stripe_signature(payload, header, secret, self.webhook_tolerance_secs) {
                return Err(ServiceError::Unauthorized(
                    "Invalid webhook signature".to_string(),
                ));
            }
        }

        let event: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| ServiceError::InvalidInput(format!("Invalid payload: {e}")))?;

        let event_type = event.get("type").and_then(|v| v.as_str()).unwrap_or("");
        let object = event
            .get("data")
            .and_then(|d| d.get("object"))
            .cloned()
            .unwrap_or_default();

        let succeeded = match event_type {
            "payment_intent.succeeded" => true,
            "payment_intent.payment_failed" => false,
            other => {
                info!(event_type = other, "unhandled Stripe webhook event type");
                return Ok(());
            }
        };

        let Some(transaction_id) = object
            .get("metadata")
            .and_then(|m| m.get("transaction_id"))
            .and_then(|v| v.as_str())
        else {
            warn!("Stripe webhook without transaction_id metadata");
            return Ok(());
        };
        let gateway_id = object.get("id").and_then(|v| v.as_str()).unwrap_or("");

        if let Err(e) = self
            .record_gateway_result(transaction_id, succeeded, gateway_id, object.clone())
            .await
        {
            warn!(transaction_id, error = %e, "stripe webhook update failed");
        }
        Ok(())
    }

    /// Handle a PayPal webhook delivery. The local transaction id travels
    /// in `resource.custom_id`.
    #[instrument(skip_all)]
    pub async fn handle_paypal_webhook(&self, payload: &[u8]) -> Result<(), ServiceError> {
        let event: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| ServiceError::InvalidInput(format!("Invalid payload: {e}")))?;

        let event_type = event
            .get("event_type")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let resource = event.get("resource").cloned().unwrap_or_default();

        let succeeded = match event_type {
            "PAYMENT.CAPTURE.COMPLETED" => true,
            "PAYMENT.CAPTURE.DENIED" => false,
            other => {
                info!(event_type = other, "unhandled PayPal webhook event type");
                return Ok(());
            }
        };

        let Some(transaction_id) = resource
            .get("custom_id")
            .and_then(|v| v.as_str())
        else {
            warn!("PayPal webhook without custom_id");
            return Ok(());
        };
        let gateway_id = resource.get("id").and_then(|v| v.as_str()).unwrap_or("");

        if let Err(e) = self
            .record_gateway_result(transaction_id, succeeded, gateway_id, resource.clone())
            .await
        {
            warn!(transaction_id, error = %e, "paypal webhook update failed");
        }
        Ok(())
    }
}

/// Verify a `Stripe-Signature: t=...,v1=...` header: HMAC-SHA256 over
/// `"{t}.{payload}"` with a timestamp tolerance and constant-time compare.
pub fn verify_stripe_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    let mut timestamp = "";
    let mut signature = "";
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value,
            Some(("v1", value)) => signature = value,
            _ => {}
        }
    }
    if timestamp.is_empty() || signature.is_empty() {
        return false;
    }

    if let Ok(ts) = timestamp.parse::<i64>() {
        let now = Utc::now().timestamp();
        if (now - ts).unsigned_abs() > tolerance_secs {
            return false;
        }
    } else {
        return false;
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_verifies() {
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let header = sign(payload, "whsec_test", Utc::now().timestamp());
        assert!(verify_stripe_signature(payload, &header, "whsec_test", 300));
    }

    #[test]
    fn wrong_secret_fails() {
        let payload = b"{}";
        let header = sign(payload, "whsec_test", Utc::now().timestamp());
        assert!(!verify_stripe_signature(payload, &header, "whsec_other", 300));
    }

    #[test]
    fn tampered_payload_fails() {
        let header = sign(b"{}", "whsec_test", Utc::now().timestamp());
        assert!(!verify_stripe_signature(
            b"{\"a\":1}",
            &header,
            "whsec_test",
            300
        ));
    }

    #[test]
    fn stale_timestamp_fails() {
        let payload = b"{}";
        let header = sign(payload, "whsec_test", Utc::now().timestamp() - 3600);
        assert!(!verify_stripe_signature(payload, &header, "whsec_test", 300));
    }

    #[test]
    fn malformed_header_fails() {
        assert!(!verify_stripe_signature(b"{}", "nonsense", "whsec_test", 300));
        assert!(!verify_stripe_signature(b"{}", "t=abc,v1=def", "whsec_test", 300));
    }
}
