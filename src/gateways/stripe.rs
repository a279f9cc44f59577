use super::{GatewayIntent, GatewayPayment, IntentRequest, PaymentGateway};
use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::instrument;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Stripe payment-intents client.
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    publishable_key: Option<String>,
}

impl StripeGateway {
    pub fn new(secret_key: String, publishable_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client"),
            secret_key,
            publishable_key,
        }
    }

    pub fn publishable_key(&self) -> Option<&str> {
        self.publishable_key.as_deref()
    }
}

/// Stripe amounts are integer minor units.
fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| ServiceError::PaymentFailed("Amount out of range".to_string()))
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self), fields(order_id = request.order_id))]
    async fn create_intent(&self, request: &IntentRequest) -> Result<GatewayIntent, ServiceError> {
        let amount = to_minor_units(request.amount)?;
        let params = [
            ("amount", amount.to_string()),
            ("currency", request.currency.to_lowercase()),
            ("metadata[order_id]", request.order_id.to_string()),
            ("metadata[transaction_id]", request.transaction_id.clone()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        let response = self
            .client
            .post(format!("{STRIPE_API_BASE}/payment_intents"))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("Stripe error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::PaymentFailed(format!(
                "Stripe rejected the payment intent ({status}): {body}"
            )));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("Stripe error: {e}")))?;

        Ok(GatewayIntent {
            gateway_transaction_id: raw
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            client_secret: raw
                .get("client_secret")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            approval_url: None,
            raw,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_payment(
        &self,
        gateway_transaction_id: &str,
    ) -> Result<GatewayPayment, ServiceError> {
        let response = self
            .client
            .get(format!(
                "{STRIPE_API_BASE}/payment_intents/{gateway_transaction_id}"
            ))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("Stripe error: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::PaymentFailed(format!(
                "Stripe payment lookup failed ({})",
                response.status()
            )));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("Stripe error: {e}")))?;

        let succeeded = raw.get("status").and_then(|v| v.as_str()) == Some("succeeded");
        Ok(GatewayPayment {
            succeeded,
            gateway_transaction_id: gateway_transaction_id.to_string(),
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn amounts_convert_to_minor_units() {
        assert_eq!(to_minor_units(dec!(149.99)).unwrap(), 14999);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
        assert_eq!(to_minor_units(dec!(80.00)).unwrap(), 8000);
    }
}
