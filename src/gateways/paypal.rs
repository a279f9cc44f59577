use super::{GatewayIntent, GatewayPayment, IntentRequest, PaymentGateway};
use crate::errors::ServiceError;
use async_trait::async_trait;
use base64::Engine;
use serde_json::json;
use std::time::Duration;
use tracing::instrument;

/// PayPal checkout-orders client.
///
/// Without configured credentials the gateway degrades to returning a
/// sandbox approval URL without calling out, which is enough for local
/// development against the hosted checkout page.
#[derive(Clone)]
pub struct PayPalGateway {
    client: reqwest::Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    sandbox: bool,
}

impl PayPalGateway {
    pub fn new(client_id: Option<String>, client_secret: Option<String>, sandbox: bool) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client"),
            client_id,
            client_secret,
            sandbox,
        }
    }

    fn api_base(&self) -> &'static str {
        if self.sandbox {
            "https://api-m.sandbox.paypal.com"
        } else {
            "https://api-m.paypal.com"
        }
    }

    fn checkout_base(&self) -> &'static str {
        if self.sandbox {
            "https://www.sandbox.paypal.com"
        } else {
            "https://www.paypal.com"
        }
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(id), Some(secret)) => Some((id, secret)),
            _ => None,
        }
    }

    async fn access_token(&self, id: &str, secret: &str) -> Result<String, ServiceError> {
        let basic = base64::engine::general_purpose::STANDARD.encode(format!("{id}:{secret}"));
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.api_base()))
            .header("Authorization", format!("Basic {basic}"))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("PayPal error: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "PayPal token request failed ({})",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("PayPal error: {e}")))?;
        body.get("access_token")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::ExternalServiceError("PayPal token missing in response".to_string())
            })
    }
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    #[instrument(skip(self), fields(order_id = request.order_id))]
    async fn create_intent(&self, request: &IntentRequest) -> Result<GatewayIntent, ServiceError> {
        let Some((id, secret)) = self.credentials() else {
            // Credentials absent: hand back a sandbox checkout URL keyed by
            // our transaction id so the flow stays navigable in development.
            let approval_url = format!(
                "{}/checkoutnow?token={}",
                self.checkout_base(),
                request.transaction_id
            );
            return Ok(GatewayIntent {
                gateway_transaction_id: None,
                client_secret: None,
                approval_url: Some(approval_url),
                raw: json!({ "mode": "unconfigured" }),
            });
        };

        let token = self.access_token(id, secret).await?;
        let payload = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "custom_id": request.transaction_id,
                "amount": {
                    "currency_code": request.currency,
                    "value": request.amount.to_string(),
                }
            }]
        });

        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.api_base()))
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("PayPal error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::PaymentFailed(format!(
                "PayPal rejected the order ({status}): {body}"
            )));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("PayPal error: {e}")))?;

        let approval_url = raw
            .get("links")
            .and_then(|links| links.as_array())
            .and_then(|links| {
                links.iter().find(|l| {
                    l.get("rel").and_then(|r| r.as_str()) == Some("approve")
                })
            })
            .and_then(|l| l.get("href"))
            .and_then(|h| h.as_str())
            .map(str::to_string);

        Ok(GatewayIntent {
            gateway_transaction_id: raw
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            client_secret: None,
            approval_url,
            raw,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_payment(
        &self,
        gateway_transaction_id: &str,
    ) -> Result<GatewayPayment, ServiceError> {
        let Some((id, secret)) = self.credentials() else {
            return Err(ServiceError::ExternalServiceError(
                "PayPal credentials not configured".to_string(),
            ));
        };

        let token = self.access_token(id, secret).await?;
        let response = self
            .client
            .get(format!(
                "{}/v2/checkout/orders/{gateway_transaction_id}",
                self.api_base()
            ))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("PayPal error: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::PaymentFailed(format!(
                "PayPal order lookup failed ({})",
                response.status()
            )));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("PayPal error: {e}")))?;

        let succeeded = raw.get("status").and_then(|v| v.as_str()) == Some("COMPLETED");
        Ok(GatewayPayment {
            succeeded,
            gateway_transaction_id: gateway_transaction_id.to_string(),
            raw,
        })
    }
}
