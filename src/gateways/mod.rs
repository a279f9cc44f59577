//! Payment gateway clients. Each gateway implements [`PaymentGateway`];
//! the payment service is agnostic to which one it talks to.

pub mod paypal;
pub mod stripe;

use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::Decimal;

pub use paypal::PayPalGateway;
pub use stripe::StripeGateway;

/// Parameters for creating a gateway-side payment intent. The locally
/// generated `transaction_id` rides along in gateway metadata so webhooks
/// can be correlated back to the `payment_transactions` row.
#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub order_id: i32,
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
}

/// Gateway-side pending-payment object.
#[derive(Debug, Clone)]
pub struct GatewayIntent {
    pub gateway_transaction_id: Option<String>,
    /// Stripe: secret the frontend uses to complete authorization
    pub client_secret: Option<String>,
    /// PayPal: URL the payer is redirected to
    pub approval_url: Option<String>,
    pub raw: serde_json::Value,
}

/// Final payment state as reported by the gateway.
#[derive(Debug, Clone)]
pub struct GatewayPayment {
    pub succeeded: bool,
    pub gateway_transaction_id: String,
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a pending payment on the gateway.
    async fn create_intent(&self, request: &IntentRequest) -> Result<GatewayIntent, ServiceError>;

    /// Query the gateway for the final status of a payment.
    async fn fetch_payment(
        &self,
        gateway_transaction_id: &str,
    ) -> Result<GatewayPayment, ServiceError>;
}
