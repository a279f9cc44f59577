use crate::config::AppConfig;
use crate::entities::{booking, order, order_item};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument};

/// Transactional email delivery over an HTTP API.
///
/// When no API URL is configured the service runs in disabled mode: every
/// send is logged and reported as success. Callers treat delivery as
/// best-effort either way; a failed email never rolls anything back.
#[derive(Clone)]
pub struct EmailService {
    client: reqwest::Client,
    api_url: Option<String>,
    api_key: Option<String>,
    from: String,
    app_url: String,
}

#[derive(Debug, Serialize)]
struct OutboundEmail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl EmailService {
    pub fn from_config(cfg: &AppConfig) -> Self {
        if cfg.email_api_url.is_none() {
            info!("email delivery disabled; outbound mail will only be logged");
        }
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
            api_url: cfg.email_api_url.clone(),
            api_key: cfg.email_api_key.clone(),
            from: cfg.email_from.clone(),
            app_url: cfg.app_url.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_url.is_some()
    }

    #[instrument(skip(self, order, items), fields(order_number = %order.order_number))]
    pub async fn send_order_confirmation(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> anyhow::Result<()> {
        let subject = format!("Order Confirmation #{}", order.order_number);
        let mut body = format!(
            "Thank you for your order!\n\nOrder {}\n\n",
            order.order_number
        );
        for item in items {
            body.push_str(&format!(
                "  {} x{} — {} {}\n",
                item.product_name, item.quantity, item.total, order.currency
            ));
        }
        body.push_str(&format!(
            "\nSubtotal: {}\nTax: {}\nShipping: {}\nDiscount: -{}\nTotal: {} {}\n\nTrack your order at {}/orders/{}\n",
            order.subtotal,
            order.tax_amount,
            order.shipping_amount,
            order.discount_amount,
            order.total_amount,
            order.currency,
            self.app_url,
            order.id,
        ));

        self.deliver(&order.guest_email, &subject, &body).await
    }

    #[instrument(skip(self, order), fields(order_number = %order.order_number))]
    pub async fn send_order_status_update(
        &self,
        order: &order::Model,
        new_status: &str,
    ) -> anyhow::Result<()> {
        let subject = format!("Order Update #{}", order.order_number);
        let mut body = format!(
            "Your order {} is now {}.\n",
            order.order_number, new_status
        );
        if let Some(tracking) = &order.tracking_number {
            body.push_str(&format!("Tracking number: {tracking}\n"));
        }

        self.deliver(&order.guest_email, &subject, &body).await
    }

    #[instrument(skip(self, booking), fields(booking_number = %booking.booking_number))]
    pub async fn send_booking_confirmation(&self, booking: &booking::Model) -> anyhow::Result<()> {
        let subject = format!("Booking Confirmation {}", booking.booking_number);
        let body = format!(
            "Hi {},\n\nYour booking {} is confirmed. Total: {}.\n\nManage your booking at {}/bookings/{}\n",
            booking.client_name,
            booking.booking_number,
            booking.total_amount,
            self.app_url,
            booking.booking_number,
        );

        self.deliver(&booking.client_email, &subject, &body).await
    }

    async fn deliver(&self, to: &str, subject: &str, text: &str) -> anyhow::Result<()> {
        let Some(api_url) = &self.api_url else {
            info!(to, subject, "email delivery disabled, skipping send");
            return Ok(());
        };

        let email = OutboundEmail {
            from: &self.from,
            to,
            subject,
            text,
        };

        let mut request = self.client.post(api_url).json(&email);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            anyhow::bail!("email provider returned {}", response.status());
        }

        info!(to, subject, "email delivered");
        Ok(())
    }
}
