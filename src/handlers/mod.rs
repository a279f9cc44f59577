pub mod bookings;
pub mod carts;
pub mod common;
pub mod orders;
pub mod payments;
pub mod products;
pub mod sessions;

use crate::{
    config::AppConfig,
    db::DbPool,
    entities::PaymentMethod,
    events::EventSender,
    gateways::{PayPalGateway, PaymentGateway, StripeGateway},
    services::{
        BookingService, CartService, InventoryService, OrderService, PaymentService,
        PricingConfig, ProductService, SessionService,
    },
};
use std::sync::Arc;
use tracing::info;

/// Services layer handed to the HTTP handlers through `AppState`.
#[derive(Clone)]
pub struct AppServices {
    pub sessions: Arc<SessionService>,
    pub bookings: Arc<BookingService>,
    pub products: Arc<ProductService>,
    pub carts: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub inventory: InventoryService,
}

impl AppServices {
    /// Wire up every service against the shared pool and event channel.
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, cfg: &AppConfig) -> Self {
        let inventory = InventoryService::new(db.clone(), event_sender.clone());
        let pricing = PricingConfig::from_app_config(cfg);

        let carts = Arc::new(CartService::new(
            db.clone(),
            event_sender.clone(),
            inventory.clone(),
            pricing,
            cfg.cart_expiry_days,
        ));

        let orders = Arc::new(OrderService::new(
            db.clone(),
            event_sender.clone(),
            carts.clone(),
            inventory.clone(),
            cfg.currency.clone(),
        ));

        let mut payments = PaymentService::new(
            db.clone(),
            event_sender.clone(),
            cfg.currency.clone(),
            cfg.stripe_webhook_secret.clone(),
            cfg.stripe_publishable_key.clone(),
            cfg.webhook_tolerance_secs,
        );
        if let Some(secret_key) = cfg.stripe_secret_key.clone() {
            let stripe: Arc<dyn PaymentGateway> = Arc::new(StripeGateway::new(
                secret_key,
                cfg.stripe_publishable_key.clone(),
            ));
            payments = payments.with_gateway(PaymentMethod::Stripe, stripe);
        } else {
            info!("Stripe secret key not configured; stripe payments disabled");
        }
        let paypal: Arc<dyn PaymentGateway> = Arc::new(PayPalGateway::new(
            cfg.paypal_client_id.clone(),
            cfg.paypal_client_secret.clone(),
            cfg.paypal_sandbox,
        ));
        payments = payments.with_gateway(PaymentMethod::Paypal, paypal);

        Self {
            sessions: Arc::new(SessionService::new(db.clone())),
            bookings: Arc::new(BookingService::new(db.clone(), event_sender.clone())),
            products: Arc::new(ProductService::new(db.clone())),
            carts,
            orders,
            payments: Arc::new(payments),
            inventory,
        }
    }
}
