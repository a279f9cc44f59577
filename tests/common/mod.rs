#![allow(dead_code)]

use chrono::{Duration, Utc};
use matchable_api::{
    config::AppConfig,
    db,
    entities::{
        coupon, order, product, product_variant, session, session_type, trainer, CouponType,
        OrderStatus, SessionStatus,
    },
    events::{self, EventSender},
    handlers::AppServices,
    services::EmailService,
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Test harness: fresh SQLite database with migrations applied, the full
/// services graph and a running event loop (email delivery disabled).
pub struct TestApp {
    pub state: AppState,
    _db_dir: tempfile::TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("matchable_test.db");
        let database_url = format!("sqlite://{}?mode=rwc", db_path.display());

        let mut cfg = AppConfig::new(database_url, "test".to_string());
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("connect to test database");
        db::run_migrations(&pool).await.expect("run migrations");
        let db = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let emails = Arc::new(EmailService::from_config(&cfg));
        let event_task = tokio::spawn(events::process_events(event_rx, db.clone(), emails));

        let services = AppServices::new(db.clone(), Arc::new(event_sender.clone()), &cfg);

        let state = AppState {
            db,
            config: cfg,
            event_sender,
            services,
        };

        Self {
            state,
            _db_dir: dir,
            _event_task: event_task,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }
}

pub async fn seed_trainer(app: &TestApp, name: &str) -> trainer::Model {
    trainer::ActiveModel {
        name: Set(name.to_string()),
        email: Set(format!("{}@matchable.test", name.to_lowercase().replace(' ', "."))),
        bio: Set(None),
        specializations: Set(serde_json::json!(["padel", "fitness"])),
        hourly_rate: Set(Decimal::new(6000, 2)),
        image_url: Set(None),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(app.db())
    .await
    .expect("seed trainer")
}

pub async fn seed_session_type(app: &TestApp, name: &str) -> session_type::Model {
    session_type::ActiveModel {
        name: Set(name.to_string()),
        description: Set(Some(format!("{name} training"))),
        base_price: Set(Decimal::new(5000, 2)),
        duration_options: Set(serde_json::json!([30, 60, 90])),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(app.db())
    .await
    .expect("seed session type")
}

pub async fn seed_session(
    app: &TestApp,
    session_type_id: i32,
    trainer_id: i32,
    price: Decimal,
    max_participants: i32,
) -> session::Model {
    let date = (Utc::now() + Duration::days(7)).date_naive();
    session::ActiveModel {
        session_type_id: Set(session_type_id),
        trainer_id: Set(trainer_id),
        date: Set(date),
        start_time: Set(chrono::NaiveTime::from_hms_opt(10, 0, 0).unwrap()),
        end_time: Set(chrono::NaiveTime::from_hms_opt(11, 0, 0).unwrap()),
        duration_minutes: Set(60),
        price: Set(price),
        status: Set(SessionStatus::Available),
        max_participants: Set(max_participants),
        current_participants: Set(0),
        notes: Set(None),
        ..Default::default()
    }
    .insert(app.db())
    .await
    .expect("seed session")
}

pub async fn seed_product(
    app: &TestApp,
    name: &str,
    price: Decimal,
    inventory_quantity: i32,
    track_inventory: bool,
) -> product::Model {
    let slug = name.to_lowercase().replace(' ', "-");
    product::ActiveModel {
        category_id: Set(None),
        sku: Set(format!("SKU-{}", slug.to_uppercase())),
        name: Set(name.to_string()),
        slug: Set(slug),
        short_description: Set(None),
        description: Set(None),
        price: Set(price),
        compare_price: Set(None),
        inventory_quantity: Set(inventory_quantity),
        track_inventory: Set(track_inventory),
        low_stock_threshold: Set(5),
        weight: Set(None),
        is_active: Set(true),
        is_featured: Set(false),
        tags: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(app.db())
    .await
    .expect("seed product")
}

pub async fn seed_variant(
    app: &TestApp,
    product_id: i32,
    name: &str,
    price: Option<Decimal>,
    inventory_quantity: i32,
) -> product_variant::Model {
    product_variant::ActiveModel {
        product_id: Set(product_id),
        sku: Set(format!("VAR-{}-{}", product_id, name.to_uppercase())),
        name: Set(name.to_string()),
        price: Set(price),
        compare_price: Set(None),
        inventory_quantity: Set(inventory_quantity),
        attributes: Set(None),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(app.db())
    .await
    .expect("seed variant")
}

pub async fn seed_coupon(
    app: &TestApp,
    code: &str,
    coupon_type: CouponType,
    value: Decimal,
) -> coupon::Model {
    coupon::ActiveModel {
        code: Set(code.to_string()),
        coupon_type: Set(coupon_type),
        value: Set(value),
        minimum_amount: Set(Decimal::ZERO),
        usage_limit: Set(None),
        usage_count: Set(0),
        starts_at: Set(None),
        expires_at: Set(None),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(app.db())
    .await
    .expect("seed coupon")
}

/// Insert a pending order directly, for payment tests that don't need the
/// full checkout flow.
pub async fn seed_order(app: &TestApp, total: Decimal) -> order::Model {
    let address = serde_json::json!({
        "first_name": "Jamie",
        "last_name": "Doe",
        "address_line_1": "1 Main St",
        "city": "Springfield",
        "state": "IL",
        "postal_code": "62704",
        "country": "US",
    });
    order::ActiveModel {
        order_number: Set(format!("ORD-TEST-{}", uuid::Uuid::new_v4().simple())),
        guest_email: Set("jamie@example.com".to_string()),
        status: Set(OrderStatus::Pending),
        payment_status: Set("pending".to_string()),
        fulfillment_status: Set("unfulfilled".to_string()),
        currency: Set("USD".to_string()),
        subtotal: Set(total),
        tax_amount: Set(Decimal::ZERO),
        shipping_amount: Set(Decimal::ZERO),
        discount_amount: Set(Decimal::ZERO),
        total_amount: Set(total),
        billing_address: Set(address.clone()),
        shipping_address: Set(address),
        shipping_method: Set(Some("standard".to_string())),
        tracking_number: Set(None),
        notes: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(app.db())
    .await
    .expect("seed order")
}

/// A valid checkout address payload.
pub fn test_address() -> matchable_api::services::orders::Address {
    matchable_api::services::orders::Address {
        first_name: "Jamie".to_string(),
        last_name: "Doe".to_string(),
        company: None,
        address_line_1: "1 Main St".to_string(),
        address_line_2: None,
        city: "Springfield".to_string(),
        state: "IL".to_string(),
        postal_code: "62704".to_string(),
        country: "US".to_string(),
    }
}
