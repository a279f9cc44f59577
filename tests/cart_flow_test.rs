mod common;

use chrono::{Duration, Utc};
use common::{seed_coupon, seed_product, seed_variant, TestApp};
use matchable_api::{
    entities::{cart_session, coupon, CouponType},
    errors::ServiceError,
};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};

#[tokio::test]
async fn add_update_remove_items_recomputes_totals() {
    let app = TestApp::new().await;
    let carts = &app.state.services.carts;
    let p = seed_product(&app, "Grip Tape", dec!(12.50), 20, true).await;

    let session = carts.create_session().await.unwrap();
    let view = carts.add_item(session.id, p.id, 2, None).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.totals.subtotal, dec!(25.00));
    assert_eq!(view.totals.shipping_amount, dec!(10.00)); // below $75

    // Same product again merges into the existing line
    let view = carts.add_item(session.id, p.id, 1, None).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 3);
    assert_eq!(view.totals.subtotal, dec!(37.50));

    let item_id = view.items[0].id;
    let view = carts.update_item(session.id, item_id, 6).await.unwrap();
    assert_eq!(view.totals.subtotal, dec!(75.00));
    assert_eq!(view.totals.shipping_amount, dec!(0.00)); // threshold reached

    let view = carts.remove_item(session.id, item_id).await.unwrap();
    assert!(view.items.is_empty());
    assert_eq!(view.totals.total, dec!(0.00));
}

#[tokio::test]
async fn variant_lines_use_variant_price_and_stock() {
    let app = TestApp::new().await;
    let carts = &app.state.services.carts;
    let p = seed_product(&app, "Club Shirt", dec!(30.00), 0, true).await;
    let v = seed_variant(&app, p.id, "Large", Some(dec!(32.00)), 5).await;

    let session = carts.create_session().await.unwrap();
    let view = carts
        .add_item(session.id, p.id, 2, Some(v.id))
        .await
        .unwrap();
    assert_eq!(view.items[0].price, dec!(32.00));
    assert_eq!(view.items[0].variant_name.as_deref(), Some("Large"));
    assert_eq!(view.totals.subtotal, dec!(64.00));

    // Variant stock is the limit, not the parent product's zero
    let err = carts
        .add_item(session.id, p.id, 4, Some(v.id))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(_)));
}

#[tokio::test]
async fn insufficient_inventory_rejects_add() {
    let app = TestApp::new().await;
    let carts = &app.state.services.carts;
    let p = seed_product(&app, "Grip Tape", dec!(12.50), 2, true).await;

    let session = carts.create_session().await.unwrap();
    let err = carts.add_item(session.id, p.id, 3, None).await.unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(_)));
}

#[tokio::test]
async fn applied_coupon_is_persisted() {
    let app = TestApp::new().await;
    let carts = &app.state.services.carts;
    let p = seed_product(&app, "Padel Racket", dec!(100.00), 10, true).await;
    seed_coupon(&app, "SAVE10", CouponType::Percentage, dec!(10)).await;

    let session = carts.create_session().await.unwrap();
    carts.add_item(session.id, p.id, 1, None).await.unwrap();

    let view = carts.apply_coupon(session.id, "SAVE10").await.unwrap();
    assert_eq!(view.totals.discount_amount, dec!(10.00));
    assert_eq!(view.totals.tax_amount, dec!(7.65));

    // Re-reading the cart sees the same coupon: the application lives in
    // the database, not in process memory
    let reloaded = carts.get_cart(session.id).await.unwrap();
    let applied = reloaded.totals.coupon.expect("coupon persisted");
    assert_eq!(applied.code, "SAVE10");

    let view = carts.remove_coupon(session.id).await.unwrap();
    assert!(view.totals.coupon.is_none());
    assert_eq!(view.totals.discount_amount, dec!(0.00));
}

#[tokio::test]
async fn invalid_and_exhausted_coupons_are_rejected() {
    let app = TestApp::new().await;
    let carts = &app.state.services.carts;
    let p = seed_product(&app, "Padel Racket", dec!(100.00), 10, true).await;
    let session = carts.create_session().await.unwrap();
    carts.add_item(session.id, p.id, 1, None).await.unwrap();

    let err = carts.apply_coupon(session.id, "NOPE").await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));

    // Exhausted usage limit
    let c = seed_coupon(&app, "ONCE", CouponType::Percentage, dec!(5)).await;
    let mut used_up: coupon::ActiveModel = c.into();
    used_up.usage_limit = Set(Some(1));
    used_up.usage_count = Set(1);
    used_up.update(app.db()).await.unwrap();

    let err = carts.apply_coupon(session.id, "ONCE").await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));

    // Expired window
    let expired = seed_coupon(&app, "LATE", CouponType::Percentage, dec!(5)).await;
    let mut expired: coupon::ActiveModel = expired.into();
    expired.expires_at = Set(Some(Utc::now() - Duration::days(1)));
    expired.update(app.db()).await.unwrap();

    let err = carts.apply_coupon(session.id, "LATE").await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn minimum_amount_gates_coupon() {
    let app = TestApp::new().await;
    let carts = &app.state.services.carts;
    let p = seed_product(&app, "Grip Tape", dec!(10.00), 10, true).await;
    let c = seed_coupon(&app, "BIG50", CouponType::FixedAmount, dec!(50.00)).await;
    let mut with_min: coupon::ActiveModel = c.into();
    with_min.minimum_amount = Set(dec!(100.00));
    with_min.update(app.db()).await.unwrap();

    let session = carts.create_session().await.unwrap();
    carts.add_item(session.id, p.id, 2, None).await.unwrap();

    let err = carts.apply_coupon(session.id, "BIG50").await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn expired_cart_session_reads_as_empty() {
    let app = TestApp::new().await;
    let carts = &app.state.services.carts;

    let session = carts.create_session().await.unwrap();
    let mut stale: cart_session::ActiveModel = session.clone().into();
    stale.expires_at = Set(Utc::now() - Duration::days(1));
    stale.update(app.db()).await.unwrap();

    let view = carts.get_cart(session.id).await.unwrap();
    assert!(view.cart.is_none());
    assert!(view.items.is_empty());
    assert_eq!(view.totals.total, dec!(0.00));

    // Mutations against the expired session are rejected
    let p = seed_product(&app, "Grip Tape", dec!(10.00), 10, true).await;
    let err = carts.add_item(session.id, p.id, 1, None).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn unknown_session_reads_as_empty_cart() {
    let app = TestApp::new().await;
    let view = app
        .state
        .services
        .carts
        .get_cart(uuid::Uuid::new_v4())
        .await
        .unwrap();
    assert!(view.cart.is_none());
    assert!(view.items.is_empty());
}
