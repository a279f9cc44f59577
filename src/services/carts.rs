use crate::{
    config::AppConfig,
    entities::{
        cart_coupon, cart_item, cart_session, coupon, product, product_image, product_variant,
        CouponType,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::InventoryService,
};
use chrono::{Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Pricing knobs for cart totals. Values come from configuration; the
/// defaults match the storefront's published policy (8.5% tax, free
/// shipping at $75, otherwise a flat $10).
#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub tax_rate: Decimal,
    pub free_shipping_threshold: Decimal,
    pub flat_shipping_rate: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        use rust_decimal_macros::dec;
        Self {
            tax_rate: dec!(0.085),
            free_shipping_threshold: dec!(75.00),
            flat_shipping_rate: dec!(10.00),
        }
    }
}

impl PricingConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            tax_rate: cfg.tax_rate_decimal(),
            free_shipping_threshold: cfg.free_shipping_threshold_decimal(),
            flat_shipping_rate: cfg.flat_shipping_rate_decimal(),
        }
    }
}

/// Computed cart totals. `total = subtotal + tax + shipping - discount`,
/// every component rounded to 2 decimal places.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub shipping_amount: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
    pub coupon: Option<AppliedCoupon>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppliedCoupon {
    pub code: String,
    #[serde(rename = "type")]
    pub coupon_type: CouponType,
    pub value: Decimal,
}

impl CartTotals {
    pub fn empty() -> Self {
        Self {
            subtotal: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            shipping_amount: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            total: Decimal::ZERO,
            coupon: None,
        }
    }
}

/// One priced cart line, the only input the totals computation needs.
#[derive(Debug, Clone, Copy)]
pub struct PricedLine {
    pub price: Decimal,
    pub quantity: i32,
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Pure totals computation over cart lines and an optionally applied coupon.
///
/// - discount: percentage -> subtotal * pct; fixed_amount -> capped at the
///   subtotal; free_shipping -> 0 (it acts on shipping instead)
/// - tax applies to the discounted amount
/// - shipping is waived at the free-shipping threshold or by a
///   free_shipping coupon
pub fn compute_totals(
    lines: &[PricedLine],
    coupon: Option<&coupon::Model>,
    pricing: &PricingConfig,
) -> CartTotals {
    let subtotal: Decimal = lines
        .iter()
        .map(|line| line.price * Decimal::from(line.quantity))
        .sum();

    let discount_amount = match coupon {
        Some(c) => match c.coupon_type {
            CouponType::Percentage => subtotal * c.value / Decimal::ONE_HUNDRED,
            CouponType::FixedAmount => c.value.min(subtotal),
            CouponType::FreeShipping => Decimal::ZERO,
        },
        None => Decimal::ZERO,
    };

    let taxable = subtotal - discount_amount;
    let tax_amount = taxable * pricing.tax_rate;

    let mut shipping_amount = if subtotal >= pricing.free_shipping_threshold {
        Decimal::ZERO
    } else if subtotal > Decimal::ZERO {
        pricing.flat_shipping_rate
    } else {
        Decimal::ZERO
    };
    if coupon.is_some_and(|c| c.coupon_type == CouponType::FreeShipping) {
        shipping_amount = Decimal::ZERO;
    }

    let subtotal = round_money(subtotal);
    let tax_amount = round_money(tax_amount);
    let shipping_amount = round_money(shipping_amount);
    let discount_amount = round_money(discount_amount);
    let total = round_money(subtotal + tax_amount + shipping_amount - discount_amount);

    CartTotals {
        subtotal,
        tax_amount,
        shipping_amount,
        discount_amount,
        total,
        coupon: coupon.map(|c| AppliedCoupon {
            code: c.code.clone(),
            coupon_type: c.coupon_type,
            value: c.value,
        }),
    }
}

/// Cart line enriched with catalog data for API responses and checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CartLineView {
    pub id: i32,
    pub product_id: i32,
    pub product_variant_id: Option<i32>,
    pub product_name: String,
    pub product_slug: String,
    pub product_sku: String,
    pub product_image: Option<String>,
    pub variant_name: Option<String>,
    pub variant_sku: Option<String>,
    pub quantity: i32,
    pub price: Decimal,
    pub total: Decimal,
    pub in_stock: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartSessionInfo {
    pub id: Uuid,
    pub expires_at: chrono::DateTime<Utc>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

/// Full cart view returned by every cart mutation.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub cart: Option<CartSessionInfo>,
    pub items: Vec<CartLineView>,
    pub totals: CartTotals,
}

impl CartView {
    fn empty() -> Self {
        Self {
            cart: None,
            items: Vec::new(),
            totals: CartTotals::empty(),
        }
    }
}

/// Shopping cart service: anonymous cart sessions, line items and coupon
/// application. Coupon state is a `cart_coupons` row, so it survives
/// restarts and scales horizontally.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    inventory: InventoryService,
    pricing: PricingConfig,
    expiry_days: i64,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        inventory: InventoryService,
        pricing: PricingConfig,
        expiry_days: i64,
    ) -> Self {
        Self {
            db,
            event_sender,
            inventory,
            pricing,
            expiry_days,
        }
    }

    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    /// Create a fresh cart session with the configured expiry.
    #[instrument(skip(self))]
    pub async fn create_session(&self) -> Result<cart_session::Model, ServiceError> {
        let now = Utc::now();
        let session = cart_session::ActiveModel {
            id: Set(Uuid::new_v4()),
            expires_at: Set(now + Duration::days(self.expiry_days)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::CartCreated(session.id))
            .await;

        info!(cart_session_id = %session.id, "cart session created");
        Ok(session)
    }

    /// Load the cart for a session id. Missing or expired sessions read as
    /// an empty cart rather than an error.
    pub async fn get_cart(&self, session_id: Uuid) -> Result<CartView, ServiceError> {
        self.cart_view(&*self.db, session_id).await
    }

    /// Add an item, merging with an existing line for the same
    /// product/variant. Inventory is checked for the merged quantity.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        session_id: Uuid,
        product_id: i32,
        quantity: i32,
        variant_id: Option<i32>,
    ) -> Result<CartView, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        self.valid_session(&txn, session_id).await?;

        let price = self
            .unit_price(&txn, product_id, variant_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound("Product not found or not available".to_string())
            })?;

        let mut existing = cart_item::Entity::find()
            .filter(cart_item::Column::CartSessionId.eq(session_id))
            .filter(cart_item::Column::ProductId.eq(product_id));
        existing = match variant_id {
            Some(variant_id) => {
                existing.filter(cart_item::Column::ProductVariantId.eq(variant_id))
            }
            None => existing.filter(cart_item::Column::ProductVariantId.is_null()),
        };
        let existing = existing.one(&txn).await?;

        let requested = existing.as_ref().map_or(quantity, |i| i.quantity + quantity);
        if !self
            .inventory
            .check_availability(&txn, product_id, variant_id, requested)
            .await?
        {
            return Err(ServiceError::InsufficientStock(
                "Insufficient inventory for requested quantity".to_string(),
            ));
        }

        match existing {
            Some(item) => {
                let mut item: cart_item::ActiveModel = item.into();
                item.quantity = Set(requested);
                item.price = Set(price);
                item.updated_at = Set(Utc::now());
                item.update(&txn).await?;
            }
            None => {
                cart_item::ActiveModel {
                    cart_session_id: Set(session_id),
                    product_id: Set(product_id),
                    product_variant_id: Set(variant_id),
                    quantity: Set(quantity),
                    price: Set(price),
                    created_at: Set(Utc::now()),
                    updated_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(&txn)
                .await?;
            }
        }

        self.touch_session(&txn, session_id).await?;
        let view = self.cart_view(&txn, session_id).await?;
        txn.commit().await?;
        Ok(view)
    }

    /// Set the quantity of an existing cart line.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        session_id: Uuid,
        item_id: i32,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let item = cart_item::Entity::find()
            .filter(cart_item::Column::Id.eq(item_id))
            .filter(cart_item::Column::CartSessionId.eq(session_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart item not found".to_string()))?;

        if !self
            .inventory
            .check_availability(&txn, item.product_id, item.product_variant_id, quantity)
            .await?
        {
            return Err(ServiceError::InsufficientStock(
                "Insufficient inventory".to_string(),
            ));
        }

        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(quantity);
        item.updated_at = Set(Utc::now());
        item.update(&txn).await?;

        self.touch_session(&txn, session_id).await?;
        let view = self.cart_view(&txn, session_id).await?;
        txn.commit().await?;
        Ok(view)
    }

    /// Remove a single line from the cart.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        session_id: Uuid,
        item_id: i32,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        cart_item::Entity::delete_many()
            .filter(cart_item::Column::Id.eq(item_id))
            .filter(cart_item::Column::CartSessionId.eq(session_id))
            .exec(&txn)
            .await?;

        self.touch_session(&txn, session_id).await?;
        let view = self.cart_view(&txn, session_id).await?;
        txn.commit().await?;
        Ok(view)
    }

    /// Delete every line in the cart. The session itself stays alive.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, session_id: Uuid) -> Result<(), ServiceError> {
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartSessionId.eq(session_id))
            .exec(&*self.db)
            .await?;
        info!(cart_session_id = %session_id, "cart cleared");
        Ok(())
    }

    /// Validate and persist a coupon application for this cart.
    #[instrument(skip(self))]
    pub async fn apply_coupon(
        &self,
        session_id: Uuid,
        code: &str,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        self.valid_session(&txn, session_id).await?;

        let now = Utc::now();
        let coupon = coupon::Entity::find()
            .filter(coupon::Column::Code.eq(code))
            .filter(coupon::Column::IsActive.eq(true))
            .one(&txn)
            .await?
            .filter(|c| c.starts_at.map_or(true, |t| t <= now))
            .filter(|c| c.expires_at.map_or(true, |t| t >= now))
            .ok_or_else(|| {
                ServiceError::InvalidOperation("Invalid or expired coupon code".to_string())
            })?;

        if let Some(limit) = coupon.usage_limit {
            if coupon.usage_count >= limit {
                return Err(ServiceError::InvalidOperation(
                    "Coupon usage limit exceeded".to_string(),
                ));
            }
        }

        let (lines, _) = self.priced_lines(&txn, session_id).await?;
        let subtotal: Decimal = lines
            .iter()
            .map(|l| l.price * Decimal::from(l.quantity))
            .sum();
        if coupon.minimum_amount > Decimal::ZERO && subtotal < coupon.minimum_amount {
            return Err(ServiceError::InvalidOperation(format!(
                "Minimum order amount of ${} required",
                coupon.minimum_amount
            )));
        }

        // One coupon per cart: replace any previous application
        cart_coupon::Entity::delete_many()
            .filter(cart_coupon::Column::CartSessionId.eq(session_id))
            .exec(&txn)
            .await?;
        cart_coupon::ActiveModel {
            cart_session_id: Set(session_id),
            coupon_id: Set(coupon.id),
            applied_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let view = self.cart_view(&txn, session_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CouponApplied {
                cart_session_id: session_id,
                code: coupon.code.clone(),
            })
            .await;

        Ok(view)
    }

    /// Drop the coupon applied to this cart, if any.
    #[instrument(skip(self))]
    pub async fn remove_coupon(&self, session_id: Uuid) -> Result<CartView, ServiceError> {
        cart_coupon::Entity::delete_many()
            .filter(cart_coupon::Column::CartSessionId.eq(session_id))
            .exec(&*self.db)
            .await?;
        self.get_cart(session_id).await
    }

    /// Delete the cart's coupon row on the caller's connection. Used by
    /// checkout after usage has been recorded.
    pub async fn remove_coupon_row<C: ConnectionTrait>(
        &self,
        conn: &C,
        session_id: Uuid,
    ) -> Result<(), ServiceError> {
        cart_coupon::Entity::delete_many()
            .filter(cart_coupon::Column::CartSessionId.eq(session_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Delete every cart line on the caller's connection. Used by checkout
    /// inside the order transaction.
    pub async fn clear_items<C: ConnectionTrait>(
        &self,
        conn: &C,
        session_id: Uuid,
    ) -> Result<(), ServiceError> {
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartSessionId.eq(session_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// The coupon currently applied to a cart, if one is persisted.
    pub async fn applied_coupon<C: ConnectionTrait>(
        &self,
        conn: &C,
        session_id: Uuid,
    ) -> Result<Option<coupon::Model>, ServiceError> {
        let Some(applied) = cart_coupon::Entity::find()
            .filter(cart_coupon::Column::CartSessionId.eq(session_id))
            .one(conn)
            .await?
        else {
            return Ok(None);
        };
        Ok(coupon::Entity::find_by_id(applied.coupon_id).one(conn).await?)
    }

    /// Checkout view of the cart on the caller's connection: enriched
    /// lines, totals and the applied coupon. Used by order creation inside
    /// its own transaction.
    pub async fn checkout_lines<C: ConnectionTrait>(
        &self,
        conn: &C,
        session_id: Uuid,
    ) -> Result<(Vec<CartLineView>, CartTotals, Option<coupon::Model>), ServiceError> {
        // An expired or unknown session checks out as an empty cart
        let live = cart_session::Entity::find_by_id(session_id)
            .filter(cart_session::Column::ExpiresAt.gt(Utc::now()))
            .one(conn)
            .await?;
        if live.is_none() {
            return Ok((Vec::new(), CartTotals::empty(), None));
        }

        let (views, _) = self.priced_lines(conn, session_id).await?;
        let coupon = self.applied_coupon(conn, session_id).await?;
        let lines: Vec<PricedLine> = views
            .iter()
            .map(|v| PricedLine {
                price: v.price,
                quantity: v.quantity,
            })
            .collect();
        let totals = compute_totals(&lines, coupon.as_ref(), &self.pricing);
        Ok((views, totals, coupon))
    }

    async fn valid_session<C: ConnectionTrait>(
        &self,
        conn: &C,
        session_id: Uuid,
    ) -> Result<cart_session::Model, ServiceError> {
        cart_session::Entity::find_by_id(session_id)
            .filter(cart_session::Column::ExpiresAt.gt(Utc::now()))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart session not found".to_string()))
    }

    async fn touch_session<C: ConnectionTrait>(
        &self,
        conn: &C,
        session_id: Uuid,
    ) -> Result<(), ServiceError> {
        if let Some(session) = cart_session::Entity::find_by_id(session_id).one(conn).await? {
            let mut session: cart_session::ActiveModel = session.into();
            session.updated_at = Set(Utc::now());
            session.update(conn).await?;
        }
        Ok(())
    }

    async fn unit_price<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: i32,
        variant_id: Option<i32>,
    ) -> Result<Option<Decimal>, ServiceError> {
        let Some(product) = product::Entity::find()
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::IsActive.eq(true))
            .one(conn)
            .await?
        else {
            return Ok(None);
        };

        match variant_id {
            Some(variant_id) => {
                let variant = product_variant::Entity::find()
                    .filter(product_variant::Column::Id.eq(variant_id))
                    .filter(product_variant::Column::ProductId.eq(product_id))
                    .filter(product_variant::Column::IsActive.eq(true))
                    .one(conn)
                    .await?;
                Ok(variant.map(|v| v.price.unwrap_or(product.price)))
            }
            None => Ok(Some(product.price)),
        }
    }

    /// Load cart lines joined with their catalog rows.
    async fn priced_lines<C: ConnectionTrait>(
        &self,
        conn: &C,
        session_id: Uuid,
    ) -> Result<(Vec<CartLineView>, Vec<cart_item::Model>), ServiceError> {
        let items = cart_item::Entity::find()
            .filter(cart_item::Column::CartSessionId.eq(session_id))
            .order_by_desc(cart_item::Column::CreatedAt)
            .all(conn)
            .await?;

        if items.is_empty() {
            return Ok((Vec::new(), items));
        }

        let product_ids: Vec<i32> = items.iter().map(|i| i.product_id).collect();
        let variant_ids: Vec<i32> = items.iter().filter_map(|i| i.product_variant_id).collect();

        let products: HashMap<i32, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids.clone()))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let variants: HashMap<i32, product_variant::Model> = if variant_ids.is_empty() {
            HashMap::new()
        } else {
            product_variant::Entity::find()
                .filter(product_variant::Column::Id.is_in(variant_ids))
                .all(conn)
                .await?
                .into_iter()
                .map(|v| (v.id, v))
                .collect()
        };

        let images: HashMap<i32, String> = product_image::Entity::find()
            .filter(product_image::Column::ProductId.is_in(product_ids))
            .filter(product_image::Column::IsPrimary.eq(true))
            .all(conn)
            .await?
            .into_iter()
            .map(|img| (img.product_id, img.image_url))
            .collect();

        let mut views = Vec::with_capacity(items.len());
        for item in &items {
            let Some(product) = products.get(&item.product_id) else {
                continue;
            };
            let variant = item.product_variant_id.and_then(|id| variants.get(&id));

            let in_stock = if !product.track_inventory {
                true
            } else {
                let available = variant
                    .map(|v| v.inventory_quantity)
                    .unwrap_or(product.inventory_quantity);
                available >= item.quantity
            };

            views.push(CartLineView {
                id: item.id,
                product_id: item.product_id,
                product_variant_id: item.product_variant_id,
                product_name: product.name.clone(),
                product_slug: product.slug.clone(),
                product_sku: product.sku.clone(),
                product_image: images.get(&item.product_id).cloned(),
                variant_name: variant.map(|v| v.name.clone()),
                variant_sku: variant.map(|v| v.sku.clone()),
                quantity: item.quantity,
                price: item.price,
                total: round_money(item.price * Decimal::from(item.quantity)),
                in_stock,
            });
        }

        Ok((views, items))
    }

    async fn cart_view<C: ConnectionTrait>(
        &self,
        conn: &C,
        session_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let Some(session) = cart_session::Entity::find_by_id(session_id)
            .filter(cart_session::Column::ExpiresAt.gt(Utc::now()))
            .one(conn)
            .await?
        else {
            return Ok(CartView::empty());
        };

        let (views, _) = self.priced_lines(conn, session_id).await?;
        let coupon = self.applied_coupon(conn, session_id).await?;
        let lines: Vec<PricedLine> = views
            .iter()
            .map(|v| PricedLine {
                price: v.price,
                quantity: v.quantity,
            })
            .collect();
        let totals = compute_totals(&lines, coupon.as_ref(), &self.pricing);

        Ok(CartView {
            cart: Some(CartSessionInfo {
                id: session.id,
                expires_at: session.expires_at,
                created_at: session.created_at,
                updated_at: session.updated_at,
            }),
            items: views,
            totals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn coupon_model(coupon_type: CouponType, value: Decimal) -> coupon::Model {
        coupon::Model {
            id: 1,
            code: "TEST".to_string(),
            coupon_type,
            value,
            minimum_amount: Decimal::ZERO,
            usage_limit: None,
            usage_count: 0,
            starts_at: None,
            expires_at: None,
            is_active: true,
        }
    }

    fn line(price: Decimal, quantity: i32) -> PricedLine {
        PricedLine { price, quantity }
    }

    #[test]
    fn totals_without_coupon() {
        let pricing = PricingConfig::default();
        let totals = compute_totals(&[line(dec!(100.00), 1)], None, &pricing);

        assert_eq!(totals.subtotal, dec!(100.00));
        assert_eq!(totals.discount_amount, dec!(0.00));
        assert_eq!(totals.tax_amount, dec!(8.50));
        assert_eq!(totals.shipping_amount, dec!(0.00)); // over the threshold
        assert_eq!(totals.total, dec!(108.50));
    }

    #[test]
    fn flat_shipping_below_threshold() {
        let pricing = PricingConfig::default();
        let totals = compute_totals(&[line(dec!(40.00), 1)], None, &pricing);

        assert_eq!(totals.subtotal, dec!(40.00));
        assert_eq!(totals.shipping_amount, dec!(10.00));
        assert_eq!(totals.tax_amount, dec!(3.40));
        assert_eq!(totals.total, dec!(53.40));
    }

    #[test]
    fn empty_cart_has_zero_shipping() {
        let totals = compute_totals(&[], None, &PricingConfig::default());
        assert_eq!(totals, CartTotals::empty());
    }

    #[test]
    fn percentage_coupon_discounts_taxable_amount() {
        // SAVE10: 10% off a $100 cart, tax computed on the $90 remainder
        let pricing = PricingConfig::default();
        let coupon = coupon_model(CouponType::Percentage, dec!(10));
        let totals = compute_totals(&[line(dec!(100.00), 1)], Some(&coupon), &pricing);

        assert_eq!(totals.discount_amount, dec!(10.00));
        assert_eq!(totals.tax_amount, dec!(7.65));
        assert_eq!(totals.total, dec!(97.65));
    }

    #[test]
    fn fixed_amount_coupon_never_exceeds_subtotal() {
        let pricing = PricingConfig::default();
        let coupon = coupon_model(CouponType::FixedAmount, dec!(50.00));
        let totals = compute_totals(&[line(dec!(30.00), 1)], Some(&coupon), &pricing);

        assert_eq!(totals.discount_amount, dec!(30.00));
        assert_eq!(totals.tax_amount, dec!(0.00));
        // only shipping remains
        assert_eq!(totals.total, dec!(10.00));
    }

    #[test]
    fn free_shipping_coupon_forces_zero_shipping() {
        let pricing = PricingConfig::default();
        let coupon = coupon_model(CouponType::FreeShipping, Decimal::ZERO);
        let totals = compute_totals(&[line(dec!(20.00), 1)], Some(&coupon), &pricing);

        assert_eq!(totals.shipping_amount, dec!(0.00));
        assert_eq!(totals.discount_amount, dec!(0.00));
        assert_eq!(totals.tax_amount, dec!(1.70));
        assert_eq!(totals.total, dec!(21.70));
    }

    #[test]
    fn totals_are_deterministic() {
        let pricing = PricingConfig::default();
        let lines = [line(dec!(19.99), 3), line(dec!(4.50), 2)];
        let coupon = coupon_model(CouponType::Percentage, dec!(15));

        let first = compute_totals(&lines, Some(&coupon), &pricing);
        let second = compute_totals(&lines, Some(&coupon), &pricing);
        assert_eq!(first, second);
    }

    #[test]
    fn total_identity_holds_after_rounding() {
        let pricing = PricingConfig::default();
        let lines = [line(dec!(33.33), 1), line(dec!(0.01), 7)];
        let coupon = coupon_model(CouponType::Percentage, dec!(7));
        let totals = compute_totals(&lines, Some(&coupon), &pricing);

        assert_eq!(
            totals.total,
            totals.subtotal + totals.tax_amount + totals.shipping_amount
                - totals.discount_amount
        );
    }

    #[test]
    fn multi_quantity_lines_sum_into_subtotal() {
        let pricing = PricingConfig::default();
        let totals = compute_totals(&[line(dec!(25.50), 3)], None, &pricing);
        assert_eq!(totals.subtotal, dec!(76.50));
        assert_eq!(totals.shipping_amount, dec!(0.00));
    }
}
