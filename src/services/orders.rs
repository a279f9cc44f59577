use crate::{
    entities::{
        coupon, coupon_usage, order, order_item, payment_transaction, MovementType, OrderStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        carts::CartService,
        inventory::{InventoryChange, InventoryService},
    },
};
use chrono::{Datelike, NaiveDate, Utc};
use rand::Rng;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Shipping/billing address as submitted at checkout. Stored verbatim as
/// JSON on the order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Address {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(length(max = 100))]
    pub company: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub address_line_1: String,
    #[validate(length(max = 255))]
    pub address_line_2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 1, max = 100))]
    pub country: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderInput {
    #[validate(email)]
    pub guest_email: String,
    #[validate]
    pub billing_address: Address,
    #[validate]
    pub shipping_address: Address,
    pub shipping_method: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateOrderInput {
    #[validate]
    pub billing_address: Option<Address>,
    #[validate]
    pub shipping_address: Option<Address>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Order with its item snapshots and payment history.
#[derive(Debug, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub transactions: Vec<payment_transaction::Model>,
}

/// Order creation from a cart, lookups, status transitions and
/// cancellation with inventory restoration.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    carts: Arc<CartService>,
    inventory: InventoryService,
    currency: String,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        carts: Arc<CartService>,
        inventory: InventoryService,
        currency: String,
    ) -> Self {
        Self {
            db,
            event_sender,
            carts,
            inventory,
            currency,
        }
    }

    /// Convert a cart into an order.
    ///
    /// One transaction covers the availability re-check, the order and item
    /// inserts, every inventory decrement (with its ledger row), coupon
    /// usage recording and the cart wipe. The confirmation email goes out
    /// through the event loop only after the commit.
    #[instrument(skip(self, input), fields(guest_email = %input.guest_email))]
    pub async fn create_order(
        &self,
        cart_session_id: Uuid,
        input: CreateOrderInput,
    ) -> Result<OrderDetails, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;

        let (lines, totals, applied_coupon) =
            self.carts.checkout_lines(&txn, cart_session_id).await?;
        if lines.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }

        // Defense against staleness between cart view and checkout
        for line in &lines {
            let available = self
                .inventory
                .check_availability(&txn, line.product_id, line.product_variant_id, line.quantity)
                .await?;
            if !available {
                return Err(ServiceError::InsufficientStock(format!(
                    "Insufficient inventory for {}",
                    line.product_name
                )));
            }
        }

        let order = self
            .insert_order_with_unique_number(&txn, &input, &totals)
            .await?;

        for line in &lines {
            order_item::ActiveModel {
                order_id: Set(order.id),
                product_id: Set(line.product_id),
                product_variant_id: Set(line.product_variant_id),
                product_name: Set(line.product_name.clone()),
                product_sku: Set(line
                    .variant_sku
                    .clone()
                    .unwrap_or_else(|| line.product_sku.clone())),
                variant_name: Set(line.variant_name.clone()),
                quantity: Set(line.quantity),
                price: Set(line.price),
                total: Set(line.total),
                ..Default::default()
            }
            .insert(&txn)
            .await?;

            self.inventory
                .apply(
                    &txn,
                    &InventoryChange {
                        product_id: line.product_id,
                        variant_id: line.product_variant_id,
                        quantity_change: -line.quantity,
                        movement_type: MovementType::Sale,
                        reference_id: Some(order.id),
                    },
                )
                .await?;
        }

        if let Some(coupon) = &applied_coupon {
            self.record_coupon_usage(&txn, coupon, order.id, totals.discount_amount)
                .await?;
            self.carts.remove_coupon_row(&txn, cart_session_id).await?;
        }

        self.carts.clear_items(&txn, cart_session_id).await?;

        txn.commit().await?;

        info!(order_id = order.id, order_number = %order.order_number, "order created");
        self.event_sender
            .send_or_log(Event::OrderCreated(order.id))
            .await;

        self.get_order(order.id).await
    }

    /// Order with items and payment transactions.
    pub async fn get_order(&self, order_id: i32) -> Result<OrderDetails, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Id)
            .all(&*self.db)
            .await?;

        let transactions = payment_transaction::Entity::find()
            .filter(payment_transaction::Column::OrderId.eq(order_id))
            .order_by_desc(payment_transaction::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(OrderDetails {
            order,
            items,
            transactions,
        })
    }

    /// Update the mutable fields of an order (addresses, notes).
    #[instrument(skip(self, input))]
    pub async fn update_order(
        &self,
        order_id: i32,
        input: UpdateOrderInput,
    ) -> Result<OrderDetails, ServiceError> {
        input.validate()?;
        if input.billing_address.is_none()
            && input.shipping_address.is_none()
            && input.notes.is_none()
        {
            return Err(ServiceError::InvalidOperation(
                "No valid fields to update".to_string(),
            ));
        }

        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        let mut active: order::ActiveModel = order.into();
        if let Some(billing) = input.billing_address {
            active.billing_address = Set(serde_json::to_value(billing)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?);
        }
        if let Some(shipping) = input.shipping_address {
            active.shipping_address = Set(serde_json::to_value(shipping)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?);
        }
        if let Some(notes) = input.notes {
            active.notes = Set(Some(notes));
        }
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        self.get_order(order_id).await
    }

    /// Transition order status. Shipping also marks fulfillment and stores
    /// the tracking number; the status email is dispatched best-effort from
    /// the event loop.
    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: i32,
        status: OrderStatus,
        tracking_number: Option<String>,
    ) -> Result<OrderDetails, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        let old_status = order.status;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(status);
        if let Some(tracking) = tracking_number {
            active.tracking_number = Set(Some(tracking));
        }
        if status == OrderStatus::Shipped {
            active.fulfillment_status = Set("fulfilled".to_string());
        }
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: format!("{old_status:?}").to_lowercase(),
                new_status: format!("{status:?}").to_lowercase(),
            })
            .await;

        self.get_order(order_id).await
    }

    /// Cancel an order still in `pending`/`processing`: flips the status,
    /// appends the reason to the notes and restores every item's inventory
    /// with `return` ledger rows — all one transaction, so a second cancel
    /// finds nothing to cancel and restores nothing.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: i32,
        reason: Option<String>,
    ) -> Result<OrderDetails, ServiceError> {
        let reason = reason.unwrap_or_else(|| "Customer request".to_string());
        let txn = self.db.begin().await?;

        let order = order::Entity::find_by_id(order_id)
            .filter(
                order::Column::Status
                    .is_in([OrderStatus::Pending, OrderStatus::Processing]),
            )
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound("Order not found or cannot be cancelled".to_string())
            })?;

        let notes = match &order.notes {
            Some(existing) => format!("{existing}\nCancelled: {reason}"),
            None => format!("Cancelled: {reason}"),
        };

        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        active.notes = Set(Some(notes));
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;

        for item in &items {
            self.inventory
                .apply(
                    &txn,
                    &InventoryChange {
                        product_id: item.product_id,
                        variant_id: item.product_variant_id,
                        quantity_change: item.quantity,
                        movement_type: MovementType::Return,
                        reference_id: Some(order_id),
                    },
                )
                .await?;
        }

        txn.commit().await?;

        info!(order_id, "order cancelled");
        self.event_sender
            .send_or_log(Event::OrderCancelled(order_id))
            .await;

        self.get_order(order_id).await
    }

    async fn insert_order_with_unique_number(
        &self,
        txn: &DatabaseTransaction,
        input: &CreateOrderInput,
        totals: &crate::services::carts::CartTotals,
    ) -> Result<order::Model, ServiceError> {
        let now = Utc::now();
        for attempt in 0..ORDER_NUMBER_ATTEMPTS {
            let number = if attempt == 0 {
                short_order_number(now.date_naive())
            } else {
                long_order_number(now.date_naive())
            };

            let candidate = order::ActiveModel {
                order_number: Set(number.clone()),
                guest_email: Set(input.guest_email.clone()),
                status: Set(OrderStatus::Pending),
                payment_status: Set("pending".to_string()),
                fulfillment_status: Set("unfulfilled".to_string()),
                currency: Set(self.currency.clone()),
                subtotal: Set(totals.subtotal),
                tax_amount: Set(totals.tax_amount),
                shipping_amount: Set(totals.shipping_amount),
                discount_amount: Set(totals.discount_amount),
                total_amount: Set(totals.total),
                billing_address: Set(serde_json::to_value(&input.billing_address)
                    .map_err(|e| ServiceError::InternalError(e.to_string()))?),
                shipping_address: Set(serde_json::to_value(&input.shipping_address)
                    .map_err(|e| ServiceError::InternalError(e.to_string()))?),
                shipping_method: Set(Some(
                    input
                        .shipping_method
                        .clone()
                        .unwrap_or_else(|| "standard".to_string()),
                )),
                tracking_number: Set(None),
                notes: Set(input.notes.clone()),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };

            match candidate.insert(txn).await {
                Ok(model) => return Ok(model),
                Err(err) => match err.sql_err() {
                    Some(SqlErr::UniqueConstraintViolation(_)) => {
                        warn!(number, attempt, "order number collision, retrying");
                        continue;
                    }
                    _ => return Err(err.into()),
                },
            }
        }

        Err(ServiceError::Conflict(
            "Could not allocate a unique order number".to_string(),
        ))
    }

    async fn record_coupon_usage(
        &self,
        txn: &DatabaseTransaction,
        applied: &coupon::Model,
        order_id: i32,
        discount_amount: rust_decimal::Decimal,
    ) -> Result<(), ServiceError> {
        coupon_usage::ActiveModel {
            coupon_id: Set(applied.id),
            order_id: Set(order_id),
            discount_amount: Set(discount_amount),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(txn)
        .await?;

        coupon::Entity::update_many()
            .col_expr(
                coupon::Column::UsageCount,
                Expr::col(coupon::Column::UsageCount).add(1),
            )
            .filter(coupon::Column::Id.eq(applied.id))
            .exec(txn)
            .await?;

        Ok(())
    }
}

/// Date-prefixed order number, e.g. `ORD202603140042`.
fn short_order_number(today: NaiveDate) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(1..=9999);
    format!(
        "ORD{}{:02}{:02}{suffix:04}",
        today.year(),
        today.month(),
        today.day()
    )
}

/// Longer form used after a collision.
fn long_order_number(today: NaiveDate) -> String {
    let unique = Uuid::new_v4().simple().to_string();
    format!(
        "ORD{}{:02}{:02}-{}",
        today.year(),
        today.month(),
        today.day(),
        &unique[..12]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_order_number_format() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let number = short_order_number(date);
        assert!(number.starts_with("ORD20260314"));
        assert_eq!(number.len(), "ORD20260314".len() + 4);
    }

    #[test]
    fn long_order_numbers_do_not_repeat() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert_ne!(long_order_number(date), long_order_number(date));
    }
}
