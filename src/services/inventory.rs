use crate::{
    entities::{inventory_movement, product, product_variant, MovementType},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use metrics::counter;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};

/// A signed quantity delta to apply to a product or one of its variants.
#[derive(Debug, Clone)]
pub struct InventoryChange {
    pub product_id: i32,
    pub variant_id: Option<i32>,
    pub quantity_change: i32,
    pub movement_type: MovementType,
    /// Order id for `sale`/`return` movements
    pub reference_id: Option<i32>,
}

/// Inventory availability checks and the signed-delta primitive shared by
/// order creation (negative) and cancellation (positive).
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Whether `quantity` units can be taken for the given product/variant.
    /// Products with `track_inventory = false` are always available.
    pub async fn check_availability<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: i32,
        variant_id: Option<i32>,
        quantity: i32,
    ) -> Result<bool, ServiceError> {
        if let Some(variant_id) = variant_id {
            let variant = product_variant::Entity::find()
                .filter(product_variant::Column::Id.eq(variant_id))
                .filter(product_variant::Column::ProductId.eq(product_id))
                .filter(product_variant::Column::IsActive.eq(true))
                .one(conn)
                .await?;
            return Ok(variant.is_some_and(|v| v.inventory_quantity >= quantity));
        }

        let product = product::Entity::find()
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::IsActive.eq(true))
            .one(conn)
            .await?;
        Ok(product.is_some_and(|p| !p.track_inventory || p.inventory_quantity >= quantity))
    }

    /// Apply a signed delta on the caller's connection (usually an open
    /// transaction) and record the movement ledger row.
    ///
    /// Negative deltas are guarded by a conditional update — the quantity
    /// column never goes below zero and a concurrent writer losing the race
    /// gets `InsufficientStock`, not a silently oversold row.
    pub async fn apply<C: ConnectionTrait>(
        &self,
        conn: &C,
        change: &InventoryChange,
    ) -> Result<inventory_movement::Model, ServiceError> {
        let quantity_after = if let Some(variant_id) = change.variant_id {
            self.apply_to_variant(conn, variant_id, change).await?
        } else {
            self.apply_to_product(conn, change).await?
        };

        let movement = inventory_movement::ActiveModel {
            product_id: Set(change.product_id),
            product_variant_id: Set(change.variant_id),
            movement_type: Set(change.movement_type),
            quantity_change: Set(change.quantity_change),
            quantity_after: Set(quantity_after),
            reference_type: Set(change.reference_id.map(|_| "order".to_string())),
            reference_id: Set(change.reference_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(conn)
        .await?;

        counter!("matchable_inventory.movements", 1);
        Ok(movement)
    }

    /// Apply a delta in its own transaction, for callers that are not
    /// already inside one (manual adjustments, restocks).
    #[instrument(skip(self))]
    pub async fn adjust(
        &self,
        change: InventoryChange,
    ) -> Result<inventory_movement::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let movement = self.apply(&txn, &change).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::InventoryAdjusted {
                product_id: change.product_id,
                variant_id: change.variant_id,
                quantity_change: change.quantity_change,
                quantity_after: movement.quantity_after,
                reason: format!("{:?}", change.movement_type).to_lowercase(),
            })
            .await;

        info!(
            product_id = change.product_id,
            change = change.quantity_change,
            after = movement.quantity_after,
            "inventory adjusted"
        );
        Ok(movement)
    }

    async fn apply_to_variant<C: ConnectionTrait>(
        &self,
        conn: &C,
        variant_id: i32,
        change: &InventoryChange,
    ) -> Result<i32, ServiceError> {
        let mut update = product_variant::Entity::update_many()
            .col_expr(
                product_variant::Column::InventoryQuantity,
                Expr::col(product_variant::Column::InventoryQuantity).add(change.quantity_change),
            )
            .filter(product_variant::Column::Id.eq(variant_id))
            .filter(product_variant::Column::ProductId.eq(change.product_id));

        if change.quantity_change < 0 {
            update = update
                .filter(product_variant::Column::InventoryQuantity.gte(-change.quantity_change));
        }

        let result = update.exec(conn).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "Insufficient inventory for variant {variant_id}"
            )));
        }

        let variant = product_variant::Entity::find_by_id(variant_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {variant_id} not found")))?;
        Ok(variant.inventory_quantity)
    }

    async fn apply_to_product<C: ConnectionTrait>(
        &self,
        conn: &C,
        change: &InventoryChange,
    ) -> Result<i32, ServiceError> {
        let mut update = product::Entity::update_many()
            .col_expr(
                product::Column::InventoryQuantity,
                Expr::col(product::Column::InventoryQuantity).add(change.quantity_change),
            )
            .filter(product::Column::Id.eq(change.product_id));

        if change.quantity_change < 0 {
            // Untracked products take the delta unconditionally; the ledger
            // still records it.
            update = update.filter(
                Condition::any()
                    .add(product::Column::TrackInventory.eq(false))
                    .add(product::Column::InventoryQuantity.gte(-change.quantity_change)),
            );
        }

        let result = update.exec(conn).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "Insufficient inventory for product {}",
                change.product_id
            )));
        }

        let product = product::Entity::find_by_id(change.product_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", change.product_id))
            })?;
        Ok(product.inventory_quantity)
    }
}
