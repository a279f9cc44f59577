use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Guest order created from a cart's contents.
///
/// Totals and addresses are snapshots taken at checkout; item rows are
/// immutable once created. Cancellation is only permitted from
/// `pending`/`processing` and restores inventory through the movement
/// ledger.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Client-facing reference, unique at the database level
    #[sea_orm(unique)]
    pub order_number: String,
    pub guest_email: String,
    pub status: OrderStatus,
    pub payment_status: String,
    pub fulfillment_status: String,
    pub currency: String,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub tax_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub shipping_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub discount_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub total_amount: Decimal,
    #[sea_orm(column_type = "Json")]
    pub billing_address: Json,
    #[sea_orm(column_type = "Json")]
    pub shipping_address: Json,
    #[sea_orm(nullable)]
    pub shipping_method: Option<String>,
    #[sea_orm(nullable)]
    pub tracking_number: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(has_many = "super::payment_transaction::Entity")]
    PaymentTransactions,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::payment_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl OrderStatus {
    /// Statuses an order may be cancelled from.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }
}
