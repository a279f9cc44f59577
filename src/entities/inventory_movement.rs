use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only ledger of quantity deltas applied to a product or variant.
/// `quantity_after` records the resulting on-hand quantity so the ledger can
/// be audited without replaying it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_movements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub product_id: i32,
    pub product_variant_id: Option<i32>,
    pub movement_type: MovementType,
    pub quantity_change: i32,
    pub quantity_after: i32,
    #[sea_orm(nullable)]
    pub reference_type: Option<String>,
    pub reference_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    #[sea_orm(string_value = "sale")]
    Sale,
    #[sea_orm(string_value = "return")]
    Return,
    #[sea_orm(string_value = "manual")]
    Manual,
    #[sea_orm(string_value = "restock")]
    Restock,
}
