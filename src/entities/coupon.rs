use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Discount code with a type-specific effect on cart totals.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub code: String,
    pub coupon_type: CouponType,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub minimum_amount: Decimal,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    #[sea_orm(nullable)]
    pub starts_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coupon_usage::Entity")]
    Usage,
}

impl Related<super::coupon_usage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Usage.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum CouponType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed_amount")]
    FixedAmount,
    #[sea_orm(string_value = "free_shipping")]
    FreeShipping,
}
