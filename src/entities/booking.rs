use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Client reservation of one or more training sessions.
///
/// Created atomically with its `booking_sessions` links; `total_amount` is
/// the sum of the linked sessions' prices at booking time.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bookings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Client-facing reference, unique at the database level
    #[sea_orm(unique)]
    pub booking_number: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub total_amount: Decimal,
    pub terms_accepted: bool,
    #[sea_orm(column_type = "Text", nullable)]
    pub special_requests: Option<String>,
    pub booking_status: BookingStatus,
    pub payment_status: String,
    #[sea_orm(nullable)]
    pub payment_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::booking_session::Entity")]
    BookingSessions,
}

impl Related<super::booking_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BookingSessions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "completed")]
    Completed,
}
