use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Bookable trainer-led time slot.
///
/// `current_participants` is only ever mutated by booking creation and
/// cancellation, and always through guarded conditional updates so that
/// `0 <= current_participants <= max_participants` holds under concurrent
/// writers. `status` flips to `booked` exactly when the counter reaches
/// `max_participants` and back to `available` when it drops below.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub session_type_id: i32,
    pub trainer_id: i32,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i32,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub price: Decimal,
    pub status: SessionStatus,
    pub max_participants: i32,
    pub current_participants: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::session_type::Entity",
        from = "Column::SessionTypeId",
        to = "super::session_type::Column::Id"
    )]
    SessionType,
    #[sea_orm(
        belongs_to = "super::trainer::Entity",
        from = "Column::TrainerId",
        to = "super::trainer::Column::Id"
    )]
    Trainer,
    #[sea_orm(has_many = "super::booking_session::Entity")]
    BookingSessions,
}

impl Related<super::session_type::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SessionType.def()
    }
}

impl Related<super::trainer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Trainer.def()
    }
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
pub enum SessionStatus {
    #[sea_orm(string_value = "available")]
    Available,
    #[sea_orm(string_value = "booked")]
    Booked,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}
