use crate::{
    entities::{
        booking, booking_session, session, session_type, trainer, BookingSessionStatus,
        BookingStatus, SessionStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{Datelike, NaiveDate, NaiveTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

const BOOKING_NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingInput {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub client_name: String,
    #[validate(email(message = "A valid email address is required"))]
    pub client_email: String,
    #[validate(length(min = 10, message = "Phone number must be at least 10 characters"))]
    pub client_phone: String,
    pub sessions: Vec<i32>,
    pub terms_accepted: bool,
    pub special_requests: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingClient {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookedSessionView {
    pub session_id: i32,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i32,
    pub session_type: String,
    pub trainer_name: String,
    pub price: Decimal,
    pub status: BookingSessionStatus,
}

/// Fully assembled booking as returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct BookingDetails {
    pub id: i32,
    pub booking_number: String,
    pub client: BookingClient,
    pub total_amount: Decimal,
    pub booking_status: BookingStatus,
    pub payment_status: String,
    pub payment_method: Option<String>,
    pub special_requests: Option<String>,
    pub sessions: Vec<BookedSessionView>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

/// Booking creation and cancellation — the capacity-consistency core.
///
/// All multi-row work happens in one transaction: the booking row, its
/// session links and every capacity increment commit or roll back together,
/// so a failed session mid-list never leaves partial state behind.
#[derive(Clone)]
pub struct BookingService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl BookingService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Create a booking for one or more sessions.
    ///
    /// Validation happens before the transaction opens. Inside it, each
    /// session is checked in the order the client sent them, the booking
    /// row is inserted under the unique booking-number constraint, and each
    /// capacity take is a guarded conditional update whose affected-row
    /// count decides between success and "already full".
    #[instrument(skip(self, input), fields(client_email = %input.client_email))]
    pub async fn create_booking(
        &self,
        input: CreateBookingInput,
    ) -> Result<BookingDetails, ServiceError> {
        input.validate()?;
        if !input.terms_accepted {
            return Err(ServiceError::ValidationError(
                "Terms and conditions must be accepted".to_string(),
            ));
        }
        if input.sessions.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one session must be selected".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let mut total_amount = Decimal::ZERO;
        let mut selected = Vec::with_capacity(input.sessions.len());
        for &session_id in &input.sessions {
            let s = session::Entity::find_by_id(session_id)
                .filter(session::Column::Status.eq(SessionStatus::Available))
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::InvalidOperation(format!(
                        "Session {session_id} is not available"
                    ))
                })?;

            if s.current_participants >= s.max_participants {
                return Err(ServiceError::SessionFull(format!(
                    "Session {session_id} is already full"
                )));
            }

            total_amount += s.price;
            selected.push(s);
        }

        let booking = self
            .insert_booking_with_unique_number(&txn, &input, total_amount)
            .await?;

        for s in &selected {
            booking_session::ActiveModel {
                booking_id: Set(booking.id),
                session_id: Set(s.id),
                price: Set(s.price),
                status: Set(BookingSessionStatus::Booked),
                ..Default::default()
            }
            .insert(&txn)
            .await?;

            self.take_capacity(&txn, s.id).await?;
        }

        txn.commit().await?;

        info!(
            booking_id = booking.id,
            booking_number = %booking.booking_number,
            sessions = selected.len(),
            "booking created"
        );
        self.event_sender
            .send_or_log(Event::BookingCreated(booking.id))
            .await;

        self.booking_details(booking).await
    }

    /// Look up a booking by its number, with per-session detail.
    pub async fn get_booking(&self, booking_number: &str) -> Result<BookingDetails, ServiceError> {
        let booking = booking::Entity::find()
            .filter(booking::Column::BookingNumber.eq(booking_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Booking not found".to_string()))?;

        self.booking_details(booking).await
    }

    /// Cancel a booking: flips the booking and all its links to cancelled
    /// and releases each consumed spot, floored at zero, in one
    /// transaction.
    #[instrument(skip(self))]
    pub async fn cancel_booking(&self, booking_number: &str) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let booking = booking::Entity::find()
            .filter(booking::Column::BookingNumber.eq(booking_number))
            .filter(booking::Column::BookingStatus.ne(BookingStatus::Cancelled))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound("Booking not found or already cancelled".to_string())
            })?;

        let booked_links = booking_session::Entity::find()
            .filter(booking_session::Column::BookingId.eq(booking.id))
            .filter(booking_session::Column::Status.eq(BookingSessionStatus::Booked))
            .all(&txn)
            .await?;

        let booking_id = booking.id;
        let mut active: booking::ActiveModel = booking.into();
        active.booking_status = Set(BookingStatus::Cancelled);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        booking_session::Entity::update_many()
            .col_expr(
                booking_session::Column::Status,
                Expr::value(BookingSessionStatus::Cancelled),
            )
            .filter(booking_session::Column::BookingId.eq(booking_id))
            .exec(&txn)
            .await?;

        for link in &booked_links {
            self.release_capacity(&txn, link.session_id).await?;
        }

        txn.commit().await?;

        info!(booking_number, "booking cancelled");
        self.event_sender
            .send_or_log(Event::BookingCancelled {
                booking_number: booking_number.to_string(),
            })
            .await;

        Ok(())
    }

    /// Insert the booking row, retrying with a longer number on a
    /// collision. Uniqueness is the database's job; the retry merely picks
    /// a fresh candidate.
    async fn insert_booking_with_unique_number(
        &self,
        txn: &DatabaseTransaction,
        input: &CreateBookingInput,
        total_amount: Decimal,
    ) -> Result<booking::Model, ServiceError> {
        let now = Utc::now();
        for attempt in 0..BOOKING_NUMBER_ATTEMPTS {
            let number = if attempt == 0 {
                short_booking_number(now.date_naive())
            } else {
                long_booking_number(now.date_naive())
            };

            let candidate = booking::ActiveModel {
                booking_number: Set(number.clone()),
                client_name: Set(input.client_name.clone()),
                client_email: Set(input.client_email.clone()),
                client_phone: Set(input.client_phone.clone()),
                total_amount: Set(total_amount),
                terms_accepted: Set(input.terms_accepted),
                special_requests: Set(input.special_requests.clone()),
                booking_status: Set(BookingStatus::Pending),
                payment_status: Set("pending".to_string()),
                payment_method: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };

            match candidate.insert(txn).await {
                Ok(model) => return Ok(model),
                Err(err) => match err.sql_err() {
                    Some(SqlErr::UniqueConstraintViolation(_)) => {
                        warn!(number, attempt, "booking number collision, retrying");
                        continue;
                    }
                    _ => return Err(err.into()),
                },
            }
        }

        Err(ServiceError::Conflict(
            "Could not allocate a unique booking number".to_string(),
        ))
    }

    /// Take one spot: increments the counter only while the session is
    /// available and below capacity, then flips the status to booked when
    /// the counter reaches the maximum.
    async fn take_capacity<C: ConnectionTrait>(
        &self,
        conn: &C,
        session_id: i32,
    ) -> Result<(), ServiceError> {
        let result = session::Entity::update_many()
            .col_expr(
                session::Column::CurrentParticipants,
                Expr::col(session::Column::CurrentParticipants).add(1),
            )
            .filter(session::Column::Id.eq(session_id))
            .filter(session::Column::Status.eq(SessionStatus::Available))
            .filter(
                Expr::col(session::Column::CurrentParticipants)
                    .lt(Expr::col(session::Column::MaxParticipants)),
            )
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::SessionFull(format!(
                "Session {session_id} is already full"
            )));
        }

        session::Entity::update_many()
            .col_expr(session::Column::Status, Expr::value(SessionStatus::Booked))
            .filter(session::Column::Id.eq(session_id))
            .filter(
                Expr::col(session::Column::CurrentParticipants)
                    .gte(Expr::col(session::Column::MaxParticipants)),
            )
            .exec(conn)
            .await?;

        Ok(())
    }

    /// Release one spot: decrement floored at zero, and a booked session
    /// drops back to available once below capacity.
    async fn release_capacity<C: ConnectionTrait>(
        &self,
        conn: &C,
        session_id: i32,
    ) -> Result<(), ServiceError> {
        session::Entity::update_many()
            .col_expr(
                session::Column::CurrentParticipants,
                Expr::col(session::Column::CurrentParticipants).sub(1),
            )
            .filter(session::Column::Id.eq(session_id))
            .filter(session::Column::CurrentParticipants.gt(0))
            .exec(conn)
            .await?;

        session::Entity::update_many()
            .col_expr(
                session::Column::Status,
                Expr::value(SessionStatus::Available),
            )
            .filter(session::Column::Id.eq(session_id))
            .filter(session::Column::Status.eq(SessionStatus::Booked))
            .filter(
                Expr::col(session::Column::CurrentParticipants)
                    .lt(Expr::col(session::Column::MaxParticipants)),
            )
            .exec(conn)
            .await?;

        Ok(())
    }

    async fn booking_details(&self, booking: booking::Model) -> Result<BookingDetails, ServiceError> {
        let links = booking_session::Entity::find()
            .filter(booking_session::Column::BookingId.eq(booking.id))
            .all(&*self.db)
            .await?;

        let session_ids: Vec<i32> = links.iter().map(|l| l.session_id).collect();
        let sessions: Vec<session::Model> = session::Entity::find()
            .filter(session::Column::Id.is_in(session_ids))
            .order_by_asc(session::Column::Date)
            .order_by_asc(session::Column::StartTime)
            .all(&*self.db)
            .await?;

        let type_ids: Vec<i32> = sessions.iter().map(|s| s.session_type_id).collect();
        let trainer_ids: Vec<i32> = sessions.iter().map(|s| s.trainer_id).collect();
        let types: HashMap<i32, session_type::Model> = session_type::Entity::find()
            .filter(session_type::Column::Id.is_in(type_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();
        let trainers: HashMap<i32, trainer::Model> = trainer::Entity::find()
            .filter(trainer::Column::Id.is_in(trainer_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let links_by_session: HashMap<i32, &booking_session::Model> =
            links.iter().map(|l| (l.session_id, l)).collect();

        let session_views = sessions
            .into_iter()
            .filter_map(|s| {
                let link = links_by_session.get(&s.id)?;
                Some(BookedSessionView {
                    session_id: s.id,
                    date: s.date,
                    start_time: s.start_time,
                    end_time: s.end_time,
                    duration_minutes: s.duration_minutes,
                    session_type: types
                        .get(&s.session_type_id)
                        .map(|t| t.name.clone())
                        .unwrap_or_default(),
                    trainer_name: trainers
                        .get(&s.trainer_id)
                        .map(|t| t.name.clone())
                        .unwrap_or_default(),
                    price: link.price,
                    status: link.status,
                })
            })
            .collect();

        Ok(BookingDetails {
            id: booking.id,
            booking_number: booking.booking_number,
            client: BookingClient {
                name: booking.client_name,
                email: booking.client_email,
                phone: booking.client_phone,
            },
            total_amount: booking.total_amount,
            booking_status: booking.booking_status,
            payment_status: booking.payment_status,
            payment_method: booking.payment_method,
            special_requests: booking.special_requests,
            sessions: session_views,
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        })
    }
}

/// Short year-prefixed booking number, e.g. `MTB-20260042`.
fn short_booking_number(today: NaiveDate) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(1..=9999);
    format!("MTB-{}{suffix:04}", today.year())
}

/// Longer date-plus-random form used after a collision.
fn long_booking_number(today: NaiveDate) -> String {
    let unique = Uuid::new_v4().simple().to_string();
    format!(
        "MTB-{}{:02}{:02}-{}",
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
    fn short_number_is_year_prefixed() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let number = short_booking_number(date);
        assert!(number.starts_with("MTB-2026"));
        assert_eq!(number.len(), "MTB-2026".len() + 4);
    }

    #[test]
    fn long_number_embeds_full_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let number = long_booking_number(date);
        assert!(number.starts_with("MTB-20260314-"));
        assert_eq!(number.len(), "MTB-20260314-".len() + 12);
    }

    #[test]
    fn long_numbers_do_not_repeat() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert_ne!(long_booking_number(date), long_booking_number(date));
    }
}
