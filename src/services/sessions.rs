use crate::{
    entities::{session, session_type, trainer, SessionStatus},
    errors::ServiceError,
};
use chrono::{NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Filters accepted by the session listing.
#[derive(Debug, Default, Deserialize)]
pub struct SessionFilters {
    pub date: Option<NaiveDate>,
    /// Session type name (padel, fitness, tennis, ...)
    #[serde(rename = "type")]
    pub session_type: Option<String>,
    pub trainer_id: Option<i32>,
    pub duration: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionTypeInfo {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainerInfo {
    pub name: String,
    pub bio: Option<String>,
    pub specializations: serde_json::Value,
    pub image_url: String,
}

/// Session with nested type and trainer data, as served by the listing and
/// detail endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: i32,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i32,
    pub price: Decimal,
    pub status: SessionStatus,
    pub max_participants: i32,
    pub current_participants: i32,
    pub available_spots: i32,
    pub notes: Option<String>,
    pub session_type: SessionTypeInfo,
    pub trainer: TrainerInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionAvailability {
    pub session_id: i32,
    pub max_participants: i32,
    pub current_participants: i32,
    pub available_spots: i32,
    pub status: SessionStatus,
    pub is_available: bool,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainerView {
    pub id: i32,
    pub name: String,
    pub specializations: serde_json::Value,
    pub hourly_rate: Decimal,
    pub bio: Option<String>,
    pub image_url: String,
}

/// Read side for sessions, session types and trainers.
#[derive(Clone)]
pub struct SessionService {
    db: Arc<DatabaseConnection>,
}

impl SessionService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Available future sessions with nested type/trainer objects.
    #[instrument(skip(self))]
    pub async fn list_sessions(
        &self,
        filters: &SessionFilters,
    ) -> Result<Vec<SessionView>, ServiceError> {
        let today = Utc::now().date_naive();

        let mut query = session::Entity::find()
            .filter(session::Column::Status.eq(SessionStatus::Available))
            .filter(session::Column::Date.gte(today));

        if let Some(date) = filters.date {
            query = query.filter(session::Column::Date.eq(date));
        }
        if let Some(trainer_id) = filters.trainer_id {
            query = query.filter(session::Column::TrainerId.eq(trainer_id));
        }
        if let Some(duration) = filters.duration {
            query = query.filter(session::Column::DurationMinutes.eq(duration));
        }

        let sessions = query
            .order_by_asc(session::Column::Date)
            .order_by_asc(session::Column::StartTime)
            .all(&*self.db)
            .await?;

        let (types, trainers) = self.reference_maps(&sessions).await?;

        let mut views = Vec::with_capacity(sessions.len());
        for s in sessions {
            let Some(session_type) = types.get(&s.session_type_id) else {
                continue; // inactive type
            };
            if let Some(wanted) = &filters.session_type {
                if !session_type.name.eq_ignore_ascii_case(wanted) {
                    continue;
                }
            }
            let Some(trainer) = trainers.get(&s.trainer_id) else {
                continue; // inactive trainer
            };
            views.push(assemble_view(s, session_type, trainer));
        }

        Ok(views)
    }

    /// Active session types, ordered by name.
    pub async fn list_session_types(&self) -> Result<Vec<session_type::Model>, ServiceError> {
        Ok(session_type::Entity::find()
            .filter(session_type::Column::IsActive.eq(true))
            .order_by_asc(session_type::Column::Name)
            .all(&*self.db)
            .await?)
    }

    /// Active trainers, optionally filtered by specialization.
    pub async fn list_trainers(
        &self,
        specialization: Option<&str>,
    ) -> Result<Vec<TrainerView>, ServiceError> {
        let trainers = trainer::Entity::find()
            .filter(trainer::Column::IsActive.eq(true))
            .order_by_asc(trainer::Column::Name)
            .all(&*self.db)
            .await?;

        Ok(trainers
            .into_iter()
            .filter(|t| match specialization {
                Some(wanted) => t
                    .specializations
                    .as_array()
                    .is_some_and(|list| {
                        list.iter()
                            .any(|s| s.as_str().is_some_and(|s| s.eq_ignore_ascii_case(wanted)))
                    }),
                None => true,
            })
            .map(|t| TrainerView {
                id: t.id,
                image_url: avatar_url(t.image_url.as_deref(), &t.name),
                name: t.name,
                specializations: t.specializations,
                hourly_rate: t.hourly_rate,
                bio: t.bio,
            })
            .collect())
    }

    /// One available session with full nested detail.
    #[instrument(skip(self))]
    pub async fn get_session(&self, id: i32) -> Result<SessionView, ServiceError> {
        let s = session::Entity::find_by_id(id)
            .filter(session::Column::Status.eq(SessionStatus::Available))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound("Session not found or not available".to_string())
            })?;

        let session_type = session_type::Entity::find_by_id(s.session_type_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Session type not found".to_string()))?;
        let trainer = trainer::Entity::find_by_id(s.trainer_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Trainer not found".to_string()))?;

        Ok(assemble_view(s, &session_type, &trainer))
    }

    /// Capacity summary for any session, regardless of status.
    pub async fn get_availability(&self, id: i32) -> Result<SessionAvailability, ServiceError> {
        let s = session::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Session not found".to_string()))?;

        let available_spots = (s.max_participants - s.current_participants).max(0);
        Ok(SessionAvailability {
            session_id: s.id,
            max_participants: s.max_participants,
            current_participants: s.current_participants,
            available_spots,
            status: s.status,
            is_available: s.status == SessionStatus::Available && available_spots > 0,
            date: s.date,
            start_time: s.start_time,
            end_time: s.end_time,
        })
    }

    async fn reference_maps(
        &self,
        sessions: &[session::Model],
    ) -> Result<
        (
            HashMap<i32, session_type::Model>,
            HashMap<i32, trainer::Model>,
        ),
        ServiceError,
    > {
        let type_ids: Vec<i32> = sessions.iter().map(|s| s.session_type_id).collect();
        let trainer_ids: Vec<i32> = sessions.iter().map(|s| s.trainer_id).collect();

        let types = session_type::Entity::find()
            .filter(session_type::Column::Id.is_in(type_ids))
            .filter(session_type::Column::IsActive.eq(true))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let trainers = trainer::Entity::find()
            .filter(trainer::Column::Id.is_in(trainer_ids))
            .filter(trainer::Column::IsActive.eq(true))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        Ok((types, trainers))
    }
}

fn assemble_view(
    s: session::Model,
    session_type: &session_type::Model,
    trainer: &trainer::Model,
) -> SessionView {
    SessionView {
        id: s.id,
        date: s.date,
        start_time: s.start_time,
        end_time: s.end_time,
        duration_minutes: s.duration_minutes,
        price: s.price,
        status: s.status,
        max_participants: s.max_participants,
        current_participants: s.current_participants,
        available_spots: (s.max_participants - s.current_participants).max(0),
        notes: s.notes,
        session_type: SessionTypeInfo {
            name: session_type.name.clone(),
            description: session_type.description.clone(),
        },
        trainer: TrainerInfo {
            name: trainer.name.clone(),
            bio: trainer.bio.clone(),
            specializations: trainer.specializations.clone(),
            image_url: avatar_url(trainer.image_url.as_deref(), &trainer.name),
        },
    }
}

/// Trainer image with a deterministic generated-avatar fallback.
fn avatar_url(image_url: Option<&str>, name: &str) -> String {
    match image_url {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => {
            let encoded: String = name
                .chars()
                .map(|c| if c == ' ' { '+' } else { c })
                .collect();
            format!(
                "https://ui-avatars.com/api/?name={encoded}&size=128&color=ffffff&format=png&rounded=true&bold=true"
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avatar_url_prefers_custom_image() {
        assert_eq!(
            avatar_url(Some("https://cdn.example.com/t.png"), "Ana Costa"),
            "https://cdn.example.com/t.png"
        );
    }

    #[test]
    fn avatar_url_falls_back_to_generated() {
        let url = avatar_url(None, "Ana Costa");
        assert!(url.contains("ui-avatars.com"));
        assert!(url.contains("Ana+Costa"));

        // empty string is treated the same as missing
        assert!(avatar_url(Some(""), "Ana").contains("ui-avatars.com"));
    }
}
