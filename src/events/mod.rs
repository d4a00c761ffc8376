//! Event ingest: the single entry point for activity completions.
//!
//! Normalizes heterogeneous producer payloads into one canonical
//! `ActivityEvent`, persists it, then drives the rest of the pipeline:
//! reward settlement and skill impact recording on the critical path, goal
//! auto-progress next, consequence generation detached and best-effort.

pub mod types;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::consequences::{self, GenerateConsequencesRequest};
use crate::goals::{GoalEngine, GoalsError};
use crate::rewards::{RewardEngine, RewardPerformance, RewardsError};
use crate::shared::schema::activity_events;
use crate::shared::state::AppState;
use crate::skills::{SkillEngine, SkillsError};

pub use types::{
    ActivityEvent, ActivityEventRecord, EventType, FeedbackRelationship, IngestResponse,
    RawActivityEvent, SourceType,
};

#[derive(Debug, thiserror::Error)]
pub enum EventsError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Database error: {0}")]
    Database(String),
}

impl IntoResponse for EventsError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Configuration(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            Self::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<SkillsError> for EventsError {
    fn from(e: SkillsError) -> Self {
        match e {
            SkillsError::Validation(msg) => Self::Validation(msg),
            SkillsError::Database(msg) => Self::Database(msg),
        }
    }
}

impl From<RewardsError> for EventsError {
    fn from(e: RewardsError) -> Self {
        match e {
            RewardsError::Validation(msg) => Self::Validation(msg),
            RewardsError::Configuration(msg) => Self::Configuration(msg),
            RewardsError::NotFound(msg) | RewardsError::Database(msg) => Self::Database(msg),
        }
    }
}

impl From<GoalsError> for EventsError {
    fn from(e: GoalsError) -> Self {
        match e {
            GoalsError::Validation(msg) => Self::Validation(msg),
            GoalsError::NotFound(msg) | GoalsError::Conflict(msg) | GoalsError::Database(msg) => {
                Self::Database(msg)
            }
        }
    }
}

/// Pure validation and normalization stage. No side effects; a rejected event
/// is simply resubmitted by the caller with corrected data.
pub fn normalize(raw: &RawActivityEvent) -> Result<ActivityEvent, EventsError> {
    let user_id = raw
        .user_id
        .filter(|id| !id.is_nil())
        .ok_or_else(|| EventsError::Validation("user_id is required".to_string()))?;

    let source_id = raw
        .source_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            EventsError::Validation("source_id is required and must be non-empty".to_string())
        })?
        .to_string();

    if let Some(score) = raw.score {
        if !score.is_finite() || !(0.0..=100.0).contains(&score) {
            return Err(EventsError::Validation(
                "score must be between 0 and 100".to_string(),
            ));
        }
    }

    let mut skill_ids = Vec::with_capacity(raw.skill_ids.len());
    for skill in &raw.skill_ids {
        if !skill_ids.contains(skill) {
            skill_ids.push(*skill);
        }
    }

    let mut performance = raw.performance.clone();
    if let Some(p) = performance.as_mut() {
        if p.score.is_none() {
            p.score = raw.score;
        }
    }

    Ok(ActivityEvent {
        id: Uuid::new_v4(),
        user_id,
        organization_id: raw.organization_id,
        event_type: raw.event_type,
        source_type: raw.source_type,
        source_id,
        score: raw.score,
        skill_ids,
        relationship: raw
            .relationship
            .as_deref()
            .map(FeedbackRelationship::from_str),
        performance,
        occurred_at: raw.occurred_at.unwrap_or_else(Utc::now),
    })
}

/// `POST /api/events` — ingest one completion and run the pipeline.
///
/// Reward settlement and impact recording failures propagate: the producer
/// must be able to tell the user "progress not recorded" instead of silently
/// dropping signal. Consequence generation is detached and never fails the
/// request.
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<RawActivityEvent>,
) -> Result<Json<IngestResponse>, EventsError> {
    let event = normalize(&raw)?;

    let record = ActivityEventRecord::from_event(&event, raw.payload.clone());
    let pool = state.conn.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| EventsError::Database(e.to_string()))?;
        diesel::insert_into(activity_events::table)
            .values(&record)
            .execute(&mut conn)
            .map_err(|e| EventsError::Database(e.to_string()))?;
        Ok::<_, EventsError>(())
    })
    .await
    .map_err(|e| EventsError::Database(e.to_string()))??;

    // Settlement first so engagement impacts can carry the XP actually paid.
    let reward_engine = RewardEngine::new(state.conn.clone());
    let performance = event.performance.clone().unwrap_or(RewardPerformance {
        score: event.score,
        ..Default::default()
    });
    let attempt_id = raw
        .attempt_id
        .clone()
        .unwrap_or_else(|| event.id.to_string());
    let reward = reward_engine
        .settle(
            event.user_id,
            event.organization_id,
            event.source_type,
            &event.source_id,
            &performance,
            Some(attempt_id),
        )
        .await?;

    let skill_engine = SkillEngine::new(state.conn.clone());
    let impacts = skill_engine
        .record_for_event(&event, reward.as_ref().map(|r| r.xp))
        .await?;

    let goal_engine = GoalEngine::new(
        state.conn.clone(),
        state.config.pipeline.goal_impact.clone(),
    );
    let applied = goal_engine.apply_event(&event).await?;

    if matches!(
        event.event_type,
        EventType::TestCompleted | EventType::FeedbackGiven
    ) {
        consequences::generate_detached(
            state.conn.clone(),
            state.config.pipeline.consequence_timeout_secs,
            GenerateConsequencesRequest {
                user_id: event.user_id,
                organization_id: event.organization_id,
                assessment_type: event.source_type,
                assessment_id: event.source_id.clone(),
                score: event.score,
                skill_ids: event.skill_ids.clone(),
            },
        );
    }

    info!(
        "Ingested {} event {} for user {}: {} impacts, {} goal updates",
        event.event_type.to_str(),
        event.id,
        event.user_id,
        impacts.len(),
        applied.updates.len()
    );

    Ok(Json(IngestResponse {
        event,
        reward,
        skill_impacts_recorded: impacts.len(),
        goal_updates: applied.updates,
        goal_xp_credited: applied.xp_credited,
    }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListEventsQuery {
    pub user_id: Uuid,
    pub limit: Option<i64>,
}

/// Recent activity feed for dashboards.
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<Vec<ActivityEventRecord>>, EventsError> {
    let pool = state.conn.clone();

    let result = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| EventsError::Database(e.to_string()))?;
        activity_events::table
            .filter(activity_events::user_id.eq(query.user_id))
            .order(activity_events::occurred_at.desc())
            .limit(query.limit.unwrap_or(50).clamp(1, 500))
            .load::<ActivityEventRecord>(&mut conn)
            .map_err(|e| EventsError::Database(e.to_string()))
    })
    .await
    .map_err(|e| EventsError::Database(e.to_string()))??;

    Ok(Json(result))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new().route("/api/events", get(list_events).post(ingest_event))
}
