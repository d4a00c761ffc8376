//! Skill impact log and score consolidation.
//!
//! The recorder is append-only: one row per (user, skill, source) impact,
//! never upserted, never deleted. The consolidator derives a windowed,
//! weighted score from that log on demand.

pub mod types;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use log::info;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::events::types::ActivityEvent;
use crate::shared::schema::skill_impact_events;
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

pub use types::{
    ConsolidatedSkillScore, ImpactType, ImpactTypeBreakdown, ImpactWeights, RecordImpactRequest,
    SkillImpactRecord, SkillScoreQuery,
};

#[derive(Debug, thiserror::Error)]
pub enum SkillsError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Database error: {0}")]
    Database(String),
}

impl IntoResponse for SkillsError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Derives the consolidated score from one (user, skill) window of the impact
/// log. Pure: same rows in, same score out.
pub fn consolidate(
    user_id: Uuid,
    skill_id: Uuid,
    period_days: i64,
    rows: &[SkillImpactRecord],
    weights: &ImpactWeights,
) -> ConsolidatedSkillScore {
    struct Group {
        scores: Vec<f64>,
        count: i64,
        total_xp: f64,
    }

    let mut groups: BTreeMap<&'static str, (ImpactType, Group)> = BTreeMap::new();
    let mut last_activity = None;

    for row in rows {
        let Some(impact_type) = ImpactType::from_str(&row.impact_type) else {
            continue;
        };
        let group = groups
            .entry(impact_type.to_str())
            .or_insert_with(|| {
                (
                    impact_type,
                    Group {
                        scores: Vec::new(),
                        count: 0,
                        total_xp: 0.0,
                    },
                )
            });

        group.1.count += 1;
        if impact_type == ImpactType::XpGain {
            group.1.total_xp += row.impact_value;
            // xp_gain carries a score only when the producer reported one
            if let Some(score) = row.normalized_score {
                group.1.scores.push(score);
            }
        } else {
            // assessment-like impacts: the raw value is already a 0-100 score
            group.1.scores.push(row.normalized_score.unwrap_or(row.impact_value));
        }

        if last_activity.map(|t| row.created_at > t).unwrap_or(true) {
            last_activity = Some(row.created_at);
        }
    }

    let mut breakdown = Vec::with_capacity(groups.len());
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    for (_, (impact_type, group)) in groups {
        let avg_score = if group.scores.is_empty() {
            None
        } else {
            Some(group.scores.iter().sum::<f64>() / group.scores.len() as f64)
        };

        let weight = weights.weight_for(impact_type);
        if let Some(avg) = avg_score {
            if weight > 0.0 {
                weighted_sum += avg * weight;
                weight_total += weight;
            }
        }

        breakdown.push(ImpactTypeBreakdown {
            impact_type,
            avg_score,
            count: group.count,
            total_xp: group.total_xp,
        });
    }

    ConsolidatedSkillScore {
        user_id,
        skill_id,
        period_days,
        consolidated_score: (weight_total > 0.0).then(|| weighted_sum / weight_total),
        breakdown,
        total_events: rows.len() as i64,
        last_activity,
    }
}

pub struct SkillEngine {
    db: DbPool,
}

impl SkillEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Appends one impact row. Persistence failure propagates; a dropped
    /// impact would silently corrupt every downstream trend.
    pub async fn record_impact(&self, record: SkillImpactRecord) -> Result<Uuid, SkillsError> {
        let pool = self.db.clone();
        let id = record.id;

        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| SkillsError::Database(e.to_string()))?;
            diesel::insert_into(skill_impact_events::table)
                .values(&record)
                .execute(&mut conn)
                .map_err(|e| SkillsError::Database(e.to_string()))?;
            Ok::<_, SkillsError>(())
        })
        .await
        .map_err(|e| SkillsError::Database(e.to_string()))??;

        Ok(id)
    }

    /// Fans one canonical event out into impact rows, one per touched skill.
    /// For engagement events the impact value is the XP actually awarded.
    pub async fn record_for_event(
        &self,
        event: &ActivityEvent,
        awarded_xp: Option<i64>,
    ) -> Result<Vec<Uuid>, SkillsError> {
        if event.skill_ids.is_empty() {
            return Ok(Vec::new());
        }

        let impact_type = event.impact_type();
        let impact_value = match impact_type {
            ImpactType::XpGain => awarded_xp.unwrap_or(0) as f64,
            _ => event.score.unwrap_or(0.0),
        };
        let metadata = serde_json::json!({
            "event_id": event.id,
            "event_type": event.event_type,
        });

        let now = Utc::now();
        let records: Vec<SkillImpactRecord> = event
            .skill_ids
            .iter()
            .map(|skill_id| SkillImpactRecord {
                id: Uuid::new_v4(),
                org_id: event.organization_id,
                user_id: event.user_id,
                skill_id: *skill_id,
                source_type: event.source_type.to_str().to_string(),
                source_id: Some(event.source_id.clone()),
                impact_type: impact_type.to_str().to_string(),
                impact_value,
                normalized_score: event.score,
                metadata: metadata.clone(),
                created_at: now,
            })
            .collect();
        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();

        let pool = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| SkillsError::Database(e.to_string()))?;
            diesel::insert_into(skill_impact_events::table)
                .values(&records)
                .execute(&mut conn)
                .map_err(|e| SkillsError::Database(e.to_string()))?;
            Ok::<_, SkillsError>(())
        })
        .await
        .map_err(|e| SkillsError::Database(e.to_string()))??;

        Ok(ids)
    }

    pub async fn consolidated_score(
        &self,
        user_id: Uuid,
        skill_id: Uuid,
        period_days: i64,
        weights: &ImpactWeights,
    ) -> Result<ConsolidatedSkillScore, SkillsError> {
        let pool = self.db.clone();
        let since = Utc::now() - Duration::days(period_days);

        let rows = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| SkillsError::Database(e.to_string()))?;
            skill_impact_events::table
                .filter(skill_impact_events::user_id.eq(user_id))
                .filter(skill_impact_events::skill_id.eq(skill_id))
                .filter(skill_impact_events::created_at.ge(since))
                .order(skill_impact_events::created_at.asc())
                .load::<SkillImpactRecord>(&mut conn)
                .map_err(|e| SkillsError::Database(e.to_string()))
        })
        .await
        .map_err(|e| SkillsError::Database(e.to_string()))??;

        Ok(consolidate(user_id, skill_id, period_days, &rows, weights))
    }

    /// Per-skill consolidated scores for everything the user touched in the
    /// window. Feeds the dashboard insight panels.
    pub async fn summary(
        &self,
        user_id: Uuid,
        period_days: i64,
        weights: &ImpactWeights,
    ) -> Result<Vec<ConsolidatedSkillScore>, SkillsError> {
        let pool = self.db.clone();
        let since = Utc::now() - Duration::days(period_days);

        let rows = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| SkillsError::Database(e.to_string()))?;
            skill_impact_events::table
                .filter(skill_impact_events::user_id.eq(user_id))
                .filter(skill_impact_events::created_at.ge(since))
                .order(skill_impact_events::created_at.asc())
                .load::<SkillImpactRecord>(&mut conn)
                .map_err(|e| SkillsError::Database(e.to_string()))
        })
        .await
        .map_err(|e| SkillsError::Database(e.to_string()))??;

        let mut by_skill: BTreeMap<Uuid, Vec<SkillImpactRecord>> = BTreeMap::new();
        for row in rows {
            by_skill.entry(row.skill_id).or_default().push(row);
        }

        Ok(by_skill
            .into_iter()
            .map(|(skill_id, rows)| consolidate(user_id, skill_id, period_days, &rows, weights))
            .collect())
    }
}

// ----- HTTP surface -----

/// Direct impact recording, mirroring the `record_skill_impact` call contract
/// for producers that bypass event ingest.
pub async fn record_impact(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecordImpactRequest>,
) -> Result<Json<serde_json::Value>, SkillsError> {
    let engine = SkillEngine::new(state.conn.clone());
    let record = SkillImpactRecord {
        id: Uuid::new_v4(),
        org_id: req.organization_id,
        user_id: req.user_id,
        skill_id: req.skill_id,
        source_type: req.source_type.to_str().to_string(),
        source_id: req.source_id,
        impact_type: req.impact_type.to_str().to_string(),
        impact_value: req.impact_value,
        normalized_score: req.normalized_score,
        metadata: req.metadata.unwrap_or_else(|| serde_json::json!({})),
        created_at: Utc::now(),
    };
    let id = engine.record_impact(record).await?;
    info!("Recorded skill impact {} for user {}", id, req.user_id);
    Ok(Json(serde_json::json!({ "id": id })))
}

pub async fn get_skill_score(
    State(state): State<Arc<AppState>>,
    Path(skill_id): Path<Uuid>,
    Query(query): Query<SkillScoreQuery>,
) -> Result<Json<ConsolidatedSkillScore>, SkillsError> {
    let engine = SkillEngine::new(state.conn.clone());
    let period_days = query
        .period_days
        .unwrap_or(state.config.pipeline.consolidation_period_days);
    if period_days <= 0 {
        return Err(SkillsError::Validation(
            "period_days must be positive".to_string(),
        ));
    }
    let score = engine
        .consolidated_score(
            query.user_id,
            skill_id,
            period_days,
            &state.config.pipeline.impact_weights,
        )
        .await?;
    Ok(Json(score))
}

pub async fn get_skill_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SkillScoreQuery>,
) -> Result<Json<Vec<ConsolidatedSkillScore>>, SkillsError> {
    let engine = SkillEngine::new(state.conn.clone());
    let period_days = query
        .period_days
        .unwrap_or(state.config.pipeline.consolidation_period_days);
    if period_days <= 0 {
        return Err(SkillsError::Validation(
            "period_days must be positive".to_string(),
        ));
    }
    let summary = engine
        .summary(
            query.user_id,
            period_days,
            &state.config.pipeline.impact_weights,
        )
        .await?;
    Ok(Json(summary))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/skills/impacts", post(record_impact))
        .route("/api/skills/summary", get(get_skill_summary))
        .route("/api/skills/:skill_id/score", get(get_skill_score))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(impact_type: ImpactType, value: f64, normalized: Option<f64>) -> SkillImpactRecord {
        SkillImpactRecord {
            id: Uuid::new_v4(),
            org_id: None,
            user_id: Uuid::nil(),
            skill_id: Uuid::nil(),
            source_type: "game".to_string(),
            source_id: None,
            impact_type: impact_type.to_str().to_string(),
            impact_value: value,
            normalized_score: normalized,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn no_events_means_no_score_not_zero() {
        let score = consolidate(Uuid::nil(), Uuid::nil(), 90, &[], &ImpactWeights::default());
        assert_eq!(score.consolidated_score, None);
        assert_eq!(score.total_events, 0);
        assert_eq!(score.last_activity, None);
        assert!(score.breakdown.is_empty());
    }

    #[test]
    fn xp_only_events_count_but_do_not_score() {
        let rows = vec![
            row(ImpactType::XpGain, 120.0, None),
            row(ImpactType::XpGain, 80.0, None),
        ];
        let score = consolidate(Uuid::nil(), Uuid::nil(), 90, &rows, &ImpactWeights::default());
        assert_eq!(score.consolidated_score, None);
        assert_eq!(score.total_events, 2);
        let xp = &score.breakdown[0];
        assert_eq!(xp.impact_type, ImpactType::XpGain);
        assert_eq!(xp.total_xp, 200.0);
        assert_eq!(xp.count, 2);
    }

    #[test]
    fn weighted_mean_across_impact_types() {
        let rows = vec![
            row(ImpactType::TestScore, 80.0, Some(80.0)),
            row(ImpactType::PeerFeedback, 60.0, Some(60.0)),
            row(ImpactType::XpGain, 120.0, None),
        ];
        let score = consolidate(Uuid::nil(), Uuid::nil(), 90, &rows, &ImpactWeights::default());
        // (80 * 1.5 + 60 * 1.25) / (1.5 + 1.25)
        let expected = (80.0 * 1.5 + 60.0 * 1.25) / 2.75;
        let got = score.consolidated_score.unwrap();
        assert!((got - expected).abs() < 1e-9, "got {got}, expected {expected}");
        assert_eq!(score.total_events, 3);
    }

    #[test]
    fn falls_back_to_impact_value_for_assessment_types() {
        let rows = vec![row(ImpactType::ManagerFeedback, 90.0, None)];
        let score = consolidate(Uuid::nil(), Uuid::nil(), 90, &rows, &ImpactWeights::default());
        assert_eq!(score.consolidated_score, Some(90.0));
    }

    #[test]
    fn consolidation_is_deterministic() {
        let rows = vec![
            row(ImpactType::TestScore, 70.0, Some(70.0)),
            row(ImpactType::SelfAssessment, 50.0, Some(50.0)),
            row(ImpactType::XpGain, 40.0, Some(95.0)),
        ];
        let weights = ImpactWeights::default();
        let a = consolidate(Uuid::nil(), Uuid::nil(), 30, &rows, &weights);
        let b = consolidate(Uuid::nil(), Uuid::nil(), 30, &rows, &weights);
        assert_eq!(a, b);
    }

    #[test]
    fn avg_score_per_group_averages_all_rows() {
        let rows = vec![
            row(ImpactType::TestScore, 100.0, Some(100.0)),
            row(ImpactType::TestScore, 50.0, Some(50.0)),
        ];
        let score = consolidate(Uuid::nil(), Uuid::nil(), 90, &rows, &ImpactWeights::default());
        assert_eq!(score.breakdown[0].avg_score, Some(75.0));
        assert_eq!(score.consolidated_score, Some(75.0));
    }
}
