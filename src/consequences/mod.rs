//! Assessment consequences: suggested follow-ups derived from assessment and
//! feedback results.
//!
//! Generation is best-effort and runs detached from the triggering
//! submission: a failure or timeout here is logged and can never fail or roll
//! back the assessment that was already committed.

pub mod types;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::prelude::*;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::events::types::SourceType;
use crate::goals::types::{DevelopmentGoalRecord, GoalPriority, GoalStatus, PlanStatus};
use crate::shared::schema::{assessment_consequences, development_goals, development_plans};
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

pub use types::{
    AssessmentConsequenceRecord, ConsequenceStatus, ConsequenceType, GenerateConsequencesRequest,
    ListConsequencesQuery,
};

#[derive(Debug, thiserror::Error)]
pub enum ConsequencesError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(String),
}

impl IntoResponse for ConsequencesError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Pure rule stage: decides which follow-ups an assessment result warrants.
/// Weak results recommend a practice test per affected skill; feedback rounds
/// invite a follow-up request; solid results with skills attached suggest
/// turning them into a development goal.
pub fn build_consequences(req: &GenerateConsequencesRequest) -> Vec<AssessmentConsequenceRecord> {
    let now = Utc::now();
    let mut rows = Vec::new();

    let row = |consequence_type: ConsequenceType,
               target_type: SourceType,
               title: String,
               priority: &str,
               skills: Vec<Uuid>| AssessmentConsequenceRecord {
        id: Uuid::new_v4(),
        org_id: req.organization_id,
        user_id: req.user_id,
        consequence_type: consequence_type.to_str().to_string(),
        target_type: target_type.to_str().to_string(),
        target_id: Some(req.assessment_id.clone()),
        title,
        priority: priority.to_string(),
        skill_ids: skills.into_iter().map(Some).collect(),
        status: ConsequenceStatus::Pending.to_str().to_string(),
        resolved_at: None,
        created_at: now,
    };

    if let Some(score) = req.score {
        if score < 60.0 {
            let priority = if score < 40.0 { "high" } else { "medium" };
            if req.skill_ids.is_empty() {
                rows.push(row(
                    ConsequenceType::RecommendedTest,
                    SourceType::CognitiveTest,
                    "Practice test recommended after a weak result".to_string(),
                    priority,
                    Vec::new(),
                ));
            } else {
                for skill in &req.skill_ids {
                    rows.push(row(
                        ConsequenceType::RecommendedTest,
                        SourceType::CognitiveTest,
                        "Practice test recommended to reinforce this skill".to_string(),
                        priority,
                        vec![*skill],
                    ));
                }
            }
        } else if !req.skill_ids.is_empty() {
            rows.push(row(
                ConsequenceType::PdiGoal,
                SourceType::PdiGoal,
                "Turn this result into a development goal".to_string(),
                "low",
                req.skill_ids.clone(),
            ));
        }
    }

    if req.assessment_type == SourceType::Feedback360 {
        rows.push(row(
            ConsequenceType::FeedbackRequest,
            SourceType::Feedback360,
            "Request follow-up feedback on recent progress".to_string(),
            "medium",
            req.skill_ids.clone(),
        ));
    }

    rows
}

pub struct ConsequenceEngine {
    db: DbPool,
}

impl ConsequenceEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn generate(
        &self,
        req: GenerateConsequencesRequest,
    ) -> Result<Vec<AssessmentConsequenceRecord>, ConsequencesError> {
        let rows = build_consequences(&req);
        if rows.is_empty() {
            return Ok(rows);
        }

        let pool = self.db.clone();
        let insert = rows.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| ConsequencesError::Database(e.to_string()))?;
            diesel::insert_into(assessment_consequences::table)
                .values(&insert)
                .execute(&mut conn)
                .map_err(|e| ConsequencesError::Database(e.to_string()))?;
            Ok::<_, ConsequencesError>(())
        })
        .await
        .map_err(|e| ConsequencesError::Database(e.to_string()))??;

        info!(
            "Generated {} consequences for user {} from {}",
            rows.len(),
            req.user_id,
            req.assessment_id
        );
        Ok(rows)
    }

    fn transition(
        conn: &mut PgConnection,
        consequence_id: Uuid,
        to: ConsequenceStatus,
    ) -> Result<AssessmentConsequenceRecord, ConsequencesError> {
        let updated = diesel::update(
            assessment_consequences::table
                .filter(assessment_consequences::id.eq(consequence_id))
                .filter(assessment_consequences::status.eq(ConsequenceStatus::Pending.to_str())),
        )
        .set((
            assessment_consequences::status.eq(to.to_str()),
            assessment_consequences::resolved_at.eq(Utc::now()),
        ))
        .get_result::<AssessmentConsequenceRecord>(conn)
        .optional()
        .map_err(|e| ConsequencesError::Database(e.to_string()))?;

        match updated {
            Some(record) => Ok(record),
            None => {
                let exists = assessment_consequences::table
                    .find(consequence_id)
                    .first::<AssessmentConsequenceRecord>(conn)
                    .optional()
                    .map_err(|e| ConsequencesError::Database(e.to_string()))?;
                match exists {
                    // Terminal states are one-way; re-resolving is a conflict.
                    Some(_) => Err(ConsequencesError::Conflict(
                        "Consequence already resolved".to_string(),
                    )),
                    None => Err(ConsequencesError::NotFound(
                        "Consequence not found".to_string(),
                    )),
                }
            }
        }
    }
}

/// Detached generation with its own deadline, decoupled from the caller's
/// request. Errors and timeouts are logged and swallowed.
pub fn generate_detached(db: DbPool, timeout_secs: u64, req: GenerateConsequencesRequest) {
    tokio::spawn(async move {
        let engine = ConsequenceEngine::new(db);
        let user_id = req.user_id;
        match tokio::time::timeout(Duration::from_secs(timeout_secs), engine.generate(req)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Consequence generation failed for user {}: {}", user_id, e),
            Err(_) => warn!(
                "Consequence generation timed out for user {} after {}s",
                user_id, timeout_secs
            ),
        }
    });
}

// ----- HTTP surface -----

/// Direct generation, mirroring the `generate_assessment_consequences` call
/// contract. Synchronous variant used by admin tooling; the pipeline path
/// goes through `generate_detached`.
pub async fn generate_consequences(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateConsequencesRequest>,
) -> Result<Json<Vec<AssessmentConsequenceRecord>>, ConsequencesError> {
    let engine = ConsequenceEngine::new(state.conn.clone());
    Ok(Json(engine.generate(req).await?))
}

pub async fn list_consequences(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListConsequencesQuery>,
) -> Result<Json<Vec<AssessmentConsequenceRecord>>, ConsequencesError> {
    let pool = state.conn.clone();

    let result = tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| ConsequencesError::Database(e.to_string()))?;

        let mut db_query = assessment_consequences::table
            .filter(assessment_consequences::user_id.eq(query.user_id))
            .into_boxed();
        if let Some(status) = query.status {
            db_query = db_query.filter(assessment_consequences::status.eq(status));
        }

        db_query
            .order(assessment_consequences::created_at.desc())
            .load::<AssessmentConsequenceRecord>(&mut conn)
            .map_err(|e| ConsequencesError::Database(e.to_string()))
    })
    .await
    .map_err(|e| ConsequencesError::Database(e.to_string()))??;

    Ok(Json(result))
}

/// Accepting a PDI-goal suggestion also drops a ready-made goal into the
/// user's active plan, when one exists. That follow-on is best-effort.
pub async fn accept_consequence(
    State(state): State<Arc<AppState>>,
    Path(consequence_id): Path<Uuid>,
) -> Result<Json<AssessmentConsequenceRecord>, ConsequencesError> {
    let pool = state.conn.clone();

    let result = tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| ConsequencesError::Database(e.to_string()))?;
        let record = ConsequenceEngine::transition(
            &mut conn,
            consequence_id,
            ConsequenceStatus::Accepted,
        )?;

        if ConsequenceType::from_str(&record.consequence_type) == Some(ConsequenceType::PdiGoal) {
            if let Err(e) = materialize_goal(&mut conn, &record) {
                warn!(
                    "Accepted consequence {} but could not create goal: {}",
                    record.id, e
                );
            }
        }

        Ok::<_, ConsequencesError>(record)
    })
    .await
    .map_err(|e| ConsequencesError::Database(e.to_string()))??;

    info!("Consequence {} accepted", result.id);
    Ok(Json(result))
}

pub async fn dismiss_consequence(
    State(state): State<Arc<AppState>>,
    Path(consequence_id): Path<Uuid>,
) -> Result<Json<AssessmentConsequenceRecord>, ConsequencesError> {
    let pool = state.conn.clone();

    let result = tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| ConsequencesError::Database(e.to_string()))?;
        ConsequenceEngine::transition(&mut conn, consequence_id, ConsequenceStatus::Dismissed)
    })
    .await
    .map_err(|e| ConsequencesError::Database(e.to_string()))??;

    Ok(Json(result))
}

fn materialize_goal(
    conn: &mut PgConnection,
    consequence: &AssessmentConsequenceRecord,
) -> Result<(), String> {
    let plan = development_plans::table
        .filter(development_plans::user_id.eq(consequence.user_id))
        .filter(development_plans::status.eq(PlanStatus::Active.to_str()))
        .order(development_plans::created_at.desc())
        .first::<crate::goals::types::DevelopmentPlanRecord>(conn)
        .optional()
        .map_err(|e| e.to_string())?;

    let Some(plan) = plan else {
        return Err("user has no active development plan".to_string());
    };

    let now = Utc::now();
    let goal = DevelopmentGoalRecord {
        id: Uuid::new_v4(),
        plan_id: plan.id,
        skill_id: consequence.skill_ids.iter().flatten().next().copied(),
        title: consequence.title.clone(),
        target_date: None,
        priority: GoalPriority::Medium.to_str().to_string(),
        status: GoalStatus::NotStarted.to_str().to_string(),
        progress: BigDecimal::from(0),
        linked_training_ids: Vec::new(),
        linked_challenge_ids: Vec::new(),
        linked_cognitive_test_ids: Vec::new(),
        related_games: Vec::new(),
        auto_progress_enabled: true,
        xp_reward: 100,
        weight: BigDecimal::from(1),
        last_auto_update: None,
        stagnant_since: None,
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(development_goals::table)
        .values(&goal)
        .execute(conn)
        .map_err(|e| e.to_string())?;
    Ok(())
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/consequences",
            get(list_consequences).post(generate_consequences),
        )
        .route("/api/consequences/:id/accept", post(accept_consequence))
        .route("/api/consequences/:id/dismiss", post(dismiss_consequence))
}
