//! Development-plan (PDI) goals and the auto-progress engine.
//!
//! Completions flowing through event ingest are matched against active goals
//! (explicit links first, skill overlap second) and advance their progress.
//! The increment-and-clamp happens in a single conditional SQL statement so
//! two concurrent events can never push a goal past 100 or lose an update.

pub mod types;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};
use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::{Numeric, Uuid as SqlUuid};
use log::{info, warn};
use std::sync::Arc;
use uuid::Uuid;

use crate::events::types::ActivityEvent;
use crate::rewards;
use crate::shared::schema::{
    development_goals, development_plans, goal_progress_events, pdi_linked_actions,
    skill_impact_events,
};
use crate::skills::types::{ImpactType, SkillImpactRecord};
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

pub use types::{
    AppliedProgress, CheckinRequest, CreateGoalRequest, CreateLinkedActionRequest,
    CreatePlanRequest, DevelopmentGoal, DevelopmentGoalRecord, DevelopmentPlanRecord,
    GoalImpactConfig, GoalPriority, GoalProgressEventRecord, GoalStatus, GoalUpdateResult,
    ListPlansQuery, MatchReason, PdiLinkedActionRecord, PlanStatus, PlanWithGoals, SourceImpact,
    record_to_goal,
};

#[derive(Debug, thiserror::Error)]
pub enum GoalsError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(String),
}

impl IntoResponse for GoalsError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Whether (and why) an event advances a goal. Link-based matches win the
/// reason label over skill overlap; one update per (goal, event) pair either
/// way.
pub fn match_goal(goal: &DevelopmentGoal, event: &ActivityEvent) -> Option<MatchReason> {
    use crate::events::types::SourceType;

    let link_match = match event.source_type {
        SourceType::Training => goal
            .linked_training_ids
            .iter()
            .any(|id| id == &event.source_id)
            .then_some(MatchReason::LinkedTraining),
        SourceType::Challenge => goal
            .linked_challenge_ids
            .iter()
            .any(|id| id == &event.source_id)
            .then_some(MatchReason::LinkedChallenge),
        SourceType::CognitiveTest => goal
            .linked_cognitive_test_ids
            .iter()
            .any(|id| id == &event.source_id)
            .then_some(MatchReason::LinkedTest),
        SourceType::Game => goal
            .related_games
            .iter()
            .any(|key| key == &event.source_id)
            .then_some(MatchReason::RelatedGame),
        _ => None,
    };
    if link_match.is_some() {
        return link_match;
    }

    let skill_match = goal
        .skill_id
        .map(|skill| event.skill_ids.contains(&skill))
        .unwrap_or(false);
    skill_match.then_some(MatchReason::SkillOverlap)
}

/// `min(base * score_multiplier, max)` with the multiplier capped at 1.5.
/// Deltas stay fractional; only XP gets rounded.
pub fn compute_delta(impact: types::SourceImpact, score: Option<f64>) -> f64 {
    let multiplier = score.map(|s| (s / 100.0).min(1.5)).unwrap_or(1.0);
    (impact.base * multiplier).min(impact.max)
}

pub fn compute_xp(actual_delta: f64, xp_reward: i32) -> i64 {
    ((actual_delta / 100.0) * xp_reward as f64).round() as i64
}

#[derive(QueryableByName)]
struct ProgressRow {
    #[diesel(sql_type = Numeric)]
    progress_before: BigDecimal,
    #[diesel(sql_type = Numeric)]
    progress_after: BigDecimal,
}

/// Atomic increment-and-clamp. The previous value is captured `FOR UPDATE`
/// inside the same statement, so concurrent callers serialize on the row and
/// each sees the base the other left behind. `None` means the goal was already
/// at 100 (or gone) when the statement ran; callers treat that as a benign
/// skip.
fn apply_progress(
    conn: &mut PgConnection,
    goal_id: Uuid,
    delta: f64,
) -> QueryResult<Option<(f64, f64)>> {
    let delta = BigDecimal::from_f64(delta).unwrap_or_else(|| BigDecimal::from(0));

    let row = diesel::sql_query(
        "UPDATE development_goals AS g \
         SET progress = LEAST(g.progress + $1, 100), \
             status = CASE WHEN g.progress + $1 >= 100 THEN 'completed' ELSE 'in_progress' END, \
             stagnant_since = NULL, \
             last_auto_update = NOW(), \
             updated_at = NOW() \
         FROM (SELECT id, progress AS progress_before FROM development_goals \
               WHERE id = $2 AND progress < 100 FOR UPDATE) prev \
         WHERE g.id = prev.id \
         RETURNING prev.progress_before AS progress_before, g.progress AS progress_after",
    )
    .bind::<Numeric, _>(delta)
    .bind::<SqlUuid, _>(goal_id)
    .get_result::<ProgressRow>(conn)
    .optional()?;

    Ok(row.map(|r| {
        (
            r.progress_before.to_f64().unwrap_or(0.0),
            r.progress_after.to_f64().unwrap_or(0.0),
        )
    }))
}

pub struct GoalEngine {
    db: DbPool,
    impact: GoalImpactConfig,
}

impl GoalEngine {
    pub fn new(db: DbPool, impact: GoalImpactConfig) -> Self {
        Self { db, impact }
    }

    /// Runs one event against every eligible goal of the user. Each goal is an
    /// independent unit of work: a failure lands in that goal's result and the
    /// rest of the batch proceeds. XP from all updated goals is credited as a
    /// single `pdi_progress_auto` ledger entry.
    pub async fn apply_event(&self, event: &ActivityEvent) -> Result<AppliedProgress, GoalsError> {
        let pool = self.db.clone();
        let impact = self.impact.clone();
        let event = event.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| GoalsError::Database(e.to_string()))?;

            let records: Vec<DevelopmentGoalRecord> = development_goals::table
                .inner_join(development_plans::table)
                .filter(development_plans::user_id.eq(event.user_id))
                .filter(development_plans::status.eq(PlanStatus::Active.to_str()))
                .filter(development_goals::auto_progress_enabled.eq(true))
                .filter(development_goals::status.ne(GoalStatus::Completed.to_str()))
                .select(DevelopmentGoalRecord::as_select())
                .load(&mut conn)
                .map_err(|e| GoalsError::Database(e.to_string()))?;

            let mut updates = Vec::new();
            let mut xp_total: i64 = 0;

            for record in records {
                let goal = record_to_goal(record);
                let Some(reason) = match_goal(&goal, &event) else {
                    continue;
                };
                let Some(source_impact) = impact.impact_for(event.source_type) else {
                    continue;
                };
                let delta = compute_delta(source_impact, event.score);
                if delta <= 0.0 {
                    continue;
                }

                match apply_progress(&mut conn, goal.id, delta) {
                    Ok(Some((before, after))) => {
                        let actual_delta = after - before;
                        let xp_earned = compute_xp(actual_delta, goal.xp_reward);
                        let completed = after >= 100.0;

                        let audit = GoalProgressEventRecord {
                            id: Uuid::new_v4(),
                            goal_id: goal.id,
                            user_id: event.user_id,
                            source_type: event.source_type.to_str().to_string(),
                            source_id: Some(event.source_id.clone()),
                            source_name: None,
                            progress_before: BigDecimal::from_f64(before)
                                .unwrap_or_else(|| BigDecimal::from(0)),
                            progress_after: BigDecimal::from_f64(after)
                                .unwrap_or_else(|| BigDecimal::from(0)),
                            progress_delta: BigDecimal::from_f64(actual_delta)
                                .unwrap_or_else(|| BigDecimal::from(0)),
                            xp_earned: xp_earned as i32,
                            metadata: serde_json::json!({
                                "match_reason": reason.to_str(),
                                "score": event.score,
                                "event_type": event.event_type,
                                "event_id": event.id,
                            }),
                            created_at: Utc::now(),
                        };

                        let mut error = None;
                        if let Err(e) = diesel::insert_into(goal_progress_events::table)
                            .values(&audit)
                            .execute(&mut conn)
                        {
                            warn!("Failed to record progress audit for goal {}: {}", goal.id, e);
                            error = Some(format!("audit write failed: {e}"));
                        }

                        // Best-effort: linkage completion never rolls back the
                        // progress already committed.
                        if let Err(e) = diesel::update(
                            pdi_linked_actions::table
                                .filter(pdi_linked_actions::goal_id.eq(goal.id))
                                .filter(
                                    pdi_linked_actions::action_type
                                        .eq(event.source_type.to_str()),
                                )
                                .filter(pdi_linked_actions::action_id.eq(&event.source_id))
                                .filter(pdi_linked_actions::status.ne("completed")),
                        )
                        .set((
                            pdi_linked_actions::status.eq("completed"),
                            pdi_linked_actions::completed_at.eq(Utc::now()),
                        ))
                        .execute(&mut conn)
                        {
                            warn!("Failed to complete linked actions for goal {}: {}", goal.id, e);
                        }

                        // A completed goal on a tracked skill is itself an
                        // assessment-grade signal for that skill.
                        if completed {
                            if let Some(skill_id) = goal.skill_id {
                                let impact = SkillImpactRecord {
                                    id: Uuid::new_v4(),
                                    org_id: event.organization_id,
                                    user_id: event.user_id,
                                    skill_id,
                                    source_type: "pdi_goal".to_string(),
                                    source_id: Some(goal.id.to_string()),
                                    impact_type: ImpactType::GoalCompletion.to_str().to_string(),
                                    impact_value: 100.0,
                                    normalized_score: Some(100.0),
                                    metadata: serde_json::json!({
                                        "goal_title": goal.title,
                                        "event_id": event.id,
                                    }),
                                    created_at: Utc::now(),
                                };
                                if let Err(e) = diesel::insert_into(skill_impact_events::table)
                                    .values(&impact)
                                    .execute(&mut conn)
                                {
                                    warn!(
                                        "Failed to record completion impact for goal {}: {}",
                                        goal.id, e
                                    );
                                }
                            }
                        }

                        xp_total += xp_earned;
                        updates.push(GoalUpdateResult {
                            goal_id: goal.id,
                            goal_title: goal.title.clone(),
                            match_reason: reason,
                            progress_before: before,
                            progress_after: after,
                            progress_delta: actual_delta,
                            xp_earned,
                            completed,
                            error,
                        });
                    }
                    // Raced to 100 between the load and the update: benign skip.
                    Ok(None) => {}
                    Err(e) => {
                        updates.push(GoalUpdateResult {
                            goal_id: goal.id,
                            goal_title: goal.title.clone(),
                            match_reason: reason,
                            progress_before: goal.progress,
                            progress_after: goal.progress,
                            progress_delta: 0.0,
                            xp_earned: 0,
                            completed: false,
                            error: Some(e.to_string()),
                        });
                    }
                }
            }

            if xp_total > 0 {
                rewards::credit_balance(
                    &mut conn,
                    event.user_id,
                    event.organization_id,
                    xp_total,
                    0,
                    "pdi_progress_auto",
                    Some(event.source_type.to_str()),
                    Some(&event.source_id),
                    serde_json::json!({
                        "event_id": event.id,
                        "goals_updated": updates.iter().filter(|u| u.error.is_none()).count(),
                    }),
                )
                .map_err(|e| GoalsError::Database(e.to_string()))?;
            }

            Ok::<_, GoalsError>(AppliedProgress {
                updates,
                xp_credited: xp_total,
            })
        })
        .await
        .map_err(|e| GoalsError::Database(e.to_string()))?
    }
}

// ----- HTTP surface -----

pub async fn create_plan(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePlanRequest>,
) -> Result<Json<DevelopmentPlanRecord>, GoalsError> {
    if req.title.trim().is_empty() {
        return Err(GoalsError::Validation("title must not be empty".to_string()));
    }

    let now = Utc::now();
    let record = DevelopmentPlanRecord {
        id: Uuid::new_v4(),
        org_id: req.organization_id,
        user_id: req.user_id,
        title: req.title,
        status: PlanStatus::Active.to_str().to_string(),
        created_at: now,
        updated_at: now,
    };
    let insert = record.clone();

    let pool = state.conn.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| GoalsError::Database(e.to_string()))?;
        diesel::insert_into(development_plans::table)
            .values(&insert)
            .execute(&mut conn)
            .map_err(|e| GoalsError::Database(e.to_string()))?;
        Ok::<_, GoalsError>(())
    })
    .await
    .map_err(|e| GoalsError::Database(e.to_string()))??;

    info!("Created development plan {} for user {}", record.id, record.user_id);
    Ok(Json(record))
}

pub async fn list_plans(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListPlansQuery>,
) -> Result<Json<Vec<PlanWithGoals>>, GoalsError> {
    let pool = state.conn.clone();

    let result = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| GoalsError::Database(e.to_string()))?;

        let plans: Vec<DevelopmentPlanRecord> = development_plans::table
            .filter(development_plans::user_id.eq(query.user_id))
            .order(development_plans::created_at.desc())
            .load(&mut conn)
            .map_err(|e| GoalsError::Database(e.to_string()))?;

        let plan_ids: Vec<Uuid> = plans.iter().map(|p| p.id).collect();
        let goals: Vec<DevelopmentGoalRecord> = development_goals::table
            .filter(development_goals::plan_id.eq_any(&plan_ids))
            .order(development_goals::created_at.asc())
            .load(&mut conn)
            .map_err(|e| GoalsError::Database(e.to_string()))?;

        let result: Vec<PlanWithGoals> = plans
            .into_iter()
            .map(|plan| {
                let plan_goals = goals
                    .iter()
                    .filter(|g| g.plan_id == plan.id)
                    .cloned()
                    .map(record_to_goal)
                    .collect();
                PlanWithGoals {
                    plan,
                    goals: plan_goals,
                }
            })
            .collect();
        Ok::<_, GoalsError>(result)
    })
    .await
    .map_err(|e| GoalsError::Database(e.to_string()))??;

    Ok(Json(result))
}

pub async fn create_goal(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGoalRequest>,
) -> Result<Json<DevelopmentGoal>, GoalsError> {
    if req.title.trim().is_empty() {
        return Err(GoalsError::Validation("title must not be empty".to_string()));
    }
    if req.xp_reward.map(|xp| xp < 0).unwrap_or(false) {
        return Err(GoalsError::Validation("xp_reward must be non-negative".to_string()));
    }

    let now = Utc::now();
    let record = DevelopmentGoalRecord {
        id: Uuid::new_v4(),
        plan_id: req.plan_id,
        skill_id: req.skill_id,
        title: req.title,
        target_date: req.target_date,
        priority: req.priority.unwrap_or(GoalPriority::Medium).to_str().to_string(),
        status: GoalStatus::NotStarted.to_str().to_string(),
        progress: BigDecimal::from(0),
        linked_training_ids: req.linked_training_ids.into_iter().map(Some).collect(),
        linked_challenge_ids: req.linked_challenge_ids.into_iter().map(Some).collect(),
        linked_cognitive_test_ids: req
            .linked_cognitive_test_ids
            .into_iter()
            .map(Some)
            .collect(),
        related_games: req.related_games.into_iter().map(Some).collect(),
        auto_progress_enabled: req.auto_progress_enabled.unwrap_or(true),
        xp_reward: req.xp_reward.unwrap_or(100),
        weight: BigDecimal::from_f64(req.weight.unwrap_or(1.0))
            .unwrap_or_else(|| BigDecimal::from(1)),
        last_auto_update: None,
        stagnant_since: None,
        created_at: now,
        updated_at: now,
    };
    let insert = record.clone();

    let pool = state.conn.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| GoalsError::Database(e.to_string()))?;

        let plan_exists = development_plans::table
            .find(insert.plan_id)
            .first::<DevelopmentPlanRecord>(&mut conn)
            .optional()
            .map_err(|e| GoalsError::Database(e.to_string()))?
            .is_some();
        if !plan_exists {
            return Err(GoalsError::NotFound("Plan not found".to_string()));
        }

        diesel::insert_into(development_goals::table)
            .values(&insert)
            .execute(&mut conn)
            .map_err(|e| GoalsError::Database(e.to_string()))?;
        Ok::<_, GoalsError>(())
    })
    .await
    .map_err(|e| GoalsError::Database(e.to_string()))??;

    info!("Created goal {} in plan {}", record.id, record.plan_id);
    Ok(Json(record_to_goal(record)))
}

/// Manual check-in: same atomic increment as auto-progress, audited the same
/// way, but no XP (the ledger only pays for pipeline-driven movement).
pub async fn goal_checkin(
    State(state): State<Arc<AppState>>,
    Path(goal_id): Path<Uuid>,
    Json(req): Json<CheckinRequest>,
) -> Result<Json<GoalProgressEventRecord>, GoalsError> {
    if req.progress_delta <= 0.0 || req.progress_delta > 100.0 {
        return Err(GoalsError::Validation(
            "progress_delta must be in (0, 100]".to_string(),
        ));
    }

    let pool = state.conn.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| GoalsError::Database(e.to_string()))?;

        let Some((before, after)) = apply_progress(&mut conn, goal_id, req.progress_delta)
            .map_err(|e| GoalsError::Database(e.to_string()))?
        else {
            return Err(GoalsError::Conflict(
                "Goal not found or already completed".to_string(),
            ));
        };

        let audit = GoalProgressEventRecord {
            id: Uuid::new_v4(),
            goal_id,
            user_id: req.user_id,
            source_type: "pdi_goal".to_string(),
            source_id: None,
            source_name: None,
            progress_before: BigDecimal::from_f64(before).unwrap_or_else(|| BigDecimal::from(0)),
            progress_after: BigDecimal::from_f64(after).unwrap_or_else(|| BigDecimal::from(0)),
            progress_delta: BigDecimal::from_f64(after - before)
                .unwrap_or_else(|| BigDecimal::from(0)),
            xp_earned: 0,
            metadata: serde_json::json!({ "manual": true, "note": req.note }),
            created_at: Utc::now(),
        };
        diesel::insert_into(goal_progress_events::table)
            .values(&audit)
            .execute(&mut conn)
            .map_err(|e| GoalsError::Database(e.to_string()))?;

        Ok::<_, GoalsError>(audit)
    })
    .await
    .map_err(|e| GoalsError::Database(e.to_string()))??;

    Ok(Json(result))
}

pub async fn goal_history(
    State(state): State<Arc<AppState>>,
    Path(goal_id): Path<Uuid>,
) -> Result<Json<Vec<GoalProgressEventRecord>>, GoalsError> {
    let pool = state.conn.clone();

    let result = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| GoalsError::Database(e.to_string()))?;
        goal_progress_events::table
            .filter(goal_progress_events::goal_id.eq(goal_id))
            .order(goal_progress_events::created_at.desc())
            .load::<GoalProgressEventRecord>(&mut conn)
            .map_err(|e| GoalsError::Database(e.to_string()))
    })
    .await
    .map_err(|e| GoalsError::Database(e.to_string()))??;

    Ok(Json(result))
}

pub async fn create_linked_action(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateLinkedActionRequest>,
) -> Result<Json<PdiLinkedActionRecord>, GoalsError> {
    let record = PdiLinkedActionRecord {
        id: Uuid::new_v4(),
        goal_id: req.goal_id,
        user_id: req.user_id,
        action_type: req.action_type.to_str().to_string(),
        action_id: req.action_id,
        status: "pending".to_string(),
        completed_at: None,
        created_at: Utc::now(),
    };
    let insert = record.clone();

    let pool = state.conn.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| GoalsError::Database(e.to_string()))?;
        diesel::insert_into(pdi_linked_actions::table)
            .values(&insert)
            .execute(&mut conn)
            .map_err(|e| GoalsError::Database(e.to_string()))?;
        Ok::<_, GoalsError>(())
    })
    .await
    .map_err(|e| GoalsError::Database(e.to_string()))??;

    Ok(Json(record))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/pdi/plans", get(list_plans).post(create_plan))
        .route("/api/pdi/goals", post(create_goal))
        .route("/api/pdi/goals/:id/checkin", post(goal_checkin))
        .route("/api/pdi/goals/:id/history", get(goal_history))
        .route("/api/pdi/actions", post(create_linked_action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{EventType, SourceType};

    fn goal() -> DevelopmentGoal {
        record_to_goal(DevelopmentGoalRecord {
            id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            skill_id: None,
            title: "Improve SQL".to_string(),
            target_date: None,
            priority: "medium".to_string(),
            status: "in_progress".to_string(),
            progress: BigDecimal::from(60),
            linked_training_ids: vec![],
            linked_challenge_ids: vec![],
            linked_cognitive_test_ids: vec![],
            related_games: vec![],
            auto_progress_enabled: true,
            xp_reward: 200,
            weight: BigDecimal::from(1),
            last_auto_update: None,
            stagnant_since: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
    }

    fn event(source_type: SourceType, source_id: &str) -> ActivityEvent {
        ActivityEvent {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            organization_id: None,
            event_type: EventType::TrainingCompleted,
            source_type,
            source_id: source_id.to_string(),
            score: Some(90.0),
            skill_ids: vec![],
            relationship: None,
            performance: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn link_match_takes_priority_over_skill_overlap() {
        let skill = Uuid::new_v4();
        let mut g = goal();
        g.skill_id = Some(skill);
        g.linked_training_ids = vec!["T1".to_string()];

        let mut e = event(SourceType::Training, "T1");
        e.skill_ids = vec![skill];

        assert_eq!(match_goal(&g, &e), Some(MatchReason::LinkedTraining));
    }

    #[test]
    fn skill_overlap_matches_when_no_link() {
        let skill = Uuid::new_v4();
        let mut g = goal();
        g.skill_id = Some(skill);

        let mut e = event(SourceType::Module, "M9");
        e.skill_ids = vec![skill];

        assert_eq!(match_goal(&g, &e), Some(MatchReason::SkillOverlap));
    }

    #[test]
    fn unrelated_event_does_not_match() {
        let g = goal();
        let e = event(SourceType::Training, "T2");
        assert_eq!(match_goal(&g, &e), None);
    }

    #[test]
    fn game_matches_by_game_type_key() {
        let mut g = goal();
        g.related_games = vec!["memory_match".to_string()];
        let e = event(SourceType::Game, "memory_match");
        assert_eq!(match_goal(&g, &e), Some(MatchReason::RelatedGame));
    }

    #[test]
    fn delta_scales_with_score_and_respects_cap() {
        let training = SourceImpact { base: 25.0, max: 40.0 };
        // score 90 => multiplier 0.9 => 22.5
        assert_eq!(compute_delta(training, Some(90.0)), 22.5);
        // score 200 => multiplier capped at 1.5 => 37.5
        assert_eq!(compute_delta(training, Some(200.0)), 37.5);
        // no score => multiplier 1
        assert_eq!(compute_delta(training, None), 25.0);
        // hard cap binds when base * 1.5 exceeds it
        let wide = SourceImpact { base: 30.0, max: 40.0 };
        assert_eq!(compute_delta(wide, Some(150.0)), 40.0);
        // zero score => zero delta
        assert_eq!(compute_delta(training, Some(0.0)), 0.0);
    }

    #[test]
    fn xp_is_proportional_and_rounded() {
        assert_eq!(compute_xp(22.5, 200), 45);
        assert_eq!(compute_xp(100.0, 200), 200);
        assert_eq!(compute_xp(10.5, 100), 11);
        assert_eq!(compute_xp(0.0, 200), 0);
    }

    #[test]
    fn non_progress_sources_have_no_impact() {
        let config = GoalImpactConfig::default();
        assert!(config.impact_for(SourceType::Feedback360).is_none());
        assert!(config.impact_for(SourceType::OneOnOne).is_none());
        assert!(config.impact_for(SourceType::PdiGoal).is_none());
        assert!(config.impact_for(SourceType::Training).is_some());
    }
}
