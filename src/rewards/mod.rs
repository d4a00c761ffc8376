//! Reward settlement: turns one activity completion into an XP/coin credit.
//!
//! The reward shape (base values, difficulty multipliers, time/streak bonuses,
//! participation floors) is admin-configured per activity and stored as a Jsonb
//! blob; it is parsed into [`GameRewardConfig`] at the boundary so malformed
//! config fails closed instead of silently defaulting.

pub mod types;

use axum::{
    extract::{Path, Query, State},
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

use crate::events::types::SourceType;
use crate::shared::schema::{balance_transactions, reward_configs, user_balances};
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

pub use types::{
    BalanceTransactionRecord, Difficulty, GameRewardConfig, PreviewRewardRequest,
    RewardConfigRecord, RewardOutcome, RewardPerformance, SettleRewardRequest,
    UpsertRewardConfigRequest, UserBalanceRecord,
};

#[derive(Debug, thiserror::Error)]
pub enum RewardsError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Database error: {0}")]
    Database(String),
}

impl IntoResponse for RewardsError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Configuration(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            Self::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Pure reward formula. Configuration is assumed validated; this never touches
/// the store.
pub fn compute_reward(config: &GameRewardConfig, performance: &RewardPerformance) -> RewardOutcome {
    // A configured target that was not met pays only the participation floor.
    // An absent score counts as not meeting the target.
    let met_target = match config.target_score {
        Some(target) => performance.score.map(|s| s >= target).unwrap_or(false),
        None => true,
    };

    if !met_target {
        return RewardOutcome {
            xp: config.participation_xp,
            coins: config.participation_coins,
            met_target: false,
            participation_only: true,
            difficulty_multiplier: 0.0,
            time_bonus_percent: 0.0,
            streak_bonus_percent: 0.0,
            total_multiplier: 0.0,
        };
    }

    let difficulty_multiplier = performance
        .difficulty
        .map(|d| config.difficulty_multipliers.for_difficulty(d))
        .unwrap_or(1.0);

    let time_bonus_percent = if config.time_bonus_config.enabled {
        compute_time_bonus(
            config.time_bonus_config.max_bonus_percent,
            performance.completion_time_ratio,
        )
    } else {
        0.0
    };

    let streak_bonus_percent = if config.streak_bonus_config.enabled {
        let raw = config.streak_bonus_config.bonus_per_day * performance.streak_days.max(0);
        raw.min(config.streak_bonus_config.max_bonus) as f64
    } else {
        0.0
    };

    let total_multiplier =
        difficulty_multiplier * (1.0 + (time_bonus_percent + streak_bonus_percent) / 100.0);

    RewardOutcome {
        xp: (config.xp_base_reward as f64 * total_multiplier).round() as i64,
        coins: (config.coins_base_reward as f64 * total_multiplier).round() as i64,
        met_target: true,
        participation_only: false,
        difficulty_multiplier,
        time_bonus_percent,
        streak_bonus_percent,
        total_multiplier,
    }
}

/// Linear time bonus: full `max_bonus_percent` at ratio 0, nothing at ratio 1
/// or slower. No reported ratio means no bonus.
fn compute_time_bonus(max_bonus_percent: i64, completion_time_ratio: Option<f64>) -> f64 {
    let Some(ratio) = completion_time_ratio else {
        return 0.0;
    };
    let max = max_bonus_percent as f64;
    (max * (1.0 - ratio)).clamp(0.0, max)
}

/// Additive credit against the shared per-user balance plus one ledger row,
/// committed as one transaction. Always `balance + delta`, never an absolute
/// set, so concurrent credits from simultaneous activities cannot clobber each
/// other; balance and ledger move together or not at all.
pub(crate) fn credit_balance(
    conn: &mut PgConnection,
    user_id: Uuid,
    org_id: Option<Uuid>,
    xp_delta: i64,
    coins_delta: i64,
    kind: &str,
    source_type: Option<&str>,
    source_id: Option<&str>,
    metadata: serde_json::Value,
) -> QueryResult<()> {
    let now = Utc::now();
    let tx = BalanceTransactionRecord {
        id: Uuid::new_v4(),
        user_id,
        org_id,
        kind: kind.to_string(),
        xp_delta,
        coins_delta,
        source_type: source_type.map(|s| s.to_string()),
        source_id: source_id.map(|s| s.to_string()),
        metadata,
        created_at: now,
    };

    conn.transaction(|conn| {
        diesel::insert_into(user_balances::table)
            .values((
                user_balances::user_id.eq(user_id),
                user_balances::org_id.eq(org_id),
                user_balances::xp.eq(xp_delta),
                user_balances::coins.eq(coins_delta),
                user_balances::updated_at.eq(now),
            ))
            .on_conflict(user_balances::user_id)
            .do_update()
            .set((
                user_balances::xp.eq(user_balances::xp + xp_delta),
                user_balances::coins.eq(user_balances::coins + coins_delta),
                user_balances::updated_at.eq(now),
            ))
            .execute(conn)?;

        diesel::insert_into(balance_transactions::table)
            .values(&tx)
            .execute(conn)?;

        Ok(())
    })
}

pub struct RewardEngine {
    db: DbPool,
}

impl RewardEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Resolves the most specific active config for (org, source_type,
    /// source_id): exact source beats source-type default, org-scoped beats
    /// global. `None` means the activity is not configured for rewards.
    pub async fn load_config(
        &self,
        org_id: Option<Uuid>,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<Option<GameRewardConfig>, RewardsError> {
        let pool = self.db.clone();
        let source_type = source_type.to_str().to_string();
        let source_id = source_id.to_string();

        let record = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| RewardsError::Database(e.to_string()))?;

            let mut query = reward_configs::table
                .filter(reward_configs::source_type.eq(&source_type))
                .filter(reward_configs::is_active.eq(true))
                .filter(
                    reward_configs::source_id
                        .eq(&source_id)
                        .or(reward_configs::source_id.is_null()),
                )
                .into_boxed();

            query = match org_id {
                Some(org) => query.filter(
                    reward_configs::org_id
                        .eq(org)
                        .or(reward_configs::org_id.is_null()),
                ),
                None => query.filter(reward_configs::org_id.is_null()),
            };

            let candidates = query
                .load::<RewardConfigRecord>(&mut conn)
                .map_err(|e| RewardsError::Database(e.to_string()))?;

            Ok::<_, RewardsError>(candidates.into_iter().max_by_key(|c| {
                (c.source_id.is_some() as u8) * 2 + (c.org_id.is_some() as u8)
            }))
        })
        .await
        .map_err(|e| RewardsError::Database(e.to_string()))??;

        let Some(record) = record else {
            return Ok(None);
        };

        let config: GameRewardConfig = serde_json::from_value(record.config)
            .map_err(|e| RewardsError::Configuration(format!("invalid reward config: {e}")))?;
        config.validate().map_err(RewardsError::Configuration)?;
        Ok(Some(config))
    }

    /// Computes and credits the reward for one completion.
    ///
    /// Must be invoked at most once per (user, source, attempt). Attempt
    /// identity belongs to the caller; this layer has no view into retries and
    /// will credit again if called again.
    pub async fn settle(
        &self,
        user_id: Uuid,
        org_id: Option<Uuid>,
        source_type: SourceType,
        source_id: &str,
        performance: &RewardPerformance,
        attempt_id: Option<String>,
    ) -> Result<Option<RewardOutcome>, RewardsError> {
        let Some(config) = self.load_config(org_id, source_type, source_id).await? else {
            return Ok(None);
        };

        let outcome = compute_reward(&config, performance);

        if outcome.xp != 0 || outcome.coins != 0 {
            let pool = self.db.clone();
            let source_type_str = source_type.to_str();
            let source_id_owned = source_id.to_string();
            let metadata = serde_json::json!({
                "attempt_id": attempt_id,
                "score": performance.score,
                "met_target": outcome.met_target,
                "participation_only": outcome.participation_only,
            });
            let (xp, coins) = (outcome.xp, outcome.coins);

            tokio::task::spawn_blocking(move || {
                let mut conn = pool.get().map_err(|e| RewardsError::Database(e.to_string()))?;
                credit_balance(
                    &mut conn,
                    user_id,
                    org_id,
                    xp,
                    coins,
                    "activity_reward",
                    Some(source_type_str),
                    Some(&source_id_owned),
                    metadata,
                )
                .map_err(|e| RewardsError::Database(e.to_string()))
            })
            .await
            .map_err(|e| RewardsError::Database(e.to_string()))??;
        }

        info!(
            "Settled reward for user {} source {}: {} XP, {} coins",
            user_id, source_id, outcome.xp, outcome.coins
        );
        Ok(Some(outcome))
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<UserBalanceRecord, RewardsError> {
        let pool = self.db.clone();
        let record = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| RewardsError::Database(e.to_string()))?;
            user_balances::table
                .find(user_id)
                .first::<UserBalanceRecord>(&mut conn)
                .optional()
                .map_err(|e| RewardsError::Database(e.to_string()))
        })
        .await
        .map_err(|e| RewardsError::Database(e.to_string()))??;

        Ok(record.unwrap_or(UserBalanceRecord {
            user_id,
            org_id: None,
            xp: 0,
            coins: 0,
            updated_at: Utc::now(),
        }))
    }
}

// ----- HTTP surface -----

/// Dry-run of the reward formula for the configured activity; nothing is
/// credited. Backs the pre-game reward preview card.
pub async fn preview_reward(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PreviewRewardRequest>,
) -> Result<Json<RewardOutcome>, RewardsError> {
    let engine = RewardEngine::new(state.conn.clone());
    let config = engine
        .load_config(req.organization_id, req.source_type, &req.source_id)
        .await?
        .ok_or_else(|| RewardsError::NotFound("no active reward configuration".to_string()))?;
    Ok(Json(compute_reward(&config, &req.performance)))
}

pub async fn settle_reward(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SettleRewardRequest>,
) -> Result<Json<RewardOutcome>, RewardsError> {
    let engine = RewardEngine::new(state.conn.clone());
    engine
        .settle(
            req.user_id,
            req.organization_id,
            req.source_type,
            &req.source_id,
            &req.performance,
            req.attempt_id,
        )
        .await?
        .map(Json)
        .ok_or_else(|| RewardsError::NotFound("no active reward configuration".to_string()))
}

pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserBalanceRecord>, RewardsError> {
    let engine = RewardEngine::new(state.conn.clone());
    Ok(Json(engine.balance(user_id).await?))
}

/// Registers a new active config for the source and deactivates any previous
/// one. The blob is parsed eagerly so a broken config is rejected here, not at
/// settlement time.
pub async fn upsert_reward_config(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpsertRewardConfigRequest>,
) -> Result<Json<RewardConfigRecord>, RewardsError> {
    let parsed: GameRewardConfig = serde_json::from_value(req.config.clone())
        .map_err(|e| RewardsError::Configuration(format!("invalid reward config: {e}")))?;
    parsed.validate().map_err(RewardsError::Configuration)?;

    let pool = state.conn.clone();
    let record = RewardConfigRecord {
        id: Uuid::new_v4(),
        org_id: req.organization_id,
        source_type: req.source_type.to_str().to_string(),
        source_id: req.source_id.clone(),
        config: req.config,
        is_active: req.is_active,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let insert = record.clone();

    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| RewardsError::Database(e.to_string()))?;

        diesel::update(
            reward_configs::table
                .filter(reward_configs::source_type.eq(&insert.source_type))
                .filter(reward_configs::source_id.is_not_distinct_from(insert.source_id.clone()))
                .filter(reward_configs::org_id.is_not_distinct_from(insert.org_id)),
        )
        .set(reward_configs::is_active.eq(false))
        .execute(&mut conn)
        .map_err(|e| RewardsError::Database(e.to_string()))?;

        diesel::insert_into(reward_configs::table)
            .values(&insert)
            .execute(&mut conn)
            .map_err(|e| RewardsError::Database(e.to_string()))?;
        Ok::<_, RewardsError>(())
    })
    .await
    .map_err(|e| RewardsError::Database(e.to_string()))??;

    info!(
        "Upserted reward config for {} / {:?}",
        record.source_type, record.source_id
    );
    Ok(Json(record))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRewardConfigsQuery {
    pub source_type: Option<String>,
    pub organization_id: Option<Uuid>,
}

pub async fn list_reward_configs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRewardConfigsQuery>,
) -> Result<Json<Vec<RewardConfigRecord>>, RewardsError> {
    let pool = state.conn.clone();

    let result = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| RewardsError::Database(e.to_string()))?;

        let mut db_query = reward_configs::table
            .filter(reward_configs::is_active.eq(true))
            .into_boxed();
        if let Some(source_type) = query.source_type {
            db_query = db_query.filter(reward_configs::source_type.eq(source_type));
        }
        if let Some(org) = query.organization_id {
            db_query = db_query.filter(reward_configs::org_id.eq(org));
        }

        db_query
            .order(reward_configs::created_at.desc())
            .load::<RewardConfigRecord>(&mut conn)
            .map_err(|e| RewardsError::Database(e.to_string()))
    })
    .await
    .map_err(|e| RewardsError::Database(e.to_string()))??;

    Ok(Json(result))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/rewards/preview", post(preview_reward))
        .route("/api/rewards/settle", post(settle_reward))
        .route(
            "/api/rewards/configs",
            get(list_reward_configs).post(upsert_reward_config),
        )
        .route("/api/balances/:user_id", get(get_balance))
}

#[cfg(test)]
mod tests {
    use super::types::*;
    use super::*;

    fn base_config() -> GameRewardConfig {
        serde_json::from_value(serde_json::json!({
            "xp_base_reward": 100,
            "coins_base_reward": 50,
        }))
        .unwrap()
    }

    #[test]
    fn missing_base_reward_fails_closed() {
        let result: Result<GameRewardConfig, _> =
            serde_json::from_value(serde_json::json!({ "coins_base_reward": 50 }));
        assert!(result.is_err());
    }

    #[test]
    fn plain_completion_pays_base() {
        let outcome = compute_reward(&base_config(), &RewardPerformance::default());
        assert_eq!(outcome.xp, 100);
        assert_eq!(outcome.coins, 50);
        assert!(outcome.met_target);
        assert!(!outcome.participation_only);
    }

    #[test]
    fn participation_floor_when_target_missed() {
        let mut config = base_config();
        config.target_score = Some(70.0);
        config.participation_xp = 10;
        config.participation_coins = 5;
        config.difficulty_multipliers.hard = 3.0;

        let performance = RewardPerformance {
            score: Some(50.0),
            difficulty: Some(Difficulty::Hard),
            ..Default::default()
        };
        let outcome = compute_reward(&config, &performance);
        assert_eq!(outcome.xp, 10);
        assert_eq!(outcome.coins, 5);
        assert!(outcome.participation_only);
        assert!(!outcome.met_target);
    }

    #[test]
    fn absent_score_with_target_pays_floor() {
        let mut config = base_config();
        config.target_score = Some(70.0);
        config.participation_xp = 10;

        let outcome = compute_reward(&config, &RewardPerformance::default());
        assert_eq!(outcome.xp, 10);
        assert!(outcome.participation_only);
    }

    #[test]
    fn full_multiplier_stack() {
        // hard 1.5x, full time bonus 20%, streak 10 days * 5 capped at 50
        // => 1.5 * (1 + 0.70) = 2.55 => 255 XP, 128 coins (rounded, not truncated)
        let mut config = base_config();
        config.difficulty_multipliers.hard = 1.5;
        config.time_bonus_config = TimeBonusConfig {
            enabled: true,
            max_bonus_percent: 20,
        };
        config.streak_bonus_config = StreakBonusConfig {
            enabled: true,
            bonus_per_day: 5,
            max_bonus: 50,
        };

        let performance = RewardPerformance {
            difficulty: Some(Difficulty::Hard),
            score: None,
            streak_days: 10,
            completion_time_ratio: Some(0.0),
        };
        let outcome = compute_reward(&config, &performance);
        assert_eq!(outcome.time_bonus_percent, 20.0);
        assert_eq!(outcome.streak_bonus_percent, 50.0);
        assert_eq!(outcome.total_multiplier, 2.55);
        assert_eq!(outcome.xp, 255);
        assert_eq!(outcome.coins, 128);
    }

    #[test]
    fn time_bonus_is_monotonic_and_capped() {
        assert_eq!(compute_time_bonus(20, None), 0.0);
        assert_eq!(compute_time_bonus(20, Some(0.0)), 20.0);
        assert_eq!(compute_time_bonus(20, Some(0.5)), 10.0);
        assert_eq!(compute_time_bonus(20, Some(1.0)), 0.0);
        assert_eq!(compute_time_bonus(20, Some(2.0)), 0.0);
        assert_eq!(compute_time_bonus(20, Some(-1.0)), 20.0);
    }

    #[test]
    fn disabled_bonuses_do_not_apply() {
        let performance = RewardPerformance {
            streak_days: 30,
            completion_time_ratio: Some(0.0),
            ..Default::default()
        };
        let outcome = compute_reward(&base_config(), &performance);
        assert_eq!(outcome.xp, 100);
        assert_eq!(outcome.time_bonus_percent, 0.0);
        assert_eq!(outcome.streak_bonus_percent, 0.0);
    }

    #[test]
    fn negative_values_rejected_by_validation() {
        let mut config = base_config();
        config.participation_xp = -1;
        assert!(config.validate().is_err());
    }
}
