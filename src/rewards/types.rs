use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::types::SourceType;
use crate::shared::schema::{balance_transactions, reward_configs, user_balances};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifficultyMultipliers {
    #[serde(default = "default_multiplier")]
    pub easy: f64,
    #[serde(default = "default_multiplier")]
    pub medium: f64,
    #[serde(default = "default_multiplier")]
    pub hard: f64,
}

impl Default for DifficultyMultipliers {
    fn default() -> Self {
        Self {
            easy: 1.0,
            medium: 1.0,
            hard: 1.0,
        }
    }
}

impl DifficultyMultipliers {
    pub fn for_difficulty(&self, difficulty: Difficulty) -> f64 {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }
}

fn default_multiplier() -> f64 {
    1.0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeBonusConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub max_bonus_percent: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreakBonusConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bonus_per_day: i64,
    #[serde(default)]
    pub max_bonus: i64,
}

/// Admin-editable reward shape for one activity. Deserialized from the stored
/// Jsonb blob; the two base rewards are required so a half-written config fails
/// at the boundary instead of silently paying zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRewardConfig {
    pub xp_base_reward: i64,
    pub coins_base_reward: i64,
    #[serde(default)]
    pub difficulty_multipliers: DifficultyMultipliers,
    #[serde(default)]
    pub time_bonus_config: TimeBonusConfig,
    #[serde(default)]
    pub streak_bonus_config: StreakBonusConfig,
    #[serde(default)]
    pub participation_xp: i64,
    #[serde(default)]
    pub participation_coins: i64,
    #[serde(default)]
    pub target_score: Option<f64>,
    #[serde(default = "default_true")]
    pub is_repeatable: bool,
    #[serde(default)]
    pub max_attempts_per_day: Option<i32>,
}

fn default_true() -> bool {
    true
}

impl GameRewardConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.xp_base_reward < 0 || self.coins_base_reward < 0 {
            return Err("base rewards must be non-negative".to_string());
        }
        if self.participation_xp < 0 || self.participation_coins < 0 {
            return Err("participation floors must be non-negative".to_string());
        }
        let m = &self.difficulty_multipliers;
        if m.easy < 0.0 || m.medium < 0.0 || m.hard < 0.0 {
            return Err("difficulty multipliers must be non-negative".to_string());
        }
        if self.time_bonus_config.max_bonus_percent < 0
            || self.streak_bonus_config.bonus_per_day < 0
            || self.streak_bonus_config.max_bonus < 0
        {
            return Err("bonus configuration must be non-negative".to_string());
        }
        Ok(())
    }
}

/// What one completion looked like, as reported by the activity producer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewardPerformance {
    pub difficulty: Option<Difficulty>,
    pub score: Option<f64>,
    #[serde(default)]
    pub streak_days: i64,
    /// Actual completion time divided by the expected time. Below 1.0 means
    /// the user finished faster than expected.
    pub completion_time_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardOutcome {
    pub xp: i64,
    pub coins: i64,
    pub met_target: bool,
    pub participation_only: bool,
    pub difficulty_multiplier: f64,
    pub time_bonus_percent: f64,
    pub streak_bonus_percent: f64,
    pub total_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = reward_configs)]
pub struct RewardConfigRecord {
    pub id: Uuid,
    pub org_id: Option<Uuid>,
    pub source_type: String,
    pub source_id: Option<String>,
    pub config: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = user_balances)]
pub struct UserBalanceRecord {
    pub user_id: Uuid,
    pub org_id: Option<Uuid>,
    pub xp: i64,
    pub coins: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = balance_transactions)]
pub struct BalanceTransactionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub org_id: Option<Uuid>,
    pub kind: String,
    pub xp_delta: i64,
    pub coins_delta: i64,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertRewardConfigRequest {
    pub organization_id: Option<Uuid>,
    pub source_type: SourceType,
    pub source_id: Option<String>,
    pub config: serde_json::Value,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewRewardRequest {
    pub organization_id: Option<Uuid>,
    pub source_type: SourceType,
    pub source_id: String,
    pub performance: RewardPerformance,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettleRewardRequest {
    pub user_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub source_type: SourceType,
    pub source_id: String,
    /// Attempt identity chosen by the caller; settlement is invoked at most
    /// once per (user, source, attempt).
    pub attempt_id: Option<String>,
    pub performance: RewardPerformance,
}
