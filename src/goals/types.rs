use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::types::SourceType;
use crate::shared::schema::{
    development_goals, development_plans, goal_progress_events, pdi_linked_actions,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl GoalStatus {
    pub fn from_str(s: &str) -> Self {
        match s {
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            _ => Self::NotStarted,
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Archived,
}

impl PlanStatus {
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalPriority {
    Low,
    Medium,
    High,
}

impl GoalPriority {
    pub fn from_str(s: &str) -> Self {
        match s {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Why an event was allowed to advance a goal. Link matches take priority over
/// skill overlap when both hold; only the first satisfied reason is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    LinkedTraining,
    LinkedChallenge,
    LinkedTest,
    RelatedGame,
    SkillOverlap,
}

impl MatchReason {
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::LinkedTraining => "linked_training",
            Self::LinkedChallenge => "linked_challenge",
            Self::LinkedTest => "linked_test",
            Self::RelatedGame => "related_game",
            Self::SkillOverlap => "skill_overlap",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SourceImpact {
    pub base: f64,
    pub max: f64,
}

/// Per-source-type progress impacts. Sources not listed here (feedback, 1:1s,
/// check-ins) never drive auto-progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalImpactConfig {
    pub training: SourceImpact,
    pub module: SourceImpact,
    pub game: SourceImpact,
    pub challenge: SourceImpact,
    pub cognitive_test: SourceImpact,
}

impl Default for GoalImpactConfig {
    fn default() -> Self {
        Self {
            training: SourceImpact { base: 25.0, max: 40.0 },
            module: SourceImpact { base: 8.0, max: 15.0 },
            game: SourceImpact { base: 5.0, max: 12.0 },
            challenge: SourceImpact { base: 15.0, max: 30.0 },
            cognitive_test: SourceImpact { base: 10.0, max: 20.0 },
        }
    }
}

impl GoalImpactConfig {
    pub fn impact_for(&self, source_type: SourceType) -> Option<SourceImpact> {
        match source_type {
            SourceType::Training => Some(self.training),
            SourceType::Module => Some(self.module),
            SourceType::Game => Some(self.game),
            SourceType::Challenge => Some(self.challenge),
            SourceType::CognitiveTest => Some(self.cognitive_test),
            SourceType::Feedback360 | SourceType::PdiGoal | SourceType::OneOnOne => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = development_plans)]
pub struct DevelopmentPlanRecord {
    pub id: Uuid,
    pub org_id: Option<Uuid>,
    pub user_id: Uuid,
    pub title: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = development_goals)]
pub struct DevelopmentGoalRecord {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub skill_id: Option<Uuid>,
    pub title: String,
    pub target_date: Option<NaiveDate>,
    pub priority: String,
    pub status: String,
    pub progress: BigDecimal,
    pub linked_training_ids: Vec<Option<String>>,
    pub linked_challenge_ids: Vec<Option<String>>,
    pub linked_cognitive_test_ids: Vec<Option<String>>,
    pub related_games: Vec<Option<String>>,
    pub auto_progress_enabled: bool,
    pub xp_reward: i32,
    pub weight: BigDecimal,
    pub last_auto_update: Option<DateTime<Utc>>,
    pub stagnant_since: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DevelopmentGoal {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub skill_id: Option<Uuid>,
    pub title: String,
    pub target_date: Option<NaiveDate>,
    pub priority: GoalPriority,
    pub status: GoalStatus,
    pub progress: f64,
    pub linked_training_ids: Vec<String>,
    pub linked_challenge_ids: Vec<String>,
    pub linked_cognitive_test_ids: Vec<String>,
    pub related_games: Vec<String>,
    pub auto_progress_enabled: bool,
    pub xp_reward: i32,
    pub weight: f64,
    pub last_auto_update: Option<DateTime<Utc>>,
    pub stagnant_since: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn record_to_goal(record: DevelopmentGoalRecord) -> DevelopmentGoal {
    DevelopmentGoal {
        id: record.id,
        plan_id: record.plan_id,
        skill_id: record.skill_id,
        title: record.title,
        target_date: record.target_date,
        priority: GoalPriority::from_str(&record.priority),
        status: GoalStatus::from_str(&record.status),
        progress: record.progress.to_f64().unwrap_or(0.0),
        linked_training_ids: record.linked_training_ids.into_iter().flatten().collect(),
        linked_challenge_ids: record.linked_challenge_ids.into_iter().flatten().collect(),
        linked_cognitive_test_ids: record
            .linked_cognitive_test_ids
            .into_iter()
            .flatten()
            .collect(),
        related_games: record.related_games.into_iter().flatten().collect(),
        auto_progress_enabled: record.auto_progress_enabled,
        xp_reward: record.xp_reward,
        weight: record.weight.to_f64().unwrap_or(1.0),
        last_auto_update: record.last_auto_update,
        stagnant_since: record.stagnant_since,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = goal_progress_events)]
pub struct GoalProgressEventRecord {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub user_id: Uuid,
    pub source_type: String,
    pub source_id: Option<String>,
    pub source_name: Option<String>,
    pub progress_before: BigDecimal,
    pub progress_after: BigDecimal,
    pub progress_delta: BigDecimal,
    pub xp_earned: i32,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = pdi_linked_actions)]
pub struct PdiLinkedActionRecord {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub user_id: Uuid,
    pub action_type: String,
    pub action_id: String,
    pub status: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one (goal, event) pair. Goals fail independently; an error here
/// never aborted the rest of the batch.
#[derive(Debug, Clone, Serialize)]
pub struct GoalUpdateResult {
    pub goal_id: Uuid,
    pub goal_title: String,
    pub match_reason: MatchReason,
    pub progress_before: f64,
    pub progress_after: f64,
    pub progress_delta: f64,
    pub xp_earned: i64,
    pub completed: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppliedProgress {
    pub updates: Vec<GoalUpdateResult>,
    pub xp_credited: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlanRequest {
    pub user_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGoalRequest {
    pub plan_id: Uuid,
    pub skill_id: Option<Uuid>,
    pub title: String,
    pub target_date: Option<NaiveDate>,
    pub priority: Option<GoalPriority>,
    #[serde(default)]
    pub linked_training_ids: Vec<String>,
    #[serde(default)]
    pub linked_challenge_ids: Vec<String>,
    #[serde(default)]
    pub linked_cognitive_test_ids: Vec<String>,
    #[serde(default)]
    pub related_games: Vec<String>,
    pub auto_progress_enabled: Option<bool>,
    pub xp_reward: Option<i32>,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckinRequest {
    pub user_id: Uuid,
    pub progress_delta: f64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLinkedActionRequest {
    pub goal_id: Uuid,
    pub user_id: Uuid,
    pub action_type: SourceType,
    pub action_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListPlansQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanWithGoals {
    pub plan: DevelopmentPlanRecord,
    pub goals: Vec<DevelopmentGoal>,
}
