use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::goals::types::GoalUpdateResult;
use crate::rewards::types::{RewardOutcome, RewardPerformance};
use crate::shared::schema::activity_events;
use crate::skills::types::ImpactType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    GameCompleted,
    TestCompleted,
    TrainingCompleted,
    ModuleCompleted,
    FeedbackGiven,
    PdiCheckin,
    OneOnOneActionCompleted,
    ChallengeCompleted,
}

impl EventType {
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::GameCompleted => "game_completed",
            Self::TestCompleted => "test_completed",
            Self::TrainingCompleted => "training_completed",
            Self::ModuleCompleted => "module_completed",
            Self::FeedbackGiven => "feedback_given",
            Self::PdiCheckin => "pdi_checkin",
            Self::OneOnOneActionCompleted => "one_on_one_action_completed",
            Self::ChallengeCompleted => "challenge_completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Game,
    CognitiveTest,
    Training,
    Module,
    Challenge,
    Feedback360,
    PdiGoal,
    OneOnOne,
}

impl SourceType {
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Game => "game",
            Self::CognitiveTest => "cognitive_test",
            Self::Training => "training",
            Self::Module => "module",
            Self::Challenge => "challenge",
            Self::Feedback360 => "feedback_360",
            Self::PdiGoal => "pdi_goal",
            Self::OneOnOne => "one_on_one",
        }
    }
}

/// Who gave the feedback, relative to the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackRelationship {
    Peer,
    Manager,
    #[serde(rename = "self")]
    SelfReport,
}

impl FeedbackRelationship {
    pub fn from_str(s: &str) -> Self {
        match s {
            "manager" => Self::Manager,
            "self" => Self::SelfReport,
            _ => Self::Peer,
        }
    }
}

/// Incoming completion as submitted by an activity producer, before
/// validation. Identity fields are optional here so a missing one surfaces as
/// a validation error rather than a deserialization failure.
#[derive(Debug, Clone, Deserialize)]
pub struct RawActivityEvent {
    pub user_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    pub event_type: EventType,
    pub source_type: SourceType,
    pub source_id: Option<String>,
    pub score: Option<f64>,
    #[serde(default)]
    pub skill_ids: Vec<Uuid>,
    pub occurred_at: Option<DateTime<Utc>>,
    /// Feedback events: relationship of the author to the subject.
    pub relationship: Option<String>,
    /// Reward-bearing events: how the attempt went.
    pub performance: Option<RewardPerformance>,
    /// Attempt identity for reward settlement; the caller owns retry dedupe.
    pub attempt_id: Option<String>,
    /// Producer-specific extras, stored verbatim.
    pub payload: Option<serde_json::Value>,
}

/// Canonical, validated activity fact. Immutable once persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub event_type: EventType,
    pub source_type: SourceType,
    pub source_id: String,
    pub score: Option<f64>,
    pub skill_ids: Vec<Uuid>,
    pub relationship: Option<FeedbackRelationship>,
    pub performance: Option<RewardPerformance>,
    pub occurred_at: DateTime<Utc>,
}

impl ActivityEvent {
    /// Which kind of skill impact this event produces. Score-carrying
    /// assessments map to assessment-type impacts; everything else is plain
    /// engagement (xp_gain).
    pub fn impact_type(&self) -> ImpactType {
        match self.event_type {
            EventType::TestCompleted => ImpactType::TestScore,
            EventType::FeedbackGiven => match self.relationship {
                Some(FeedbackRelationship::Manager) => ImpactType::ManagerFeedback,
                Some(FeedbackRelationship::SelfReport) => ImpactType::SelfAssessment,
                _ => ImpactType::PeerFeedback,
            },
            EventType::PdiCheckin => ImpactType::SelfAssessment,
            EventType::OneOnOneActionCompleted => ImpactType::Assessment,
            EventType::GameCompleted
            | EventType::TrainingCompleted
            | EventType::ModuleCompleted
            | EventType::ChallengeCompleted => ImpactType::XpGain,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = activity_events)]
pub struct ActivityEventRecord {
    pub id: Uuid,
    pub org_id: Option<Uuid>,
    pub user_id: Uuid,
    pub event_type: String,
    pub source_type: String,
    pub source_id: String,
    pub score: Option<f64>,
    pub skill_ids: Vec<Option<Uuid>>,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ActivityEventRecord {
    pub fn from_event(event: &ActivityEvent, extra_payload: Option<serde_json::Value>) -> Self {
        Self {
            id: event.id,
            org_id: event.organization_id,
            user_id: event.user_id,
            event_type: event.event_type.to_str().to_string(),
            source_type: event.source_type.to_str().to_string(),
            source_id: event.source_id.clone(),
            score: event.score,
            skill_ids: event.skill_ids.iter().copied().map(Some).collect(),
            payload: serde_json::json!({
                "relationship": event.relationship,
                "performance": event.performance,
                "extra": extra_payload,
            }),
            occurred_at: event.occurred_at,
            created_at: Utc::now(),
        }
    }
}

/// What the pipeline did with one ingested event.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub event: ActivityEvent,
    pub reward: Option<RewardOutcome>,
    pub skill_impacts_recorded: usize,
    pub goal_updates: Vec<GoalUpdateResult>,
    pub goal_xp_credited: i64,
}
