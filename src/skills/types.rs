use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::types::SourceType;
use crate::shared::schema::skill_impact_events;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactType {
    XpGain,
    Assessment,
    PeerFeedback,
    ManagerFeedback,
    SelfAssessment,
    GoalCompletion,
    TestScore,
}

impl ImpactType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "xp_gain" => Some(Self::XpGain),
            "assessment" => Some(Self::Assessment),
            "peer_feedback" => Some(Self::PeerFeedback),
            "manager_feedback" => Some(Self::ManagerFeedback),
            "self_assessment" => Some(Self::SelfAssessment),
            "goal_completion" => Some(Self::GoalCompletion),
            "test_score" => Some(Self::TestScore),
            _ => None,
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            Self::XpGain => "xp_gain",
            Self::Assessment => "assessment",
            Self::PeerFeedback => "peer_feedback",
            Self::ManagerFeedback => "manager_feedback",
            Self::SelfAssessment => "self_assessment",
            Self::GoalCompletion => "goal_completion",
            Self::TestScore => "test_score",
        }
    }
}

/// Consolidation weights per impact type. Assessment-backed signals weigh
/// heavily; raw engagement (xp_gain) carries no assessment signal and weighs
/// zero by default, so playing a game a lot never moves a competency score on
/// its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactWeights {
    pub xp_gain: f64,
    pub assessment: f64,
    pub peer_feedback: f64,
    pub manager_feedback: f64,
    pub self_assessment: f64,
    pub goal_completion: f64,
    pub test_score: f64,
}

impl Default for ImpactWeights {
    fn default() -> Self {
        Self {
            xp_gain: 0.0,
            assessment: 1.0,
            peer_feedback: 1.25,
            manager_feedback: 1.5,
            self_assessment: 0.75,
            goal_completion: 0.5,
            test_score: 1.5,
        }
    }
}

impl ImpactWeights {
    pub fn weight_for(&self, impact_type: ImpactType) -> f64 {
        match impact_type {
            ImpactType::XpGain => self.xp_gain,
            ImpactType::Assessment => self.assessment,
            ImpactType::PeerFeedback => self.peer_feedback,
            ImpactType::ManagerFeedback => self.manager_feedback,
            ImpactType::SelfAssessment => self.self_assessment,
            ImpactType::GoalCompletion => self.goal_completion,
            ImpactType::TestScore => self.test_score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = skill_impact_events)]
pub struct SkillImpactRecord {
    pub id: Uuid,
    pub org_id: Option<Uuid>,
    pub user_id: Uuid,
    pub skill_id: Uuid,
    pub source_type: String,
    pub source_id: Option<String>,
    pub impact_type: String,
    pub impact_value: f64,
    pub normalized_score: Option<f64>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactTypeBreakdown {
    pub impact_type: ImpactType,
    pub avg_score: Option<f64>,
    pub count: i64,
    pub total_xp: f64,
}

/// Windowed, weighted view over the impact log. Computed on demand, never
/// persisted. `consolidated_score: None` means no assessment signal in the
/// window, which is distinct from "evaluated at zero".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsolidatedSkillScore {
    pub user_id: Uuid,
    pub skill_id: Uuid,
    pub period_days: i64,
    pub consolidated_score: Option<f64>,
    pub breakdown: Vec<ImpactTypeBreakdown>,
    pub total_events: i64,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordImpactRequest {
    pub user_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub skill_id: Uuid,
    pub source_type: SourceType,
    pub source_id: Option<String>,
    pub impact_type: ImpactType,
    pub impact_value: f64,
    pub normalized_score: Option<f64>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkillScoreQuery {
    pub user_id: Uuid,
    pub period_days: Option<i64>,
}
