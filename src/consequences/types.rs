use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::types::SourceType;
use crate::shared::schema::assessment_consequences;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsequenceType {
    RecommendedTest,
    FeedbackRequest,
    PdiGoal,
}

impl ConsequenceType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "recommended_test" => Some(Self::RecommendedTest),
            "feedback_request" => Some(Self::FeedbackRequest),
            "pdi_goal" => Some(Self::PdiGoal),
            _ => None,
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            Self::RecommendedTest => "recommended_test",
            Self::FeedbackRequest => "feedback_request",
            Self::PdiGoal => "pdi_goal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsequenceStatus {
    Pending,
    Accepted,
    Dismissed,
}

impl ConsequenceStatus {
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Dismissed => "dismissed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = assessment_consequences)]
pub struct AssessmentConsequenceRecord {
    pub id: Uuid,
    pub org_id: Option<Uuid>,
    pub user_id: Uuid,
    pub consequence_type: String,
    pub target_type: String,
    pub target_id: Option<String>,
    pub title: String,
    pub priority: String,
    pub skill_ids: Vec<Option<Uuid>>,
    pub status: String,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateConsequencesRequest {
    pub user_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub assessment_type: SourceType,
    pub assessment_id: String,
    pub score: Option<f64>,
    #[serde(default)]
    pub skill_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListConsequencesQuery {
    pub user_id: Uuid,
    pub status: Option<String>,
}
