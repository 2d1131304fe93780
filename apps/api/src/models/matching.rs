use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

text_enum! {
    MatchLabel {
        StronglyRecommended => "strongly_recommended",
        Recommended => "recommended",
        Cautious => "cautious",
        NotRecommended => "not_recommended",
    }
}

text_enum! {
    MatchStatus {
        Pending => "pending",
        Reviewed => "reviewed",
        Rejected => "rejected",
        Accepted => "accepted",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MatchRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub resume_id: Uuid,
    pub job_id: Uuid,
    pub match_model_id: Option<Uuid>,
    pub score: f64,
    pub label: String,
    pub status: String,
    pub detail_key: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Match row joined with the candidate name and job title for listings.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MatchListItem {
    pub id: Uuid,
    pub resume_id: Uuid,
    pub job_id: Uuid,
    pub score: f64,
    pub label: String,
    pub status: String,
    pub candidate_name: Option<String>,
    pub job_title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MatchModelRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub config: Value,
    pub is_default: bool,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
