use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

text_enum! {
    ParseStatus {
        Parsed => "parsed",
        Failed => "failed",
    }
}

/// Relational summary of an uploaded resume. The full structured payload
/// lives in the document store under `parsed_key`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub uploaded_by: Option<Uuid>,
    pub original_filename: String,
    pub file_type: String,
    pub file_size: i64,
    pub file_hash: String,
    pub file_key: String,
    pub parsed_key: Option<String>,
    pub parse_status: String,
    pub parse_error: Option<String>,
    pub candidate_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub highest_education: Option<String>,
    pub years_of_experience: Option<f64>,
    pub skills: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResumeRow {
    pub fn is_parsed(&self) -> bool {
        ParseStatus::parse(&self.parse_status) == Some(ParseStatus::Parsed)
    }
}
