use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

text_enum! {
    ReportTemplate {
        Standard => "standard",
        Summary => "summary",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReportRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub match_id: Uuid,
    pub template: String,
    pub file_key: String,
    pub file_name: String,
    pub file_size: i64,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
