use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Free-text tenant profile. Only ever read back as LLM prompt context.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CompanyInfoRow {
    pub tenant_id: Uuid,
    pub name: String,
    pub industry: Option<String>,
    pub products: Option<String>,
    pub application_scenarios: Option<String>,
    pub company_culture: Option<String>,
    pub preferences: Option<String>,
    pub company_size: Option<String>,
    pub development_stage: Option<String>,
    pub business_model: Option<String>,
    pub core_values: Option<String>,
    pub recruitment_philosophy: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
