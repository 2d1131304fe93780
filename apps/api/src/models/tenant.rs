use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

text_enum! {
    TenantStatus {
        Active => "active",
        Suspended => "suspended",
        Expired => "expired",
    }
}

text_enum! {
    SubscriptionPlan {
        Trial => "trial",
        Basic => "basic",
        Professional => "professional",
        Enterprise => "enterprise",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TenantRow {
    pub id: Uuid,
    pub name: String,
    pub domain: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub subscription_plan: String,
    pub subscription_start: Option<DateTime<Utc>>,
    pub subscription_end: Option<DateTime<Utc>>,
    pub status: String,
    pub max_users: Option<i32>,
    pub max_jobs: Option<i32>,
    pub max_resumes_per_month: Option<i32>,
    pub current_month_resume_count: i32,
    pub usage_reset_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantRow {
    pub fn is_active(&self) -> bool {
        TenantStatus::parse(&self.status) == Some(TenantStatus::Active)
    }
}
