use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

text_enum! {
    RegistrationStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

/// A self-service sign-up waiting for (or past) platform-admin review.
/// The password hash is held only while the request is pending.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RegistrationRow {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub application_reason: Option<String>,
    pub status: String,
    pub tenant_id: Option<Uuid>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RegistrationRow {
    pub fn status(&self) -> Option<RegistrationStatus> {
        RegistrationStatus::parse(&self.status)
    }
}
