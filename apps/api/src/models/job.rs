use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

text_enum! {
    JobStatus {
        Draft => "draft",
        Published => "published",
        Closed => "closed",
    }
}

impl JobStatus {
    /// `draft → published → closed`; a closed job may be republished.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Draft, JobStatus::Published)
                | (JobStatus::Published, JobStatus::Closed)
                | (JobStatus::Closed, JobStatus::Published)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobPositionRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub department: Option<String>,
    pub department_id: Option<Uuid>,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub location: Option<String>,
    pub salary_min: Option<i32>,
    pub salary_max: Option<i32>,
    pub employment_type: Option<String>,
    pub status: String,
    pub profile_key: Option<String>,
    pub vector_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub published_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobPositionRow {
    pub fn status(&self) -> JobStatus {
        JobStatus::parse(&self.status).unwrap_or(JobStatus::Draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_moves_forward() {
        assert!(JobStatus::Draft.can_transition_to(JobStatus::Published));
        assert!(JobStatus::Published.can_transition_to(JobStatus::Closed));
    }

    #[test]
    fn closed_job_can_be_reopened() {
        assert!(JobStatus::Closed.can_transition_to(JobStatus::Published));
    }

    #[test]
    fn lifecycle_rejects_skips_and_noops() {
        assert!(!JobStatus::Draft.can_transition_to(JobStatus::Closed));
        assert!(!JobStatus::Published.can_transition_to(JobStatus::Published));
        assert!(!JobStatus::Closed.can_transition_to(JobStatus::Draft));
    }
}
