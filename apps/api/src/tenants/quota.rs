//! Subscription plan limits and usage enforcement.
//!
//! User and job limits are checked against live counts. The monthly resume
//! counter is a column on `tenants`, incremented with a conditional UPDATE so
//! concurrent uploads cannot overshoot the limit.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::tenant::{SubscriptionPlan, TenantRow};

pub const USAGE_PERIOD_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanLimits {
    pub max_users: Option<i32>,
    pub max_jobs: Option<i32>,
    pub max_resumes_per_month: Option<i32>,
}

impl SubscriptionPlan {
    pub fn default_limits(self) -> PlanLimits {
        let (users, jobs, resumes) = match self {
            SubscriptionPlan::Trial => (Some(5), Some(10), Some(100)),
            SubscriptionPlan::Basic => (Some(20), Some(50), Some(500)),
            SubscriptionPlan::Professional => (Some(100), Some(200), Some(2000)),
            SubscriptionPlan::Enterprise => (None, None, None),
        };
        PlanLimits {
            max_users: users,
            max_jobs: jobs,
            max_resumes_per_month: resumes,
        }
    }
}

/// `None` means unlimited.
pub fn check_capacity(resource: &str, current: i64, max: Option<i32>) -> Result<(), AppError> {
    match max {
        Some(max) if current >= i64::from(max) => Err(AppError::QuotaExceeded(format!(
            "{resource} limit of {max} reached for this subscription plan"
        ))),
        _ => Ok(()),
    }
}

pub fn usage_needs_reset(reset_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match reset_at {
        None => true,
        Some(at) => now - at >= Duration::days(USAGE_PERIOD_DAYS),
    }
}

/// Resume count for the current period, treating a stale counter as zero.
pub fn effective_resume_count(tenant: &TenantRow, now: DateTime<Utc>) -> i32 {
    if usage_needs_reset(tenant.usage_reset_at, now) {
        0
    } else {
        tenant.current_month_resume_count
    }
}

async fn load_limits(db: &PgPool, tenant_id: Uuid) -> Result<TenantRow, AppError> {
    sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE id = $1")
        .bind(tenant_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tenant {tenant_id} not found")))
}

pub async fn ensure_user_capacity(db: &PgPool, tenant_id: Uuid) -> Result<(), AppError> {
    let tenant = load_limits(db, tenant_id).await?;
    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE tenant_id = $1")
        .bind(tenant_id)
        .fetch_one(db)
        .await?;
    check_capacity("User", users, tenant.max_users)
}

pub async fn ensure_job_capacity(db: &PgPool, tenant_id: Uuid) -> Result<(), AppError> {
    let tenant = load_limits(db, tenant_id).await?;
    let jobs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_positions WHERE tenant_id = $1")
        .bind(tenant_id)
        .fetch_one(db)
        .await?;
    check_capacity("Job", jobs, tenant.max_jobs)
}

/// Takes one resume from this period's allowance.
pub async fn consume_resume_quota(db: &PgPool, tenant_id: Uuid) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE tenants
        SET current_month_resume_count = 0, usage_reset_at = NOW()
        WHERE id = $1
          AND (usage_reset_at IS NULL OR usage_reset_at <= NOW() - make_interval(days => $2))
        "#,
    )
    .bind(tenant_id)
    .bind(USAGE_PERIOD_DAYS as i32)
    .execute(db)
    .await?;

    let consumed: Option<i32> = sqlx::query_scalar(
        r#"
        UPDATE tenants
        SET current_month_resume_count = current_month_resume_count + 1
        WHERE id = $1
          AND (max_resumes_per_month IS NULL
               OR current_month_resume_count < max_resumes_per_month)
        RETURNING current_month_resume_count
        "#,
    )
    .bind(tenant_id)
    .fetch_optional(db)
    .await?;

    match consumed {
        Some(_) => Ok(()),
        None => Err(AppError::QuotaExceeded(
            "Monthly resume upload limit reached for this subscription plan".to_string(),
        )),
    }
}

/// Gives back a consumed upload when the upload itself failed.
pub async fn release_resume_quota(db: &PgPool, tenant_id: Uuid) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE tenants SET current_month_resume_count = GREATEST(current_month_resume_count - 1, 0) \
         WHERE id = $1",
    )
    .bind(tenant_id)
    .execute(db)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enterprise_is_unlimited() {
        let limits = SubscriptionPlan::Enterprise.default_limits();
        assert_eq!(limits.max_users, None);
        assert_eq!(limits.max_resumes_per_month, None);
    }

    #[test]
    fn trial_limits() {
        let limits = SubscriptionPlan::Trial.default_limits();
        assert_eq!(limits.max_users, Some(5));
        assert_eq!(limits.max_jobs, Some(10));
        assert_eq!(limits.max_resumes_per_month, Some(100));
    }

    #[test]
    fn capacity_is_exclusive_of_the_limit() {
        assert!(check_capacity("User", 4, Some(5)).is_ok());
        assert!(matches!(
            check_capacity("User", 5, Some(5)),
            Err(AppError::QuotaExceeded(_))
        ));
        assert!(check_capacity("User", 10_000, None).is_ok());
    }

    #[test]
    fn usage_resets_after_thirty_days() {
        let now = Utc::now();
        assert!(usage_needs_reset(None, now));
        assert!(!usage_needs_reset(Some(now - Duration::days(29)), now));
        assert!(usage_needs_reset(Some(now - Duration::days(30)), now));
    }
}
