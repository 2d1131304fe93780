//! Axum route handlers for tenants: the caller's own tenant, and the
//! platform-admin tenant management surface.

use axum::{
    extract::State,
    http::StatusCode,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::quota::{effective_resume_count, PlanLimits};
use crate::auth::password::{hash_password, validate_password_strength};
use crate::auth::{normalize_email, AuthUser, PlatformAdmin};
use crate::db::is_unique_violation;
use crate::errors::AppError;
use crate::extractors::{Json, Path, Query};
use crate::models::tenant::{SubscriptionPlan, TenantRow, TenantStatus};
use crate::models::user::Role;
use crate::pagination::{Page, PageParams};
use crate::state::AppState;
use crate::storage::delete_all_quietly;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct InitialAdmin {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
    pub domain: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub subscription_plan: Option<SubscriptionPlan>,
    pub subscription_months: Option<i64>,
    pub admin: Option<InitialAdmin>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTenantRequest {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub status: Option<TenantStatus>,
    pub max_users: Option<i32>,
    pub max_jobs: Option<i32>,
    pub max_resumes_per_month: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub plan: SubscriptionPlan,
    pub months: i64,
}

#[derive(Debug, Deserialize)]
pub struct TenantListQuery {
    pub status: Option<TenantStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TenantUsage {
    pub users: i64,
    pub jobs: i64,
    pub resumes_this_month: i32,
}

#[derive(Debug, Serialize)]
pub struct TenantWithUsage {
    pub tenant: TenantRow,
    pub usage: TenantUsage,
    pub limits: PlanLimits,
}

#[derive(Debug, Serialize)]
pub struct TenantStats {
    pub users: i64,
    pub active_users: i64,
    pub jobs: i64,
    pub published_jobs: i64,
    pub resumes: i64,
    pub resumes_this_month: i32,
    pub matches: i64,
    pub reports: i64,
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

async fn fetch_tenant(state: &AppState, tenant_id: Uuid) -> Result<TenantRow, AppError> {
    sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE id = $1")
        .bind(tenant_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tenant {tenant_id} not found")))
}

async fn count_for_tenant(state: &AppState, sql: &str, tenant_id: Uuid) -> Result<i64, AppError> {
    Ok(sqlx::query_scalar(sql)
        .bind(tenant_id)
        .fetch_one(&state.db)
        .await?)
}

fn limits_of(tenant: &TenantRow) -> PlanLimits {
    PlanLimits {
        max_users: tenant.max_users,
        max_jobs: tenant.max_jobs,
        max_resumes_per_month: tenant.max_resumes_per_month,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

async fn set_status(
    state: &AppState,
    tenant_id: Uuid,
    status: TenantStatus,
) -> Result<TenantRow, AppError> {
    let tenant = sqlx::query_as::<_, TenantRow>(
        "UPDATE tenants SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(tenant_id)
    .bind(status.as_str())
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Tenant {tenant_id} not found")))?;

    info!("Tenant {tenant_id} is now {status}");
    Ok(tenant)
}

// ────────────────────────────────────────────────────────────────────────────
// Tenant-facing
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/tenants/current
pub async fn handle_current_tenant(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<TenantWithUsage>, AppError> {
    let tenant = fetch_tenant(&state, user.tenant_id()?).await?;
    let usage = TenantUsage {
        users: count_for_tenant(&state, "SELECT COUNT(*) FROM users WHERE tenant_id = $1", tenant.id)
            .await?,
        jobs: count_for_tenant(
            &state,
            "SELECT COUNT(*) FROM job_positions WHERE tenant_id = $1",
            tenant.id,
        )
        .await?,
        resumes_this_month: effective_resume_count(&tenant, Utc::now()),
    };
    Ok(Json(TenantWithUsage {
        limits: limits_of(&tenant),
        usage,
        tenant,
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// Platform admin
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/admin/tenants
pub async fn handle_list_tenants(
    State(state): State<AppState>,
    PlatformAdmin(_admin): PlatformAdmin,
    Query(query): Query<TenantListQuery>,
    Query(page): Query<PageParams>,
) -> Result<Json<Page<TenantRow>>, AppError> {
    let status = query.status.map(|s| s.as_str());
    let search = non_blank(query.search).map(|s| format!("%{s}%"));

    let filter = "($1::text IS NULL OR status = $1) \
                  AND ($2::text IS NULL OR name ILIKE $2 OR domain ILIKE $2)";

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM tenants WHERE {filter}"))
        .bind(status)
        .bind(&search)
        .fetch_one(&state.db)
        .await?;

    let items = sqlx::query_as::<_, TenantRow>(&format!(
        "SELECT * FROM tenants WHERE {filter} ORDER BY created_at DESC LIMIT $3 OFFSET $4"
    ))
    .bind(status)
    .bind(&search)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Page::new(items, total, &page)))
}

/// POST /api/v1/admin/tenants
///
/// Creates the tenant and, optionally, its first tenant admin in one transaction.
pub async fn handle_create_tenant(
    State(state): State<AppState>,
    PlatformAdmin(admin): PlatformAdmin,
    Json(req): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<TenantRow>), AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Tenant name cannot be empty".to_string()));
    }

    let plan = req.subscription_plan.unwrap_or(SubscriptionPlan::Trial);
    let limits = plan.default_limits();
    let months = req.subscription_months.unwrap_or(1);
    if months < 1 {
        return Err(AppError::Validation("subscription_months must be at least 1".to_string()));
    }
    let now = Utc::now();

    let initial_admin = match &req.admin {
        Some(a) => {
            validate_password_strength(&a.password)?;
            Some((normalize_email(&a.email)?, hash_password(&a.password)?))
        }
        None => None,
    };

    let mut tx = state.db.begin().await?;

    let tenant = sqlx::query_as::<_, TenantRow>(
        r#"
        INSERT INTO tenants
            (id, name, domain, contact_email, contact_phone, subscription_plan,
             subscription_start, subscription_end, status,
             max_users, max_jobs, max_resumes_per_month, usage_reset_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(non_blank(req.domain))
    .bind(non_blank(req.contact_email))
    .bind(non_blank(req.contact_phone))
    .bind(plan.as_str())
    .bind(now)
    .bind(now + Duration::days(months * 30))
    .bind(TenantStatus::Active.as_str())
    .bind(limits.max_users)
    .bind(limits.max_jobs)
    .bind(limits.max_resumes_per_month)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("A tenant with this domain already exists".to_string())
        } else {
            AppError::Database(e)
        }
    })?;

    if let Some((email, hash)) = initial_admin {
        let full_name = req.admin.as_ref().and_then(|a| a.full_name.clone());
        sqlx::query(
            "INSERT INTO users (id, tenant_id, email, password_hash, full_name, role) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(tenant.id)
        .bind(&email)
        .bind(hash)
        .bind(full_name)
        .bind(Role::TenantAdmin.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Email {email} is already registered"))
            } else {
                AppError::Database(e)
            }
        })?;
    }

    tx.commit().await?;

    info!("Platform admin {} created tenant {} ({})", admin.id, tenant.id, tenant.name);
    Ok((StatusCode::CREATED, Json(tenant)))
}

/// GET /api/v1/admin/tenants/:id
pub async fn handle_get_tenant(
    State(state): State<AppState>,
    PlatformAdmin(_admin): PlatformAdmin,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<TenantRow>, AppError> {
    Ok(Json(fetch_tenant(&state, tenant_id).await?))
}

/// PUT /api/v1/admin/tenants/:id
pub async fn handle_update_tenant(
    State(state): State<AppState>,
    PlatformAdmin(_admin): PlatformAdmin,
    Path(tenant_id): Path<Uuid>,
    Json(req): Json<UpdateTenantRequest>,
) -> Result<Json<TenantRow>, AppError> {
    if req.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::Validation("Tenant name cannot be empty".to_string()));
    }
    for (field, value) in [
        ("max_users", req.max_users),
        ("max_jobs", req.max_jobs),
        ("max_resumes_per_month", req.max_resumes_per_month),
    ] {
        if value.is_some_and(|v| v < 0) {
            return Err(AppError::Validation(format!("{field} cannot be negative")));
        }
    }

    let tenant = sqlx::query_as::<_, TenantRow>(
        r#"
        UPDATE tenants SET
            name = COALESCE($2, name),
            domain = COALESCE($3, domain),
            contact_email = COALESCE($4, contact_email),
            contact_phone = COALESCE($5, contact_phone),
            status = COALESCE($6, status),
            max_users = COALESCE($7, max_users),
            max_jobs = COALESCE($8, max_jobs),
            max_resumes_per_month = COALESCE($9, max_resumes_per_month),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(tenant_id)
    .bind(req.name.map(|n| n.trim().to_string()))
    .bind(non_blank(req.domain))
    .bind(non_blank(req.contact_email))
    .bind(non_blank(req.contact_phone))
    .bind(req.status.map(|s| s.as_str()))
    .bind(req.max_users)
    .bind(req.max_jobs)
    .bind(req.max_resumes_per_month)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("A tenant with this domain already exists".to_string())
        } else {
            AppError::Database(e)
        }
    })?
    .ok_or_else(|| AppError::NotFound(format!("Tenant {tenant_id} not found")))?;

    Ok(Json(tenant))
}

/// Every document-store key referenced by a tenant's rows.
const TENANT_DOCUMENT_KEYS: &str = r#"
    SELECT key FROM (
        SELECT file_key AS key FROM resumes WHERE tenant_id = $1
        UNION ALL SELECT parsed_key FROM resumes WHERE tenant_id = $1
        UNION ALL SELECT profile_key FROM job_positions WHERE tenant_id = $1
        UNION ALL SELECT detail_key FROM resume_job_matches WHERE tenant_id = $1
        UNION ALL SELECT file_key FROM reports WHERE tenant_id = $1
    ) owned
    WHERE key IS NOT NULL
"#;

/// DELETE /api/v1/admin/tenants/:id
///
/// Cascades through every tenant-owned table, then drops the job vectors and
/// the documents the deleted rows pointed at.
pub async fn handle_delete_tenant(
    State(state): State<AppState>,
    PlatformAdmin(admin): PlatformAdmin,
    Path(tenant_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let mut tx = state.db.begin().await?;

    let vector_ids: Vec<Uuid> = sqlx::query_scalar(
        "SELECT vector_id FROM job_positions WHERE tenant_id = $1 AND vector_id IS NOT NULL",
    )
    .bind(tenant_id)
    .fetch_all(&mut *tx)
    .await?;

    let document_keys: Vec<String> = sqlx::query_scalar(TENANT_DOCUMENT_KEYS)
        .bind(tenant_id)
        .fetch_all(&mut *tx)
        .await?;

    let deleted = sqlx::query("DELETE FROM tenants WHERE id = $1")
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(AppError::NotFound(format!("Tenant {tenant_id} not found")));
    }
    tx.commit().await?;

    for vector_id in vector_ids {
        if let Err(e) = state.vectors.delete(vector_id).await {
            warn!("Failed to delete vector {vector_id} of tenant {tenant_id}: {e}");
        }
    }
    let purged = delete_all_quietly(state.documents.as_ref(), &document_keys).await;

    info!(
        "Platform admin {} deleted tenant {tenant_id} ({purged}/{} documents purged)",
        admin.id,
        document_keys.len()
    );
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/admin/tenants/:id/activate
pub async fn handle_activate_tenant(
    State(state): State<AppState>,
    PlatformAdmin(_admin): PlatformAdmin,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<TenantRow>, AppError> {
    Ok(Json(set_status(&state, tenant_id, TenantStatus::Active).await?))
}

/// POST /api/v1/admin/tenants/:id/suspend
pub async fn handle_suspend_tenant(
    State(state): State<AppState>,
    PlatformAdmin(_admin): PlatformAdmin,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<TenantRow>, AppError> {
    Ok(Json(set_status(&state, tenant_id, TenantStatus::Suspended).await?))
}

/// POST /api/v1/admin/tenants/:id/subscription
///
/// Switches plan, resets the limits to the plan defaults and starts a new period.
pub async fn handle_change_subscription(
    State(state): State<AppState>,
    PlatformAdmin(_admin): PlatformAdmin,
    Path(tenant_id): Path<Uuid>,
    Json(req): Json<SubscriptionRequest>,
) -> Result<Json<TenantRow>, AppError> {
    if !(1..=120).contains(&req.months) {
        return Err(AppError::Validation("months must be between 1 and 120".to_string()));
    }
    let limits = req.plan.default_limits();
    let now = Utc::now();

    let tenant = sqlx::query_as::<_, TenantRow>(
        r#"
        UPDATE tenants SET
            subscription_plan = $2,
            subscription_start = $3,
            subscription_end = $4,
            max_users = $5,
            max_jobs = $6,
            max_resumes_per_month = $7,
            status = $8,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(tenant_id)
    .bind(req.plan.as_str())
    .bind(now)
    .bind(now + Duration::days(req.months * 30))
    .bind(limits.max_users)
    .bind(limits.max_jobs)
    .bind(limits.max_resumes_per_month)
    .bind(TenantStatus::Active.as_str())
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Tenant {tenant_id} not found")))?;

    info!("Tenant {tenant_id} moved to plan {} for {} months", req.plan, req.months);
    Ok(Json(tenant))
}

/// GET /api/v1/admin/tenants/:id/stats
pub async fn handle_tenant_stats(
    State(state): State<AppState>,
    PlatformAdmin(_admin): PlatformAdmin,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<TenantStats>, AppError> {
    let tenant = fetch_tenant(&state, tenant_id).await?;
    let id = tenant.id;

    Ok(Json(TenantStats {
        users: count_for_tenant(&state, "SELECT COUNT(*) FROM users WHERE tenant_id = $1", id).await?,
        active_users: count_for_tenant(
            &state,
            "SELECT COUNT(*) FROM users WHERE tenant_id = $1 AND is_active",
            id,
        )
        .await?,
        jobs: count_for_tenant(&state, "SELECT COUNT(*) FROM job_positions WHERE tenant_id = $1", id)
            .await?,
        published_jobs: count_for_tenant(
            &state,
            "SELECT COUNT(*) FROM job_positions WHERE tenant_id = $1 AND status = 'published'",
            id,
        )
        .await?,
        resumes: count_for_tenant(&state, "SELECT COUNT(*) FROM resumes WHERE tenant_id = $1", id)
            .await?,
        resumes_this_month: effective_resume_count(&tenant, Utc::now()),
        matches: count_for_tenant(
            &state,
            "SELECT COUNT(*) FROM resume_job_matches WHERE tenant_id = $1",
            id,
        )
        .await?,
        reports: count_for_tenant(&state, "SELECT COUNT(*) FROM reports WHERE tenant_id = $1", id)
            .await?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purge_query_covers_every_document_column() {
        for column in [
            "file_key AS key FROM resumes",
            "parsed_key FROM resumes",
            "profile_key FROM job_positions",
            "detail_key FROM resume_job_matches",
            "file_key FROM reports",
        ] {
            assert!(TENANT_DOCUMENT_KEYS.contains(column), "{column}");
        }
    }
}
