use axum::{extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{ensure_pending, Decision, ReviewRequest};
use crate::auth::password::{hash_password, validate_password_strength};
use crate::auth::rate_limit::check_registration_rate;
use crate::auth::{normalize_email, PlatformAdmin};
use crate::db::is_unique_violation;
use crate::errors::AppError;
use crate::extractors::{Json, Path, Query};
use crate::models::registration::{RegistrationRow, RegistrationStatus};
use crate::models::user::UserRow;
use crate::pagination::{Page, PageParams};
use crate::state::AppState;
use crate::tenants::quota::ensure_user_capacity;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub application_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegistrationListQuery {
    pub status: Option<RegistrationStatus>,
}

#[derive(Debug, Serialize)]
pub struct ReviewOutcome {
    pub registration: RegistrationRow,
    pub user: Option<UserRow>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// POST /api/v1/auth/register
///
/// Files a pending request. No account exists until a platform admin approves it.
pub async fn handle_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegistrationRow>), AppError> {
    let email = normalize_email(&req.email)?;
    check_registration_rate(&state.redis, &email).await?;

    let full_name = req.full_name.trim();
    if full_name.is_empty() {
        return Err(AppError::Validation("Full name is required".to_string()));
    }
    validate_password_strength(&req.password)?;

    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(&email)
        .fetch_one(&state.db)
        .await?;
    if taken {
        return Err(AppError::Conflict(format!("Email {email} is already registered")));
    }

    let row = sqlx::query_as::<_, RegistrationRow>(
        r#"
        INSERT INTO registration_requests
            (id, email, full_name, password_hash, company, phone, application_reason, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(full_name)
    .bind(hash_password(&req.password)?)
    .bind(non_blank(req.company))
    .bind(non_blank(req.phone))
    .bind(non_blank(req.application_reason))
    .bind(RegistrationStatus::Pending.as_str())
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("A registration for {email} is already pending review"))
        } else {
            AppError::Database(e)
        }
    })?;

    info!("Registration {} filed for {email}", row.id);
    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/admin/registration-requests
///
/// Defaults to pending requests.
pub async fn handle_list_registrations(
    State(state): State<AppState>,
    PlatformAdmin(_admin): PlatformAdmin,
    Query(query): Query<RegistrationListQuery>,
    Query(page): Query<PageParams>,
) -> Result<Json<Page<RegistrationRow>>, AppError> {
    let status = query.status.unwrap_or(RegistrationStatus::Pending);

    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM registration_requests WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(&state.db)
            .await?;

    let items = sqlx::query_as::<_, RegistrationRow>(
        r#"
        SELECT * FROM registration_requests
        WHERE status = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(status.as_str())
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Page::new(items, total, &page)))
}

/// GET /api/v1/admin/registration-requests/:id
pub async fn handle_get_registration(
    State(state): State<AppState>,
    PlatformAdmin(_admin): PlatformAdmin,
    Path(request_id): Path<Uuid>,
) -> Result<Json<RegistrationRow>, AppError> {
    sqlx::query_as::<_, RegistrationRow>("SELECT * FROM registration_requests WHERE id = $1")
        .bind(request_id)
        .fetch_optional(&state.db)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Registration {request_id} not found")))
}

/// POST /api/v1/admin/registration-requests/:id/review
///
/// Approval creates the account with the password chosen at sign-up. Either
/// outcome drops the stored hash.
pub async fn handle_review_registration(
    State(state): State<AppState>,
    PlatformAdmin(admin): PlatformAdmin,
    Path(request_id): Path<Uuid>,
    Json(review): Json<ReviewRequest>,
) -> Result<Json<ReviewOutcome>, AppError> {
    let decision = review.decision()?;
    let notes = review.notes();

    if let Decision::Approve { tenant_id, .. } = decision {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tenants WHERE id = $1)")
            .bind(tenant_id)
            .fetch_one(&state.db)
            .await?;
        if !exists {
            return Err(AppError::NotFound(format!("Tenant {tenant_id} not found")));
        }
        ensure_user_capacity(&state.db, tenant_id).await?;
    }

    let mut tx = state.db.begin().await?;
    let request = sqlx::query_as::<_, RegistrationRow>(
        "SELECT * FROM registration_requests WHERE id = $1 FOR UPDATE",
    )
    .bind(request_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Registration {request_id} not found")))?;
    ensure_pending(&request)?;

    let (status, tenant_id, user) = match decision {
        Decision::Approve { tenant_id, role } => {
            let password_hash = request.password_hash.as_deref().ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!(
                    "pending registration {request_id} has no password hash"
                ))
            })?;
            let user = sqlx::query_as::<_, UserRow>(
                r#"
                INSERT INTO users (id, tenant_id, email, password_hash, full_name, role)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(&request.email)
            .bind(password_hash)
            .bind(&request.full_name)
            .bind(role.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict(format!("Email {} is already registered", request.email))
                } else {
                    AppError::Database(e)
                }
            })?;
            (RegistrationStatus::Approved, Some(tenant_id), Some(user))
        }
        Decision::Reject => (RegistrationStatus::Rejected, None, None),
    };

    let registration = sqlx::query_as::<_, RegistrationRow>(
        r#"
        UPDATE registration_requests SET
            status = $2,
            tenant_id = $3,
            user_id = $4,
            reviewed_by = $5,
            reviewed_at = NOW(),
            review_notes = $6,
            password_hash = NULL,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(request_id)
    .bind(status.as_str())
    .bind(tenant_id)
    .bind(user.as_ref().map(|u| u.id))
    .bind(admin.id)
    .bind(notes)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(
        "Platform admin {} {status} registration {request_id} ({})",
        admin.id, registration.email
    );
    Ok(Json(ReviewOutcome { registration, user }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_contact_fields_are_trimmed() {
        assert_eq!(non_blank(Some("  Acme  ".into())).as_deref(), Some("Acme"));
        assert_eq!(non_blank(Some("   ".into())), None);
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn list_filter_accepts_known_statuses_only() {
        let query: RegistrationListQuery =
            serde_json::from_value(json!({"status": "rejected"})).unwrap();
        assert_eq!(query.status, Some(RegistrationStatus::Rejected));
        assert!(serde_json::from_value::<RegistrationListQuery>(json!({"status": "lost"})).is_err());
    }

    #[test]
    fn password_hash_never_serializes() {
        let row = RegistrationRow {
            id: Uuid::new_v4(),
            email: "new@acme.test".into(),
            full_name: "New Hire".into(),
            password_hash: Some("$argon2id$secret".into()),
            company: None,
            phone: None,
            application_reason: None,
            status: "pending".into(),
            tenant_id: None,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            user_id: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let value = serde_json::to_value(&row).unwrap();
        assert!(value.get("password_hash").is_none());
        assert_eq!(value["status"], "pending");
    }
}
