use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::extractor::tenant_access_error;
use super::jwt::{decode_token, issue_pair, TokenKind, TokenPair};
use super::password::verify_password;
use super::rate_limit::{check_login_rate, reset_login_rate};
use super::normalize_email;
use crate::errors::AppError;
use crate::extractors::Json;
use crate::models::tenant::TenantRow;
use crate::models::user::UserRow;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserRow,
}

async fn ensure_tenant_usable(state: &AppState, user: &UserRow) -> Result<(), AppError> {
    if !user.is_active {
        return Err(AppError::Forbidden("Account is disabled".to_string()));
    }
    let Some(tenant_id) = user.tenant_id else {
        return Ok(());
    };
    let tenant = sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE id = $1")
        .bind(tenant_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::Forbidden("Tenant no longer exists".to_string()))?;

    match tenant_access_error(&tenant.status, tenant.subscription_end, Utc::now()) {
        Some(reason) => Err(AppError::Forbidden(reason)),
        None => Ok(()),
    }
}

/// POST /api/v1/auth/login
pub async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let email = normalize_email(&req.email)
        .map_err(|_| AppError::Unauthorized("Incorrect email or password".to_string()))?;

    check_login_rate(&state.redis, &email).await?;

    let user = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?
        .filter(|u| verify_password(&u.password_hash, &req.password))
        .ok_or_else(|| AppError::Unauthorized("Incorrect email or password".to_string()))?;

    ensure_tenant_usable(&state, &user).await?;

    let user = sqlx::query_as::<_, UserRow>(
        "UPDATE users SET last_login_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    reset_login_rate(&state.redis, &email).await;
    tracing::info!("User {} logged in", user.id);

    Ok(Json(LoginResponse {
        tokens: issue_pair(&state.config, &user)?,
        user,
    }))
}

/// POST /api/v1/auth/refresh
///
/// Exchanges a refresh token for a fresh pair. The user is re-checked so a
/// disabled account cannot keep refreshing.
pub async fn handle_refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let claims = decode_token(&state.config.jwt_secret, &req.refresh_token, TokenKind::Refresh)?;

    let user = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
        .bind(claims.sub)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".to_string()))?;

    ensure_tenant_usable(&state, &user).await?;

    Ok(Json(LoginResponse {
        tokens: issue_pair(&state.config, &user)?,
        user,
    }))
}
