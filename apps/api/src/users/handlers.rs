use axum::{
    extract::State,
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::password::{hash_password, validate_password_strength, verify_password};
use crate::auth::{normalize_email, AuthUser, TenantAdmin};
use crate::db::is_unique_violation;
use crate::errors::AppError;
use crate::extractors::{Json, Path, Query};
use crate::llm_client::prompts::{PING_PROMPT, PING_SYSTEM};
use crate::llm_client::providers::{ProviderKind, ProviderSource};
use crate::llm_client::resolver::resolve_provider;
use crate::models::user::{Role, UserLlmConfigRow, UserRow};
use crate::pagination::{Page, PageParams};
use crate::settings::secrets::mask_secret;
use crate::state::AppState;
use crate::tenants::quota::ensure_user_capacity;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct LlmConfigRequest {
    pub provider: ProviderKind,
    /// Blank keeps the stored key.
    #[serde(default)]
    pub api_key: String,
    pub base_url: Option<String>,
    pub model_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LlmConfigView {
    pub provider: String,
    pub api_key_masked: String,
    pub base_url: Option<String>,
    pub model_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionTestResponse {
    pub success: bool,
    pub provider: ProviderKind,
    pub source: ProviderSource,
    pub model: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTenantUserRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTenantUserRequest {
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub password: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

async fn fetch_user(state: &AppState, user_id: Uuid) -> Result<UserRow, AppError> {
    sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))
}

async fn fetch_tenant_user(
    state: &AppState,
    tenant_id: Uuid,
    user_id: Uuid,
) -> Result<UserRow, AppError> {
    sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1 AND tenant_id = $2")
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))
}

fn tenant_role(role: Role) -> Result<Role, AppError> {
    match role {
        Role::TenantAdmin | Role::HrUser => Ok(role),
        Role::PlatformAdmin => Err(AppError::Validation(
            "Tenant users can only be tenant_admin or hr_user".to_string(),
        )),
    }
}

fn view_of(row: &UserLlmConfigRow, api_key: &str) -> LlmConfigView {
    LlmConfigView {
        provider: row.provider.clone(),
        api_key_masked: mask_secret(api_key),
        base_url: row.base_url.clone(),
        model_name: row.model_name.clone(),
        updated_at: row.updated_at,
    }
}

async fn fetch_llm_config(
    state: &AppState,
    user_id: Uuid,
) -> Result<Option<UserLlmConfigRow>, AppError> {
    Ok(sqlx::query_as::<_, UserLlmConfigRow>(
        "SELECT * FROM user_llm_configs WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await?)
}

// ────────────────────────────────────────────────────────────────────────────
// Own account
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/users/me
pub async fn handle_get_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UserRow>, AppError> {
    Ok(Json(fetch_user(&state, user.id).await?))
}

/// PUT /api/v1/users/me
pub async fn handle_update_me(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserRow>, AppError> {
    let full_name = req.full_name.map(|n| n.trim().to_string());
    let row = sqlx::query_as::<_, UserRow>(
        "UPDATE users SET full_name = COALESCE($2, full_name), updated_at = NOW() \
         WHERE id = $1 RETURNING *",
    )
    .bind(user.id)
    .bind(full_name)
    .fetch_one(&state.db)
    .await?;
    Ok(Json(row))
}

/// PUT /api/v1/users/me/password
pub async fn handle_change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    let row = fetch_user(&state, user.id).await?;
    if !verify_password(&row.password_hash, &req.old_password) {
        return Err(AppError::Validation("Current password is incorrect".to_string()));
    }
    if req.old_password == req.new_password {
        return Err(AppError::Validation(
            "New password must differ from the current one".to_string(),
        ));
    }
    validate_password_strength(&req.new_password)?;

    sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(user.id)
        .bind(hash_password(&req.new_password)?)
        .execute(&state.db)
        .await?;

    info!("User {} changed their password", user.id);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/users/me/llm-config
pub async fn handle_get_llm_config(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<LlmConfigView>, AppError> {
    let row = fetch_llm_config(&state, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("No personal LLM configuration".to_string()))?;
    // An undecryptable key still gets a placeholder mask.
    let key = state.secrets.decrypt(&row.api_key_encrypted).unwrap_or_default();
    Ok(Json(view_of(&row, &key)))
}

/// PUT /api/v1/users/me/llm-config
pub async fn handle_put_llm_config(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<LlmConfigRequest>,
) -> Result<Json<LlmConfigView>, AppError> {
    let api_key = req.api_key.trim();
    let encrypted = if api_key.is_empty() {
        fetch_llm_config(&state, user.id)
            .await?
            .map(|row| row.api_key_encrypted)
            .ok_or_else(|| AppError::Validation("api_key is required".to_string()))?
    } else {
        state
            .secrets
            .encrypt(api_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to encrypt key: {e}")))?
    };

    let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    let row = sqlx::query_as::<_, UserLlmConfigRow>(
        r#"
        INSERT INTO user_llm_configs (user_id, provider, api_key_encrypted, base_url, model_name)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id) DO UPDATE SET
            provider = EXCLUDED.provider,
            api_key_encrypted = EXCLUDED.api_key_encrypted,
            base_url = EXCLUDED.base_url,
            model_name = EXCLUDED.model_name,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(req.provider.as_str())
    .bind(&encrypted)
    .bind(clean(req.base_url))
    .bind(clean(req.model_name))
    .fetch_one(&state.db)
    .await?;

    let key = state.secrets.decrypt(&row.api_key_encrypted).unwrap_or_default();
    info!("User {} set personal LLM provider {}", user.id, req.provider);
    Ok(Json(view_of(&row, &key)))
}

/// DELETE /api/v1/users/me/llm-config
pub async fn handle_delete_llm_config(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<StatusCode, AppError> {
    let deleted = sqlx::query("DELETE FROM user_llm_configs WHERE user_id = $1")
        .bind(user.id)
        .execute(&state.db)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(AppError::NotFound("No personal LLM configuration".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/users/me/llm-config/test
///
/// Sends a one-line prompt through whichever provider the caller resolves to.
/// Provider failures are reported in the body, not as an HTTP error.
pub async fn handle_test_llm_config(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ConnectionTestResponse>, AppError> {
    let provider = resolve_provider(&state, user.id).await?;

    let (success, message) = match state.llm.chat(&provider, PING_PROMPT, PING_SYSTEM).await {
        Ok(response) => match response.text() {
            Some(text) => (true, text.trim().chars().take(200).collect()),
            None => (false, "Provider returned an empty reply".to_string()),
        },
        Err(e) => (false, e.to_string()),
    };

    Ok(Json(ConnectionTestResponse {
        success,
        provider: provider.kind,
        source: provider.source,
        model: provider.model,
        message,
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// Tenant user management
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/tenant-users
pub async fn handle_list_tenant_users(
    State(state): State<AppState>,
    TenantAdmin(admin): TenantAdmin,
    Query(page): Query<PageParams>,
) -> Result<Json<Page<UserRow>>, AppError> {
    let tenant_id = admin.tenant_id()?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE tenant_id = $1")
        .bind(tenant_id)
        .fetch_one(&state.db)
        .await?;

    let items = sqlx::query_as::<_, UserRow>(
        "SELECT * FROM users WHERE tenant_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(tenant_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Page::new(items, total, &page)))
}

/// POST /api/v1/tenant-users
pub async fn handle_create_tenant_user(
    State(state): State<AppState>,
    TenantAdmin(admin): TenantAdmin,
    Json(req): Json<CreateTenantUserRequest>,
) -> Result<(StatusCode, Json<UserRow>), AppError> {
    let tenant_id = admin.tenant_id()?;
    let role = tenant_role(req.role)?;
    let email = normalize_email(&req.email)?;
    validate_password_strength(&req.password)?;
    ensure_user_capacity(&state.db, tenant_id).await?;

    let row = sqlx::query_as::<_, UserRow>(
        r#"
        INSERT INTO users (id, tenant_id, email, password_hash, full_name, role)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(&email)
    .bind(hash_password(&req.password)?)
    .bind(req.full_name.map(|n| n.trim().to_string()))
    .bind(role.as_str())
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Email {email} is already registered"))
        } else {
            AppError::Database(e)
        }
    })?;

    info!("User {} created {} ({}) in tenant {tenant_id}", admin.id, row.id, role);
    Ok((StatusCode::CREATED, Json(row)))
}

/// PUT /api/v1/tenant-users/:id
pub async fn handle_update_tenant_user(
    State(state): State<AppState>,
    TenantAdmin(admin): TenantAdmin,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateTenantUserRequest>,
) -> Result<Json<UserRow>, AppError> {
    let tenant_id = admin.tenant_id()?;
    fetch_tenant_user(&state, tenant_id, user_id).await?;

    let role = req.role.map(tenant_role).transpose()?;
    if user_id == admin.id {
        if req.is_active == Some(false) {
            return Err(AppError::Validation("You cannot deactivate yourself".to_string()));
        }
        if role.is_some_and(|r| r != admin.role) {
            return Err(AppError::Validation("You cannot change your own role".to_string()));
        }
    }

    let password_hash = match req.password.as_deref() {
        Some(password) => {
            validate_password_strength(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    let row = sqlx::query_as::<_, UserRow>(
        r#"
        UPDATE users SET
            full_name = COALESCE($3, full_name),
            role = COALESCE($4, role),
            is_active = COALESCE($5, is_active),
            password_hash = COALESCE($6, password_hash),
            updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(tenant_id)
    .bind(req.full_name.map(|n| n.trim().to_string()))
    .bind(role.map(|r| r.as_str()))
    .bind(req.is_active)
    .bind(password_hash)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(row))
}

/// DELETE /api/v1/tenant-users/:id
pub async fn handle_delete_tenant_user(
    State(state): State<AppState>,
    TenantAdmin(admin): TenantAdmin,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let tenant_id = admin.tenant_id()?;
    if user_id == admin.id {
        return Err(AppError::Validation("You cannot delete yourself".to_string()));
    }

    let deleted = sqlx::query("DELETE FROM users WHERE id = $1 AND tenant_id = $2")
        .bind(user_id)
        .bind(tenant_id)
        .execute(&state.db)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(AppError::NotFound(format!("User {user_id} not found")));
    }

    info!("User {} deleted user {user_id} from tenant {tenant_id}", admin.id);
    Ok(StatusCode::NO_CONTENT)
}
