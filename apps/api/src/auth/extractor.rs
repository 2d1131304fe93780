use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::jwt::{decode_token, TokenKind};
use crate::errors::AppError;
use crate::models::tenant::TenantStatus;
use crate::models::user::Role;
use crate::state::AppState;

/// The authenticated caller, loaded fresh from the database on every request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    /// Tenant the request is scoped to. Platform admins have none.
    pub fn tenant_id(&self) -> Result<Uuid, AppError> {
        self.tenant_id
            .ok_or_else(|| AppError::Validation("tenant context required".to_string()))
    }

    pub fn is_tenant_admin(&self) -> bool {
        matches!(self.role, Role::TenantAdmin | Role::PlatformAdmin)
    }

    pub fn is_platform_admin(&self) -> bool {
        self.role == Role::PlatformAdmin
    }

    /// Creator-or-admin rule for editing tenant-owned records.
    pub fn can_modify(&self, owner: Option<Uuid>) -> bool {
        self.is_tenant_admin() || owner == Some(self.id)
    }
}

#[derive(Debug, FromRow)]
struct AuthRow {
    id: Uuid,
    tenant_id: Option<Uuid>,
    email: String,
    role: String,
    is_active: bool,
    tenant_status: Option<String>,
    subscription_end: Option<DateTime<Utc>>,
}

/// Why a tenant's users may not sign in or call the API, if they may not.
pub fn tenant_access_error(
    status: &str,
    subscription_end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<String> {
    match TenantStatus::parse(status) {
        Some(TenantStatus::Active) => {}
        Some(TenantStatus::Suspended) => return Some("Tenant is suspended".to_string()),
        Some(TenantStatus::Expired) | None => {
            return Some("Tenant subscription has expired".to_string())
        }
    }
    match subscription_end {
        Some(end) if end < now => Some("Tenant subscription has expired".to_string()),
        _ => None,
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;
        let claims = decode_token(&state.config.jwt_secret, token, TokenKind::Access)?;

        let row = sqlx::query_as::<_, AuthRow>(
            r#"
            SELECT u.id, u.tenant_id, u.email, u.role, u.is_active,
                   t.status AS tenant_status, t.subscription_end
            FROM users u
            LEFT JOIN tenants t ON t.id = u.tenant_id
            WHERE u.id = $1
            "#,
        )
        .bind(claims.sub)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".to_string()))?;

        if !row.is_active {
            return Err(AppError::Forbidden("Account is disabled".to_string()));
        }

        if let Some(status) = row.tenant_status.as_deref() {
            if let Some(reason) = tenant_access_error(status, row.subscription_end, Utc::now()) {
                return Err(AppError::Forbidden(reason));
            }
        }

        let role = Role::parse(&row.role)
            .ok_or_else(|| AppError::Forbidden(format!("Unknown role '{}'", row.role)))?;

        Ok(AuthUser {
            id: row.id,
            tenant_id: row.tenant_id,
            email: row.email,
            role,
        })
    }
}

/// Tenant admins and platform admins.
pub struct TenantAdmin(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for TenantAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_tenant_admin() {
            return Err(AppError::forbidden());
        }
        Ok(TenantAdmin(user))
    }
}

/// Platform admins only.
pub struct PlatformAdmin(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for PlatformAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_platform_admin() {
            return Err(AppError::forbidden());
        }
        Ok(PlatformAdmin(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use chrono::Duration;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_token_is_extracted_case_insensitively() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts_with(Some("bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts_with(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts_with(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts_with(None)), None);
    }

    #[test]
    fn tenant_access_rules() {
        let now = Utc::now();
        assert!(tenant_access_error("active", None, now).is_none());
        assert!(tenant_access_error("active", Some(now + Duration::days(1)), now).is_none());
        assert!(tenant_access_error("active", Some(now - Duration::days(1)), now).is_some());
        assert!(tenant_access_error("suspended", None, now)
            .unwrap()
            .contains("suspended"));
        assert!(tenant_access_error("expired", None, now).is_some());
    }

    #[test]
    fn creator_or_admin_may_modify() {
        let owner = Uuid::new_v4();
        let hr = AuthUser {
            id: owner,
            tenant_id: Some(Uuid::new_v4()),
            email: "a@b.c".into(),
            role: Role::HrUser,
        };
        assert!(hr.can_modify(Some(owner)));
        assert!(!hr.can_modify(Some(Uuid::new_v4())));
        assert!(!hr.can_modify(None));

        let admin = AuthUser {
            role: Role::TenantAdmin,
            ..hr
        };
        assert!(admin.can_modify(Some(Uuid::new_v4())));
    }
}
