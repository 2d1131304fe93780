// Authentication: JWT access/refresh tokens, Argon2 passwords, request extractors
// and the Redis-backed login limiter.

pub mod extractor;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod rate_limit;

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::Role;

pub use extractor::{AuthUser, PlatformAdmin, TenantAdmin};

/// Trims and lowercases an email and rejects obviously malformed input.
pub fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(AppError::Validation(format!("'{}' is not a valid email", raw.trim())));
    }
    Ok(email)
}

/// Creates the first platform admin when none exists yet.
pub async fn ensure_platform_admin(db: &PgPool, email: &str, password: &str) -> anyhow::Result<()> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = $1")
        .bind(Role::PlatformAdmin.as_str())
        .fetch_one(db)
        .await?;
    if existing > 0 {
        return Ok(());
    }

    let email = normalize_email(email).map_err(|e| anyhow::anyhow!("{e}"))?;
    password::validate_password_strength(password).map_err(|e| anyhow::anyhow!("{e}"))?;
    let hash = password::hash_password(password).map_err(|e| anyhow::anyhow!("{e}"))?;

    sqlx::query(
        "INSERT INTO users (id, tenant_id, email, password_hash, full_name, role) \
         VALUES ($1, NULL, $2, $3, 'Platform Admin', $4)",
    )
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(hash)
    .bind(Role::PlatformAdmin.as_str())
    .execute(db)
    .await?;

    info!("Bootstrapped platform admin {email}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  HR@Acme.COM ").unwrap(), "hr@acme.com");
    }

    #[test]
    fn malformed_emails_are_rejected() {
        for bad in ["", "plain", "@acme.com", "a@acme", "a@.com", "a b@acme.com"] {
            assert!(normalize_email(bad).is_err(), "{bad} should be rejected");
        }
    }
}
