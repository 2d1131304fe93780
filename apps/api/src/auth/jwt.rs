use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::user::UserRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub tenant_id: Option<Uuid>,
    pub role: String,
    pub typ: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

pub fn issue_token(
    secret: &str,
    user: &UserRow,
    kind: TokenKind,
    ttl_secs: i64,
) -> Result<String, AppError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user.id,
        tenant_id: user.tenant_id,
        role: user.role.clone(),
        typ: kind,
        iat: now,
        exp: now + ttl_secs,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to sign token: {e}")))
}

pub fn issue_pair(config: &Config, user: &UserRow) -> Result<TokenPair, AppError> {
    let access_ttl = config.access_token_ttl_minutes * 60;
    let refresh_ttl = config.refresh_token_ttl_days * 24 * 60 * 60;
    Ok(TokenPair {
        access_token: issue_token(&config.jwt_secret, user, TokenKind::Access, access_ttl)?,
        refresh_token: issue_token(&config.jwt_secret, user, TokenKind::Refresh, refresh_ttl)?,
        token_type: "bearer",
        expires_in: access_ttl,
    })
}

/// Verifies signature and expiry and checks the token is of the expected kind.
pub fn decode_token(secret: &str, token: &str, expected: TokenKind) -> Result<Claims, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {e}")))?;

    if data.claims.typ != expected {
        return Err(AppError::Unauthorized("Wrong token type".to_string()));
    }
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserRow {
        UserRow {
            id: Uuid::new_v4(),
            tenant_id: Some(Uuid::new_v4()),
            email: "hr@acme.test".into(),
            password_hash: String::new(),
            full_name: None,
            role: "hr_user".into(),
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn access_token_round_trips() {
        let user = user();
        let token = issue_token("secret", &user, TokenKind::Access, 600).unwrap();
        let claims = decode_token("secret", &token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.tenant_id, user.tenant_id);
        assert_eq!(claims.role, "hr_user");
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let token = issue_token("secret", &user(), TokenKind::Refresh, 600).unwrap();
        assert!(decode_token("secret", &token, TokenKind::Access).is_err());
        assert!(decode_token("secret", &token, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_token("secret", &user(), TokenKind::Access, -3600).unwrap();
        assert!(decode_token("secret", &token, TokenKind::Access).is_err());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = issue_token("secret", &user(), TokenKind::Access, 600).unwrap();
        assert!(decode_token("other", &token, TokenKind::Access).is_err());
    }
}
