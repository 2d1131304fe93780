use rand::RngCore;

use crate::errors::AppError;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

/// Argon2 encoded hash with a random 16-byte salt.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    argon2::hash_encoded(password.as_bytes(), &salt, &argon2::Config::default())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

/// A malformed stored hash verifies as false.
pub fn verify_password(encoded_hash: &str, password: &str) -> bool {
    argon2::verify_encoded(encoded_hash, password.as_bytes()).unwrap_or(false)
}

pub fn validate_password_strength(password: &str) -> Result<(), AppError> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if length > MAX_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at most {MAX_PASSWORD_LEN} characters"
        )));
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err(AppError::Validation(
            "Password must contain at least one letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(
            "Password must contain at least one digit".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_only_the_original_password() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "hunter22"));
        assert!(!verify_password(&hash, "hunter23"));
    }

    #[test]
    fn salts_make_hashes_unique() {
        assert_ne!(hash_password("same1234").unwrap(), hash_password("same1234").unwrap());
    }

    #[test]
    fn malformed_hash_does_not_verify() {
        assert!(!verify_password("not-a-hash", "whatever1"));
    }

    #[test]
    fn strength_rules() {
        assert!(validate_password_strength("abc12345").is_ok());
        assert!(validate_password_strength("abc1234").is_err());
        assert!(validate_password_strength("abcdefgh").is_err());
        assert!(validate_password_strength("12345678").is_err());
        assert!(validate_password_strength(&format!("a1{}", "x".repeat(127))).is_err());
    }
}
