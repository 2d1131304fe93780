//! At-rest encryption for provider API keys (system settings and per-user configs).
//!
//! AES-256-GCM with a key derived from `SETTINGS_ENCRYPTION_KEY` via SHA-256.
//! Stored form: base64(nonce || ciphertext).

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("encrypted value is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("encrypted value is truncated")]
    Truncated,

    #[error("encryption or authentication failed")]
    Cipher,

    #[error("decrypted value is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Clone)]
pub struct SecretBox {
    key: [u8; 32],
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretBox(..)")
    }
}

impl SecretBox {
    pub fn new(passphrase: &str) -> Self {
        Self {
            key: Sha256::digest(passphrase.as_bytes()).into(),
        }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, SecretError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher()
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| SecretError::Cipher)?;

        let mut packed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        packed.extend_from_slice(&nonce);
        packed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(packed))
    }

    pub fn decrypt(&self, token: &str) -> Result<String, SecretError> {
        let packed = STANDARD.decode(token.trim())?;
        if packed.len() <= NONCE_LEN {
            return Err(SecretError::Truncated);
        }
        let (nonce, ciphertext) = packed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()
            .decrypt(GenericArray::from_slice(nonce), ciphertext)
            .map_err(|_| SecretError::Cipher)?;
        Ok(String::from_utf8(plaintext)?)
    }
}

/// `sk-abcdef123456` → `sk-a****3456`; short keys are fully hidden.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_returns_plaintext() {
        let secrets = SecretBox::new("passphrase");
        let token = secrets.encrypt("sk-live-123").unwrap();
        assert_ne!(token, "sk-live-123");
        assert_eq!(secrets.decrypt(&token).unwrap(), "sk-live-123");
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let secrets = SecretBox::new("passphrase");
        assert_ne!(
            secrets.encrypt("value").unwrap(),
            secrets.encrypt("value").unwrap()
        );
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let token = SecretBox::new("one").encrypt("value").unwrap();
        let err = SecretBox::new("two").decrypt(&token).unwrap_err();
        assert!(matches!(err, SecretError::Cipher));
    }

    #[test]
    fn garbage_input_is_rejected() {
        let secrets = SecretBox::new("passphrase");
        assert!(matches!(
            secrets.decrypt("not base64!").unwrap_err(),
            SecretError::Encoding(_)
        ));
        assert!(matches!(
            secrets.decrypt(&STANDARD.encode([1u8; 4])).unwrap_err(),
            SecretError::Truncated
        ));
    }

    #[test]
    fn masking_keeps_edges_of_long_keys() {
        assert_eq!(mask_secret("sk-abcdef123456"), "sk-a****3456");
        assert_eq!(mask_secret("short"), "****");
        assert_eq!(mask_secret("12345678"), "****");
    }
}
