//! Document store: original uploads, parsed resume payloads, job profiles,
//! match details and rendered reports.
//!
//! Handlers only see `Arc<dyn DocumentStore>`. Production wires the S3/MinIO
//! backend; tests use the in-memory one.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[cfg(test)]
pub mod memory;
pub mod s3;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("S3 request failed: {0}")]
    Backend(String),

    #[error("stored payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

pub async fn put_json<T: Serialize + ?Sized>(
    store: &dyn DocumentStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let body = serde_json::to_vec(value)?;
    store.put(key, body, "application/json").await
}

pub async fn get_json<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    key: &str,
) -> Result<T, StorageError> {
    let body = store.get(key).await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Deletes a key and logs instead of failing. Used when the owning row is
/// already gone and a leftover object is harmless.
pub async fn delete_quietly(store: &dyn DocumentStore, key: &str) {
    if let Err(e) = store.delete(key).await {
        tracing::warn!("Failed to delete document {key}: {e}");
    }
}

/// `delete_quietly` over many keys. Returns how many deletes succeeded.
pub async fn delete_all_quietly(store: &dyn DocumentStore, keys: &[String]) -> usize {
    let mut deleted = 0;
    for key in keys {
        match store.delete(key).await {
            Ok(()) => deleted += 1,
            Err(e) => tracing::warn!("Failed to delete document {key}: {e}"),
        }
    }
    deleted
}

// ────────────────────────────────────────────────────────────────────────────
// Key layout. Everything is namespaced by tenant so a tenant purge is a prefix.
// ────────────────────────────────────────────────────────────────────────────

pub mod keys {
    use super::Uuid;

    pub fn resume_file(tenant_id: Uuid, resume_id: Uuid, extension: &str) -> String {
        format!("tenants/{tenant_id}/resumes/{resume_id}/original.{extension}")
    }

    pub fn parsed_resume(tenant_id: Uuid, resume_id: Uuid) -> String {
        format!("tenants/{tenant_id}/resumes/{resume_id}/parsed.json")
    }

    pub fn job_profile(tenant_id: Uuid, job_id: Uuid) -> String {
        format!("tenants/{tenant_id}/jobs/{job_id}/profile.json")
    }

    pub fn match_detail(tenant_id: Uuid, match_id: Uuid) -> String {
        format!("tenants/{tenant_id}/matches/{match_id}/detail.json")
    }

    pub fn report_file(tenant_id: Uuid, report_id: Uuid) -> String {
        format!("tenants/{tenant_id}/reports/{report_id}.docx")
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryDocumentStore;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn json_helpers_round_trip_through_store() {
        let store = MemoryDocumentStore::default();
        put_json(&store, "a/b.json", &json!({"score": 7.5}))
            .await
            .unwrap();
        let value: serde_json::Value = get_json(&store, "a/b.json").await.unwrap();
        assert_eq!(value["score"], 7.5);
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = MemoryDocumentStore::default();
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn tenant_purge_removes_every_listed_object() {
        let store = MemoryDocumentStore::default();
        let tenant = Uuid::new_v4();
        let other = Uuid::new_v4();
        let owned = vec![
            keys::resume_file(tenant, Uuid::new_v4(), "pdf"),
            keys::parsed_resume(tenant, Uuid::new_v4()),
            keys::job_profile(tenant, Uuid::new_v4()),
            keys::match_detail(tenant, Uuid::new_v4()),
            keys::report_file(tenant, Uuid::new_v4()),
        ];
        let foreign = keys::report_file(other, Uuid::new_v4());
        for key in owned.iter().chain(std::iter::once(&foreign)) {
            store.put(key, b"x".to_vec(), "application/octet-stream").await.unwrap();
        }

        assert_eq!(delete_all_quietly(&store, &owned).await, owned.len());
        for key in &owned {
            assert!(matches!(store.get(key).await, Err(StorageError::NotFound(_))));
        }
        assert!(store.get(&foreign).await.is_ok());
    }

    #[test]
    fn keys_are_tenant_namespaced() {
        let tenant = Uuid::nil();
        let key = keys::report_file(tenant, Uuid::nil());
        assert!(key.starts_with(&format!("tenants/{tenant}/reports/")));
        assert!(key.ends_with(".docx"));
    }
}
