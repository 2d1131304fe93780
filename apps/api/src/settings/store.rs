use std::collections::HashMap;

use sqlx::{PgExecutor, PgPool};
use tracing::warn;
use uuid::Uuid;

use super::secrets::SecretBox;
use crate::errors::AppError;
use crate::llm_client::providers::{ProviderKind, ProviderSettings, PROVIDERS};
use crate::models::settings::SystemSettingRow;

pub const LLM_CATEGORY: &str = "llm";

/// Loads every setting under `prefix` as plaintext. Values that fail to
/// decrypt are skipped with a warning rather than failing the request.
pub async fn load_values(
    db: &PgPool,
    secrets: &SecretBox,
    prefix: &str,
) -> Result<HashMap<String, String>, AppError> {
    let rows = sqlx::query_as::<_, SystemSettingRow>(
        "SELECT * FROM system_settings WHERE key LIKE $1 || '%'",
    )
    .bind(prefix)
    .fetch_all(db)
    .await?;

    let mut values = HashMap::with_capacity(rows.len());
    for row in rows {
        let value = if row.is_encrypted {
            match secrets.decrypt(&row.value) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Skipping setting {}: {e}", row.key);
                    continue;
                }
            }
        } else {
            row.value
        };
        values.insert(row.key, value);
    }
    Ok(values)
}

pub async fn load_provider_settings(
    db: &PgPool,
    secrets: &SecretBox,
) -> Result<HashMap<ProviderKind, ProviderSettings>, AppError> {
    let values = load_values(db, secrets, "llm.").await?;
    Ok(PROVIDERS
        .iter()
        .map(|p| (p.kind, ProviderSettings::from_map(p.kind, &values)))
        .collect())
}

pub struct SettingWrite<'a> {
    pub key: &'a str,
    pub value: &'a str,
    pub is_encrypted: bool,
    pub category: &'a str,
    pub description: Option<&'a str>,
    pub updated_by: Option<Uuid>,
}

pub async fn upsert_setting<'e, E: PgExecutor<'e>>(
    executor: E,
    setting: SettingWrite<'_>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO system_settings (key, value, is_encrypted, category, description, updated_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (key) DO UPDATE SET
            value = EXCLUDED.value,
            is_encrypted = EXCLUDED.is_encrypted,
            category = EXCLUDED.category,
            description = COALESCE(EXCLUDED.description, system_settings.description),
            updated_by = EXCLUDED.updated_by,
            updated_at = NOW()
        "#,
    )
    .bind(setting.key)
    .bind(setting.value)
    .bind(setting.is_encrypted)
    .bind(setting.category)
    .bind(setting.description)
    .bind(setting.updated_by)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn delete_setting<'e, E: PgExecutor<'e>>(executor: E, key: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM system_settings WHERE key = $1")
        .bind(key)
        .execute(executor)
        .await?;
    Ok(())
}
