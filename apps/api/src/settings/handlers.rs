use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::secrets::mask_secret;
use super::store::{delete_setting, load_provider_settings, upsert_setting, SettingWrite, LLM_CATEGORY};
use crate::auth::PlatformAdmin;
use crate::errors::AppError;
use crate::extractors::Json;
use crate::llm_client::providers::{ProviderKind, ProviderSettings, PROVIDERS};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProviderConfigView {
    pub provider: ProviderKind,
    pub display_name: &'static str,
    pub enabled: bool,
    pub has_api_key: bool,
    pub api_key_masked: Option<String>,
    pub base_url: Option<String>,
    pub model_name: Option<String>,
    pub embedding_model: Option<String>,
    pub default_base_url: &'static str,
    pub default_model: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SystemConfigResponse {
    pub default_provider: ProviderKind,
    pub providers: Vec<ProviderConfigView>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProviderConfigRequest {
    pub provider: ProviderKind,
    pub enabled: Option<bool>,
    /// Empty string removes the stored key.
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model_name: Option<String>,
    pub embedding_model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SystemStats {
    pub tenants: i64,
    pub active_tenants: i64,
    pub users: i64,
    pub jobs: i64,
    pub published_jobs: i64,
    pub resumes: i64,
    pub matches: i64,
    pub reports: i64,
}

fn provider_view(kind: ProviderKind, settings: &ProviderSettings) -> ProviderConfigView {
    let spec = kind.spec();
    ProviderConfigView {
        provider: kind,
        display_name: spec.display_name,
        enabled: settings.enabled,
        has_api_key: settings.api_key.is_some(),
        api_key_masked: settings.api_key.as_deref().map(mask_secret),
        base_url: settings.base_url.clone(),
        model_name: settings.model_name.clone(),
        embedding_model: settings.embedding_model.clone(),
        default_base_url: spec.default_base_url,
        default_model: spec.default_model,
    }
}

async fn system_config(state: &AppState) -> Result<SystemConfigResponse, AppError> {
    let settings = load_provider_settings(&state.db, &state.secrets).await?;
    let providers = PROVIDERS
        .iter()
        .map(|p| {
            let current = settings.get(&p.kind).cloned().unwrap_or_default();
            provider_view(p.kind, &current)
        })
        .collect();

    Ok(SystemConfigResponse {
        default_provider: state.config.llm_default_provider,
        providers,
    })
}

/// GET /api/v1/admin/system/config
pub async fn handle_get_system_config(
    State(state): State<AppState>,
    PlatformAdmin(_admin): PlatformAdmin,
) -> Result<Json<SystemConfigResponse>, AppError> {
    Ok(Json(system_config(&state).await?))
}

/// PUT /api/v1/admin/system/config
///
/// Only fields present in the body are written. A blank text field clears
/// the override and falls back to the registry default.
pub async fn handle_update_system_config(
    State(state): State<AppState>,
    PlatformAdmin(admin): PlatformAdmin,
    Json(req): Json<UpdateProviderConfigRequest>,
) -> Result<Json<SystemConfigResponse>, AppError> {
    let kind = req.provider;
    let mut tx = state.db.begin().await?;

    if let Some(enabled) = req.enabled {
        let key = kind.setting_key("enabled");
        upsert_setting(
            &mut *tx,
            SettingWrite {
                key: &key,
                value: if enabled { "true" } else { "false" },
                is_encrypted: false,
                category: LLM_CATEGORY,
                description: Some("Provider enabled flag"),
                updated_by: Some(admin.id),
            },
        )
        .await?;
    }

    if let Some(api_key) = req.api_key.as_deref().map(str::trim) {
        let key = kind.setting_key("api_key");
        if api_key.is_empty() {
            delete_setting(&mut *tx, &key).await?;
        } else {
            let encrypted = state
                .secrets
                .encrypt(api_key)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to encrypt key: {e}")))?;
            upsert_setting(
                &mut *tx,
                SettingWrite {
                    key: &key,
                    value: &encrypted,
                    is_encrypted: true,
                    category: LLM_CATEGORY,
                    description: Some("Provider API key"),
                    updated_by: Some(admin.id),
                },
            )
            .await?;
        }
    }

    let plain_fields = [
        ("base_url", req.base_url.as_deref()),
        ("model_name", req.model_name.as_deref()),
        ("embedding_model", req.embedding_model.as_deref()),
    ];
    for (field, value) in plain_fields {
        let Some(value) = value.map(str::trim) else {
            continue;
        };
        let key = kind.setting_key(field);
        if value.is_empty() {
            delete_setting(&mut *tx, &key).await?;
        } else {
            upsert_setting(
                &mut *tx,
                SettingWrite {
                    key: &key,
                    value,
                    is_encrypted: false,
                    category: LLM_CATEGORY,
                    description: None,
                    updated_by: Some(admin.id),
                },
            )
            .await?;
        }
    }

    tx.commit().await?;
    info!("Platform admin {} updated {kind} provider settings", admin.id);

    Ok(Json(system_config(&state).await?))
}

/// GET /api/v1/admin/system/stats
pub async fn handle_system_stats(
    State(state): State<AppState>,
    PlatformAdmin(_admin): PlatformAdmin,
) -> Result<Json<SystemStats>, AppError> {
    let stats = sqlx::query_as::<_, (i64, i64, i64, i64, i64, i64, i64, i64)>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM tenants),
            (SELECT COUNT(*) FROM tenants WHERE status = 'active'),
            (SELECT COUNT(*) FROM users),
            (SELECT COUNT(*) FROM job_positions),
            (SELECT COUNT(*) FROM job_positions WHERE status = 'published'),
            (SELECT COUNT(*) FROM resumes),
            (SELECT COUNT(*) FROM resume_job_matches),
            (SELECT COUNT(*) FROM reports)
        "#,
    )
    .fetch_one(&state.db)
    .await?;

    Ok(Json(SystemStats {
        tenants: stats.0,
        active_tenants: stats.1,
        users: stats.2,
        jobs: stats.3,
        published_jobs: stats.4,
        resumes: stats.5,
        matches: stats.6,
        reports: stats.7,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_masks_key_and_exposes_registry_defaults() {
        let settings = ProviderSettings {
            api_key: Some("sk-abcdef123456".into()),
            enabled: true,
            ..Default::default()
        };
        let view = provider_view(ProviderKind::Qwen, &settings);
        assert!(view.has_api_key);
        assert_eq!(view.api_key_masked.as_deref(), Some("sk-a****3456"));
        assert_eq!(view.default_model, "qwen3-next-80b-a3b-instruct");
        assert!(view.base_url.is_none());
    }

    #[test]
    fn view_without_key() {
        let view = provider_view(ProviderKind::DeepSeek, &ProviderSettings::default());
        assert!(!view.has_api_key);
        assert!(view.api_key_masked.is_none());
        assert_eq!(view.display_name, "DeepSeek");
    }
}
