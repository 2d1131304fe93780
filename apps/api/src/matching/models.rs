use axum::{
    extract::State,
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use super::fusion::{FusionWeights, LabelThresholds};
use crate::auth::AuthUser;
use crate::db::is_unique_violation;
use crate::errors::AppError;
use crate::extractors::{Json, Path, Query};
use crate::models::matching::MatchModelRow;
use crate::pagination::{Page, PageParams};
use crate::state::AppState;

/// Scoring profile stored in `match_models.config`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchModelConfig {
    pub vector_weight: f64,
    pub rule_weight: f64,
    pub llm_weight: f64,
    #[serde(default)]
    pub org_weight: f64,
    #[serde(default)]
    pub thresholds: LabelThresholds,
}

impl MatchModelConfig {
    pub fn weights(&self) -> FusionWeights {
        FusionWeights {
            vector_weight: self.vector_weight,
            rule_weight: self.rule_weight,
            llm_weight: self.llm_weight,
            org_weight: self.org_weight,
        }
    }

    pub fn from_value(value: &Value) -> Result<Self, String> {
        let config: MatchModelConfig =
            serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
        config.weights().validate()?;
        config.thresholds.validate()?;
        Ok(config)
    }

    fn to_value(self) -> Result<Value, AppError> {
        serde_json::to_value(self).map_err(|e| AppError::Internal(e.into()))
    }
}

/// A match model that is usable for scoring.
#[derive(Debug, Clone)]
pub struct SelectedModel {
    pub id: Uuid,
    pub config: MatchModelConfig,
}

/// The model to score with: the requested one, else the tenant's active
/// default, else none.
pub async fn select_match_model(
    state: &AppState,
    tenant_id: Uuid,
    requested: Option<Uuid>,
) -> Result<Option<SelectedModel>, AppError> {
    if let Some(model_id) = requested {
        let row = fetch_model(state, tenant_id, model_id).await?;
        if !row.is_active {
            return Err(AppError::Validation(format!(
                "Match model '{}' is inactive",
                row.name
            )));
        }
        let config = MatchModelConfig::from_value(&row.config).map_err(|e| {
            AppError::Validation(format!("Match model '{}' has an invalid config: {e}", row.name))
        })?;
        return Ok(Some(SelectedModel { id: row.id, config }));
    }

    let default = sqlx::query_as::<_, MatchModelRow>(
        "SELECT * FROM match_models WHERE tenant_id = $1 AND is_default AND is_active",
    )
    .bind(tenant_id)
    .fetch_optional(&state.db)
    .await?;

    Ok(default.and_then(|row| match MatchModelConfig::from_value(&row.config) {
        Ok(config) => Some(SelectedModel { id: row.id, config }),
        Err(e) => {
            warn!("Ignoring default match model {} with invalid config: {e}", row.id);
            None
        }
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// CRUD
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ModelListQuery {
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMatchModelRequest {
    pub name: String,
    pub description: Option<String>,
    pub config: Value,
    #[serde(default)]
    pub is_default: bool,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMatchModelRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub config: Option<Value>,
    pub is_default: Option<bool>,
    pub is_active: Option<bool>,
}

fn validated_config(value: &Value) -> Result<Value, AppError> {
    MatchModelConfig::from_value(value)
        .map_err(|e| AppError::Validation(format!("Invalid match model config: {e}")))?
        .to_value()
}

async fn fetch_model(state: &AppState, tenant_id: Uuid, model_id: Uuid) -> Result<MatchModelRow, AppError> {
    sqlx::query_as::<_, MatchModelRow>("SELECT * FROM match_models WHERE id = $1 AND tenant_id = $2")
        .bind(model_id)
        .bind(tenant_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Match model {model_id} not found")))
}

async fn clear_defaults(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    keep: Option<Uuid>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE match_models SET is_default = FALSE, updated_at = NOW()
        WHERE tenant_id = $1 AND is_default AND ($2::uuid IS NULL OR id <> $2)
        "#,
    )
    .bind(tenant_id)
    .bind(keep)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn default_conflict(e: sqlx::Error) -> AppError {
    if is_unique_violation(&e) {
        AppError::Conflict("Another default match model was set concurrently".to_string())
    } else {
        e.into()
    }
}

/// GET /api/v1/jobs/match-models
pub async fn handle_list_models(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ModelListQuery>,
    Query(page): Query<PageParams>,
) -> Result<Json<Page<MatchModelRow>>, AppError> {
    let tenant_id = user.tenant_id()?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM match_models WHERE tenant_id = $1 AND ($2::bool IS NULL OR is_active = $2)",
    )
    .bind(tenant_id)
    .bind(query.is_active)
    .fetch_one(&state.db)
    .await?;

    let items = sqlx::query_as::<_, MatchModelRow>(
        r#"
        SELECT * FROM match_models
        WHERE tenant_id = $1 AND ($2::bool IS NULL OR is_active = $2)
        ORDER BY is_default DESC, created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(tenant_id)
    .bind(query.is_active)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Page::new(items, total, &page)))
}

/// POST /api/v1/jobs/match-models
pub async fn handle_create_model(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateMatchModelRequest>,
) -> Result<(StatusCode, Json<MatchModelRow>), AppError> {
    let tenant_id = user.tenant_id()?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Match model name is required".to_string()));
    }
    let config = validated_config(&req.config)?;

    let mut tx = state.db.begin().await?;
    if req.is_default {
        clear_defaults(&mut tx, tenant_id, None).await?;
    }
    let row = sqlx::query_as::<_, MatchModelRow>(
        r#"
        INSERT INTO match_models (id, tenant_id, name, description, config, is_default, is_active, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(name)
    .bind(&req.description)
    .bind(&config)
    .bind(req.is_default)
    .bind(req.is_active.unwrap_or(true))
    .bind(user.id)
    .fetch_one(&mut *tx)
    .await
    .map_err(default_conflict)?;
    tx.commit().await?;

    info!("User {} created match model {} (default={})", user.id, row.id, row.is_default);
    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/jobs/match-models/:id
pub async fn handle_get_model(
    State(state): State<AppState>,
    user: AuthUser,
    Path(model_id): Path<Uuid>,
) -> Result<Json<MatchModelRow>, AppError> {
    Ok(Json(fetch_model(&state, user.tenant_id()?, model_id).await?))
}

/// PUT /api/v1/jobs/match-models/:id
pub async fn handle_update_model(
    State(state): State<AppState>,
    user: AuthUser,
    Path(model_id): Path<Uuid>,
    Json(req): Json<UpdateMatchModelRequest>,
) -> Result<Json<MatchModelRow>, AppError> {
    let tenant_id = user.tenant_id()?;
    let existing = fetch_model(&state, tenant_id, model_id).await?;
    if !user.can_modify(existing.created_by) {
        return Err(AppError::forbidden());
    }
    if req.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::Validation("Match model name cannot be empty".to_string()));
    }
    let config = req.config.as_ref().map(validated_config).transpose()?;

    let mut tx = state.db.begin().await?;
    if req.is_default == Some(true) {
        clear_defaults(&mut tx, tenant_id, Some(model_id)).await?;
    }
    let row = sqlx::query_as::<_, MatchModelRow>(
        r#"
        UPDATE match_models SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            config = COALESCE($4, config),
            is_default = COALESCE($5, is_default),
            is_active = COALESCE($6, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(model_id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(req.description)
    .bind(config)
    .bind(req.is_default)
    .bind(req.is_active)
    .fetch_one(&mut *tx)
    .await
    .map_err(default_conflict)?;
    tx.commit().await?;

    Ok(Json(row))
}

/// DELETE /api/v1/jobs/match-models/:id
///
/// Existing matches keep their scores; their `match_model_id` becomes null.
pub async fn handle_delete_model(
    State(state): State<AppState>,
    user: AuthUser,
    Path(model_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let tenant_id = user.tenant_id()?;
    let existing = fetch_model(&state, tenant_id, model_id).await?;
    if !user.can_modify(existing.created_by) {
        return Err(AppError::forbidden());
    }

    sqlx::query("DELETE FROM match_models WHERE id = $1")
        .bind(model_id)
        .execute(&state.db)
        .await?;
    info!("User {} deleted match model {model_id}", user.id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_defaults_org_weight_and_thresholds() {
        let config = MatchModelConfig::from_value(&json!({
            "vector_weight": 0.5, "rule_weight": 0.2, "llm_weight": 0.3
        }))
        .unwrap();
        assert_eq!(config.org_weight, 0.0);
        assert_eq!(config.thresholds, LabelThresholds::default());
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(MatchModelConfig::from_value(&json!({"vector_weight": 1.0})).is_err());
        assert!(MatchModelConfig::from_value(&json!({
            "vector_weight": 0, "rule_weight": 0, "llm_weight": 0
        }))
        .is_err());
        assert!(MatchModelConfig::from_value(&json!({
            "vector_weight": 0.3, "rule_weight": 0.3, "llm_weight": 0.4,
            "thresholds": {"strongly_recommended": 5, "recommended": 6, "cautious": 4}
        }))
        .is_err());
    }

    #[test]
    fn validated_config_is_normalized() {
        let value = validated_config(&json!({
            "vector_weight": 0.3, "rule_weight": 0.2, "llm_weight": 0.5
        }))
        .unwrap();
        assert_eq!(value["org_weight"], 0.0);
        assert_eq!(value["thresholds"]["recommended"], 6.0);
    }
}
