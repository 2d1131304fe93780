use axum::{
    extract::State,
    http::StatusCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use super::engine::{evaluate, FilterOutcome, RuleConfig};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extractors::{Json, Path, Query};
use crate::models::filter_rule::{FilterRuleRow, LogicOperator, RuleType};
use crate::pagination::{Page, PageParams};
use crate::resumes::handlers::{fetch_resume, load_resume_document};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RuleListQuery {
    pub rule_type: Option<RuleType>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub name: String,
    pub description: Option<String>,
    pub rule_type: RuleType,
    pub rule_config: Value,
    pub logic_operator: Option<LogicOperator>,
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRuleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub rule_type: Option<RuleType>,
    pub rule_config: Option<Value>,
    pub logic_operator: Option<LogicOperator>,
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteFilterRequest {
    pub resume_id: Uuid,
    pub rule_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
pub struct ExecuteFilterResponse {
    pub resume_id: Uuid,
    #[serde(flatten)]
    pub outcome: FilterOutcome,
}

fn validate_config(rule_type: RuleType, config: &Value) -> Result<(), AppError> {
    RuleConfig::parse(rule_type, config)
        .map(|_| ())
        .map_err(|e| AppError::Validation(format!("Invalid {rule_type} rule_config: {e}")))
}

/// Every active rule of the tenant, highest priority first.
pub async fn load_active_rules(db: &PgPool, tenant_id: Uuid) -> Result<Vec<FilterRuleRow>, AppError> {
    Ok(sqlx::query_as::<_, FilterRuleRow>(
        "SELECT * FROM filter_rules WHERE tenant_id = $1 AND is_active ORDER BY priority DESC, created_at",
    )
    .bind(tenant_id)
    .fetch_all(db)
    .await?)
}

async fn fetch_rule(state: &AppState, tenant_id: Uuid, rule_id: Uuid) -> Result<FilterRuleRow, AppError> {
    sqlx::query_as::<_, FilterRuleRow>("SELECT * FROM filter_rules WHERE id = $1 AND tenant_id = $2")
        .bind(rule_id)
        .bind(tenant_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Filter rule {rule_id} not found")))
}

/// GET /api/v1/jobs/filter-rules
pub async fn handle_list_rules(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<RuleListQuery>,
    Query(page): Query<PageParams>,
) -> Result<Json<Page<FilterRuleRow>>, AppError> {
    let tenant_id = user.tenant_id()?;
    let rule_type = query.rule_type.map(|t| t.as_str());

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM filter_rules
        WHERE tenant_id = $1
          AND ($2::text IS NULL OR rule_type = $2)
          AND ($3::bool IS NULL OR is_active = $3)
        "#,
    )
    .bind(tenant_id)
    .bind(rule_type)
    .bind(query.is_active)
    .fetch_one(&state.db)
    .await?;

    let items = sqlx::query_as::<_, FilterRuleRow>(
        r#"
        SELECT * FROM filter_rules
        WHERE tenant_id = $1
          AND ($2::text IS NULL OR rule_type = $2)
          AND ($3::bool IS NULL OR is_active = $3)
        ORDER BY priority DESC, created_at DESC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(tenant_id)
    .bind(rule_type)
    .bind(query.is_active)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Page::new(items, total, &page)))
}

/// POST /api/v1/jobs/filter-rules
pub async fn handle_create_rule(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<FilterRuleRow>), AppError> {
    let tenant_id = user.tenant_id()?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Rule name is required".to_string()));
    }
    validate_config(req.rule_type, &req.rule_config)?;

    let row = sqlx::query_as::<_, FilterRuleRow>(
        r#"
        INSERT INTO filter_rules (
            id, tenant_id, name, description, rule_type, rule_config,
            logic_operator, priority, is_active, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(name)
    .bind(&req.description)
    .bind(req.rule_type.as_str())
    .bind(&req.rule_config)
    .bind(req.logic_operator.unwrap_or(LogicOperator::And).as_str())
    .bind(req.priority.unwrap_or(0))
    .bind(req.is_active.unwrap_or(true))
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    info!("User {} created {} rule {}", user.id, req.rule_type, row.id);
    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/jobs/filter-rules/:id
pub async fn handle_get_rule(
    State(state): State<AppState>,
    user: AuthUser,
    Path(rule_id): Path<Uuid>,
) -> Result<Json<FilterRuleRow>, AppError> {
    Ok(Json(fetch_rule(&state, user.tenant_id()?, rule_id).await?))
}

/// PUT /api/v1/jobs/filter-rules/:id
pub async fn handle_update_rule(
    State(state): State<AppState>,
    user: AuthUser,
    Path(rule_id): Path<Uuid>,
    Json(req): Json<UpdateRuleRequest>,
) -> Result<Json<FilterRuleRow>, AppError> {
    let tenant_id = user.tenant_id()?;
    let existing = fetch_rule(&state, tenant_id, rule_id).await?;
    if !user.can_modify(existing.created_by) {
        return Err(AppError::forbidden());
    }

    if req.rule_type.is_some() || req.rule_config.is_some() {
        let rule_type = match req.rule_type {
            Some(t) => t,
            None => RuleType::parse(&existing.rule_type).ok_or_else(|| {
                AppError::Validation(format!("Stored rule type '{}' is unknown", existing.rule_type))
            })?,
        };
        validate_config(rule_type, req.rule_config.as_ref().unwrap_or(&existing.rule_config))?;
    }
    if req.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::Validation("Rule name cannot be empty".to_string()));
    }

    let row = sqlx::query_as::<_, FilterRuleRow>(
        r#"
        UPDATE filter_rules SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            rule_type = COALESCE($4, rule_type),
            rule_config = COALESCE($5, rule_config),
            logic_operator = COALESCE($6, logic_operator),
            priority = COALESCE($7, priority),
            is_active = COALESCE($8, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(rule_id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(req.description)
    .bind(req.rule_type.map(|t| t.as_str()))
    .bind(req.rule_config)
    .bind(req.logic_operator.map(|o| o.as_str()))
    .bind(req.priority)
    .bind(req.is_active)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(row))
}

/// DELETE /api/v1/jobs/filter-rules/:id
pub async fn handle_delete_rule(
    State(state): State<AppState>,
    user: AuthUser,
    Path(rule_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let tenant_id = user.tenant_id()?;
    let existing = fetch_rule(&state, tenant_id, rule_id).await?;
    if !user.can_modify(existing.created_by) {
        return Err(AppError::forbidden());
    }

    sqlx::query("DELETE FROM filter_rules WHERE id = $1")
        .bind(rule_id)
        .execute(&state.db)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Explicit rule ids when given (active ones only), otherwise every active rule.
async fn select_rules(
    db: &PgPool,
    tenant_id: Uuid,
    rule_ids: Option<&[Uuid]>,
) -> Result<Vec<FilterRuleRow>, AppError> {
    match rule_ids {
        Some([]) | None => load_active_rules(db, tenant_id).await,
        Some(ids) => Ok(sqlx::query_as::<_, FilterRuleRow>(
            "SELECT * FROM filter_rules WHERE tenant_id = $1 AND id = ANY($2) AND is_active",
        )
        .bind(tenant_id)
        .bind(ids)
        .fetch_all(db)
        .await?),
    }
}

/// POST /api/v1/jobs/filter/execute
pub async fn handle_execute_filter(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ExecuteFilterRequest>,
) -> Result<Json<ExecuteFilterResponse>, AppError> {
    let tenant_id = user.tenant_id()?;
    let resume = fetch_resume(&state, tenant_id, req.resume_id).await?;
    let document = load_resume_document(&state, &resume).await?;
    let rules = select_rules(&state.db, tenant_id, req.rule_ids.as_deref()).await?;

    let outcome = evaluate(&rules, &document, Utc::now().date_naive());
    info!(
        "Screened resume {} against {} rules: passed={}",
        resume.id,
        outcome.rule_details.len(),
        outcome.passed
    );

    Ok(Json(ExecuteFilterResponse {
        resume_id: resume.id,
        outcome,
    }))
}

pub const MAX_BATCH_RESUMES: usize = 50;

#[derive(Debug, Deserialize)]
pub struct BatchFilterRequest {
    pub resume_ids: Vec<Uuid>,
    pub rule_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
pub struct BatchFilterItem {
    pub resume_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<FilterOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct BatchFilterSummary {
    pub total: usize,
    pub succeeded: usize,
    pub passed: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct BatchFilterResponse {
    pub results: Vec<BatchFilterItem>,
    pub summary: BatchFilterSummary,
}

/// Order-preserving dedup, bounded to `MAX_BATCH_RESUMES`.
fn batch_resume_ids(ids: &[Uuid]) -> Result<Vec<Uuid>, AppError> {
    let mut unique = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(id) {
            unique.push(*id);
        }
    }
    if unique.is_empty() {
        return Err(AppError::Validation("resume_ids must not be empty".to_string()));
    }
    if unique.len() > MAX_BATCH_RESUMES {
        return Err(AppError::Validation(format!(
            "At most {MAX_BATCH_RESUMES} resumes per batch"
        )));
    }
    Ok(unique)
}

/// `failed` counts every resume that did not pass, including ones that errored.
fn summarize(results: &[BatchFilterItem]) -> BatchFilterSummary {
    let total = results.len();
    let succeeded = results.iter().filter(|r| r.success).count();
    let passed = results
        .iter()
        .filter(|r| r.outcome.as_ref().is_some_and(|o| o.passed))
        .count();
    BatchFilterSummary {
        total,
        succeeded,
        passed,
        failed: total - passed,
    }
}

/// POST /api/v1/jobs/filter/batch-execute
///
/// One failing resume is reported in its slot and does not abort the batch.
pub async fn handle_batch_execute_filter(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<BatchFilterRequest>,
) -> Result<Json<BatchFilterResponse>, AppError> {
    let tenant_id = user.tenant_id()?;
    let resume_ids = batch_resume_ids(&req.resume_ids)?;
    let rules = select_rules(&state.db, tenant_id, req.rule_ids.as_deref()).await?;
    let today = Utc::now().date_naive();

    let mut results = Vec::with_capacity(resume_ids.len());
    for resume_id in resume_ids {
        let screened = async {
            let resume = fetch_resume(&state, tenant_id, resume_id).await?;
            let document = load_resume_document(&state, &resume).await?;
            Ok::<_, AppError>(evaluate(&rules, &document, today))
        }
        .await;

        results.push(match screened {
            Ok(outcome) => BatchFilterItem {
                resume_id,
                success: true,
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => {
                warn!("Batch screening skipped resume {resume_id}: {e}");
                BatchFilterItem {
                    resume_id,
                    success: false,
                    outcome: None,
                    error: Some(e.to_string()),
                }
            }
        });
    }

    let summary = summarize(&results);
    info!(
        "Batch screened {} resumes against {} rules: {} passed",
        summary.total,
        rules.len(),
        summary.passed
    );
    Ok(Json(BatchFilterResponse { results, summary }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validation_error_names_the_rule_type() {
        let err = validate_config(RuleType::Skill, &json!({"locations": ["x"]})).unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.starts_with("Invalid skill rule_config")));
    }

    #[test]
    fn create_request_accepts_uppercase_logic() {
        let req: CreateRuleRequest = serde_json::from_value(json!({
            "name": "Shanghai only",
            "rule_type": "location",
            "rule_config": {"locations": ["上海"]},
            "logic_operator": "OR"
        }))
        .unwrap();
        assert_eq!(req.logic_operator, Some(LogicOperator::Or));
        assert!(validate_config(req.rule_type, &req.rule_config).is_ok());
    }

    fn item(success: bool, passed: Option<bool>) -> BatchFilterItem {
        BatchFilterItem {
            resume_id: Uuid::new_v4(),
            success,
            outcome: passed.map(|passed| FilterOutcome {
                passed,
                failed_rules: Vec::new(),
                rule_details: Vec::new(),
                summary: String::new(),
            }),
            error: (!success).then(|| "Resume not found".to_string()),
        }
    }

    #[test]
    fn batch_summary_counts_errors_as_failed() {
        let results = [
            item(true, Some(true)),
            item(true, Some(false)),
            item(false, None),
            item(true, Some(true)),
        ];
        assert_eq!(
            summarize(&results),
            BatchFilterSummary {
                total: 4,
                succeeded: 3,
                passed: 2,
                failed: 2,
            }
        );
    }

    #[test]
    fn batch_ids_are_deduplicated_in_order() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(batch_resume_ids(&[a, b, a]).unwrap(), vec![a, b]);
        assert!(matches!(batch_resume_ids(&[]), Err(AppError::Validation(_))));

        let too_many: Vec<Uuid> = (0..=MAX_BATCH_RESUMES).map(|_| Uuid::new_v4()).collect();
        assert!(matches!(batch_resume_ids(&too_many), Err(AppError::Validation(_))));
    }

    #[test]
    fn errored_items_omit_the_outcome() {
        let value = serde_json::to_value(item(false, None)).unwrap();
        assert_eq!(value["success"], false);
        assert!(value.get("outcome").is_none());
        assert_eq!(value["error"], "Resume not found");
    }
}
