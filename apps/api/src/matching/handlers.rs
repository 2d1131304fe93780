use std::collections::BTreeMap;

use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::service::{ensure_matchable, match_resume_to_job, MatchDetail, MatchOutcome, MatchRequest};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extractors::{Json, Path, Query};
use crate::jobs::handlers::fetch_job;
use crate::models::matching::{MatchLabel, MatchListItem, MatchRow, MatchStatus};
use crate::pagination::{Page, PageParams};
use crate::state::AppState;
use crate::storage::{get_json, StorageError};

pub const MAX_BATCH_SIZE: usize = 50;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MatchResumeRequest {
    pub resume_id: Uuid,
    pub job_id: Uuid,
    pub match_model_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct BatchMatchRequest {
    pub job_id: Uuid,
    pub resume_ids: Vec<Uuid>,
    pub match_model_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct BatchItem {
    pub resume_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchMatchResponse {
    pub job_id: Uuid,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub label_counts: BTreeMap<String, usize>,
    pub results: Vec<BatchItem>,
}

#[derive(Debug, Deserialize)]
pub struct MatchListQuery {
    pub job_id: Option<Uuid>,
    pub resume_id: Option<Uuid>,
    pub label: Option<MatchLabel>,
    pub status: Option<MatchStatus>,
}

#[derive(Debug, Serialize)]
pub struct MatchResultDetail {
    #[serde(flatten)]
    pub record: MatchRow,
    pub detail: Option<MatchDetail>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMatchStatusRequest {
    pub status: MatchStatus,
}

/// Request ids in first-seen order with duplicates dropped, bounded to
/// `1..=MAX_BATCH_SIZE`.
fn batch_ids(ids: &[Uuid]) -> Result<Vec<Uuid>, AppError> {
    let mut seen = std::collections::HashSet::new();
    let unique: Vec<Uuid> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
    if unique.is_empty() {
        return Err(AppError::Validation("resume_ids must not be empty".to_string()));
    }
    if unique.len() > MAX_BATCH_SIZE {
        return Err(AppError::Validation(format!(
            "At most {MAX_BATCH_SIZE} resumes can be matched per batch"
        )));
    }
    Ok(unique)
}

fn summarize(job_id: Uuid, results: Vec<BatchItem>) -> BatchMatchResponse {
    let mut label_counts: BTreeMap<String, usize> = MatchLabel::ALL
        .iter()
        .map(|label| (label.as_str().to_string(), 0))
        .collect();
    for label in results.iter().filter_map(|r| r.label.as_deref()) {
        *label_counts.entry(label.to_string()).or_default() += 1;
    }
    let succeeded = results.iter().filter(|r| r.success).count();

    BatchMatchResponse {
        job_id,
        total: results.len(),
        succeeded,
        failed: results.len() - succeeded,
        label_counts,
        results,
    }
}

pub async fn fetch_match(state: &AppState, tenant_id: Uuid, match_id: Uuid) -> Result<MatchRow, AppError> {
    sqlx::query_as::<_, MatchRow>(
        "SELECT * FROM resume_job_matches WHERE id = $1 AND tenant_id = $2",
    )
    .bind(match_id)
    .bind(tenant_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Match {match_id} not found")))
}

/// The stored detail document, or `None` when it was never written or is gone.
pub async fn load_match_detail(state: &AppState, record: &MatchRow) -> Result<Option<MatchDetail>, AppError> {
    let Some(key) = record.detail_key.as_deref() else {
        return Ok(None);
    };
    match get_json(state.documents.as_ref(), key).await {
        Ok(detail) => Ok(Some(detail)),
        Err(StorageError::NotFound(_)) => {
            warn!("Detail document for match {} is missing", record.id);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Matching
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/matching/match
pub async fn handle_match(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<MatchResumeRequest>,
) -> Result<Json<MatchOutcome>, AppError> {
    let outcome = match_resume_to_job(
        &state,
        MatchRequest {
            tenant_id: user.tenant_id()?,
            user_id: user.id,
            resume_id: req.resume_id,
            job_id: req.job_id,
            match_model_id: req.match_model_id,
        },
    )
    .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/matching/batch
///
/// Resumes are matched one after another; one failure does not stop the rest.
pub async fn handle_batch_match(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<BatchMatchRequest>,
) -> Result<Json<BatchMatchResponse>, AppError> {
    let tenant_id = user.tenant_id()?;
    let resume_ids = batch_ids(&req.resume_ids)?;
    let job = fetch_job(&state, tenant_id, req.job_id).await?;
    ensure_matchable(&job)?;

    let mut results = Vec::with_capacity(resume_ids.len());
    for resume_id in resume_ids {
        let request = MatchRequest {
            tenant_id,
            user_id: user.id,
            resume_id,
            job_id: job.id,
            match_model_id: req.match_model_id,
        };
        let item = match match_resume_to_job(&state, request).await {
            Ok(outcome) => BatchItem {
                resume_id,
                success: true,
                match_id: Some(outcome.record.id),
                score: Some(outcome.record.score),
                label: Some(outcome.record.label),
                error: None,
            },
            Err(e) => {
                warn!("Batch match of resume {resume_id} to job {} failed: {e}", job.id);
                BatchItem {
                    resume_id,
                    success: false,
                    match_id: None,
                    score: None,
                    label: None,
                    error: Some(e.to_string()),
                }
            }
        };
        results.push(item);
    }

    let response = summarize(job.id, results);
    info!(
        "User {} batch-matched {} resumes to job {}: {} ok, {} failed",
        user.id, response.total, job.id, response.succeeded, response.failed
    );
    Ok(Json(response))
}

// ────────────────────────────────────────────────────────────────────────────
// Results
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/matching/results
pub async fn handle_list_results(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<MatchListQuery>,
    Query(page): Query<PageParams>,
) -> Result<Json<Page<MatchListItem>>, AppError> {
    let tenant_id = user.tenant_id()?;
    let label = query.label.map(|l| l.as_str());
    let status = query.status.map(|s| s.as_str());

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM resume_job_matches
        WHERE tenant_id = $1
          AND ($2::uuid IS NULL OR job_id = $2)
          AND ($3::uuid IS NULL OR resume_id = $3)
          AND ($4::text IS NULL OR label = $4)
          AND ($5::text IS NULL OR status = $5)
        "#,
    )
    .bind(tenant_id)
    .bind(query.job_id)
    .bind(query.resume_id)
    .bind(label)
    .bind(status)
    .fetch_one(&state.db)
    .await?;

    let items = sqlx::query_as::<_, MatchListItem>(
        r#"
        SELECT m.id, m.resume_id, m.job_id, m.score, m.label, m.status,
               r.candidate_name, j.title AS job_title, m.created_at, m.updated_at
        FROM resume_job_matches m
        JOIN resumes r ON r.id = m.resume_id
        JOIN job_positions j ON j.id = m.job_id
        WHERE m.tenant_id = $1
          AND ($2::uuid IS NULL OR m.job_id = $2)
          AND ($3::uuid IS NULL OR m.resume_id = $3)
          AND ($4::text IS NULL OR m.label = $4)
          AND ($5::text IS NULL OR m.status = $5)
        ORDER BY m.score DESC, m.updated_at DESC
        LIMIT $6 OFFSET $7
        "#,
    )
    .bind(tenant_id)
    .bind(query.job_id)
    .bind(query.resume_id)
    .bind(label)
    .bind(status)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Page::new(items, total, &page)))
}

/// GET /api/v1/matching/results/:id
pub async fn handle_get_result(
    State(state): State<AppState>,
    user: AuthUser,
    Path(match_id): Path<Uuid>,
) -> Result<Json<MatchResultDetail>, AppError> {
    let record = fetch_match(&state, user.tenant_id()?, match_id).await?;
    let detail = load_match_detail(&state, &record).await?;
    Ok(Json(MatchResultDetail { record, detail }))
}

/// PUT /api/v1/matching/results/:id/status
pub async fn handle_update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(match_id): Path<Uuid>,
    Json(req): Json<UpdateMatchStatusRequest>,
) -> Result<Json<MatchRow>, AppError> {
    let tenant_id = user.tenant_id()?;
    fetch_match(&state, tenant_id, match_id).await?;

    let record = sqlx::query_as::<_, MatchRow>(
        "UPDATE resume_job_matches SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(match_id)
    .bind(req.status.as_str())
    .fetch_one(&state.db)
    .await?;

    info!("User {} set match {match_id} to {}", user.id, req.status);
    Ok(Json(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batch_ids_are_deduplicated_and_bounded() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(batch_ids(&[a, b, a]).unwrap(), vec![a, b]);
        assert!(batch_ids(&[]).is_err());

        let many: Vec<Uuid> = (0..=MAX_BATCH_SIZE).map(|_| Uuid::new_v4()).collect();
        assert!(batch_ids(&many).is_err());
        assert!(batch_ids(&many[..MAX_BATCH_SIZE]).is_ok());
    }

    #[test]
    fn summary_counts_every_label() {
        let ok = |label: &str| BatchItem {
            resume_id: Uuid::new_v4(),
            success: true,
            match_id: Some(Uuid::new_v4()),
            score: Some(7.0),
            label: Some(label.to_string()),
            error: None,
        };
        let failed = BatchItem {
            resume_id: Uuid::new_v4(),
            success: false,
            match_id: None,
            score: None,
            label: None,
            error: Some("Resume has not been parsed".into()),
        };

        let response = summarize(
            Uuid::nil(),
            vec![ok("recommended"), ok("recommended"), ok("cautious"), failed],
        );
        assert_eq!(response.total, 4);
        assert_eq!(response.succeeded, 3);
        assert_eq!(response.failed, 1);
        assert_eq!(response.label_counts["recommended"], 2);
        assert_eq!(response.label_counts["strongly_recommended"], 0);
        assert_eq!(response.label_counts.len(), MatchLabel::ALL.len());
    }

    #[test]
    fn status_request_rejects_unknown_values() {
        assert!(serde_json::from_value::<UpdateMatchStatusRequest>(json!({"status": "accepted"})).is_ok());
        assert!(serde_json::from_value::<UpdateMatchStatusRequest>(json!({"status": "hired"})).is_err());
    }
}
