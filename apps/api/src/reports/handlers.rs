use axum::{
    extract::State,
    http::StatusCode,
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::docx::{candidate_name, render_report, ReportContent, DOCX_CONTENT_TYPE};
use crate::auth::AuthUser;
use crate::download::attachment;
use crate::errors::AppError;
use crate::extractors::{Json, Path, Query};
use crate::jobs::handlers::fetch_job;
use crate::matching::handlers::{fetch_match, load_match_detail};
use crate::models::report::{ReportRow, ReportTemplate};
use crate::pagination::{Page, PageParams};
use crate::resumes::handlers::{fetch_resume, load_resume_document};
use crate::state::AppState;
use crate::storage::{delete_quietly, keys, StorageError};

#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    pub match_id: Uuid,
    pub template: Option<ReportTemplate>,
}

#[derive(Debug, Deserialize)]
pub struct ReportListQuery {
    pub match_id: Option<Uuid>,
}

/// `<candidate>_<job>_<date>.docx` with path and quote characters replaced.
fn report_file_name(candidate: &str, job_title: &str, date: chrono::NaiveDate) -> String {
    let clean = |s: &str| -> String {
        s.trim()
            .chars()
            .map(|c| match c {
                '/' | '\\' | '"' | ':' | '*' | '?' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect()
    };
    format!("{}_{}_{}.docx", clean(candidate), clean(job_title), date.format("%Y%m%d"))
}

async fn fetch_report(state: &AppState, tenant_id: Uuid, report_id: Uuid) -> Result<ReportRow, AppError> {
    sqlx::query_as::<_, ReportRow>("SELECT * FROM reports WHERE id = $1 AND tenant_id = $2")
        .bind(report_id)
        .bind(tenant_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Report {report_id} not found")))
}

/// POST /api/v1/reports
pub async fn handle_create_report(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateReportRequest>,
) -> Result<(StatusCode, Json<ReportRow>), AppError> {
    let tenant_id = user.tenant_id()?;
    let template = req.template.unwrap_or(ReportTemplate::Standard);

    let record = fetch_match(&state, tenant_id, req.match_id).await?;
    let detail = load_match_detail(&state, &record).await?.ok_or_else(|| {
        AppError::Validation(format!("Match {} has no stored detail; run the match again", record.id))
    })?;
    let resume = fetch_resume(&state, tenant_id, record.resume_id).await?;
    let document = load_resume_document(&state, &resume).await?;
    let job = fetch_job(&state, tenant_id, record.job_id).await?;

    let generated_at = Utc::now();
    let content = ReportContent {
        job_title: &job.title,
        resume: &document,
        detail: &detail,
        generated_at,
    };
    let bytes = render_report(&content, template).map_err(|e| AppError::Internal(e.into()))?;
    let file_size = bytes.len() as i64;
    let file_name = report_file_name(candidate_name(&document), &job.title, generated_at.date_naive());

    let report_id = Uuid::new_v4();
    let file_key = keys::report_file(tenant_id, report_id);
    state.documents.put(&file_key, bytes, DOCX_CONTENT_TYPE).await?;

    let inserted = sqlx::query_as::<_, ReportRow>(
        r#"
        INSERT INTO reports (id, tenant_id, match_id, template, file_key, file_name, file_size, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(report_id)
    .bind(tenant_id)
    .bind(record.id)
    .bind(template.as_str())
    .bind(&file_key)
    .bind(&file_name)
    .bind(file_size)
    .bind(user.id)
    .fetch_one(&state.db)
    .await;

    let row = match inserted {
        Ok(row) => row,
        Err(e) => {
            delete_quietly(state.documents.as_ref(), &file_key).await;
            return Err(e.into());
        }
    };

    info!("User {} generated {template} report {report_id} for match {}", user.id, record.id);
    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/reports
pub async fn handle_list_reports(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ReportListQuery>,
    Query(page): Query<PageParams>,
) -> Result<Json<Page<ReportRow>>, AppError> {
    let tenant_id = user.tenant_id()?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM reports WHERE tenant_id = $1 AND ($2::uuid IS NULL OR match_id = $2)",
    )
    .bind(tenant_id)
    .bind(query.match_id)
    .fetch_one(&state.db)
    .await?;

    let items = sqlx::query_as::<_, ReportRow>(
        r#"
        SELECT * FROM reports
        WHERE tenant_id = $1 AND ($2::uuid IS NULL OR match_id = $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(tenant_id)
    .bind(query.match_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Page::new(items, total, &page)))
}

/// GET /api/v1/reports/:id
pub async fn handle_get_report(
    State(state): State<AppState>,
    user: AuthUser,
    Path(report_id): Path<Uuid>,
) -> Result<Json<ReportRow>, AppError> {
    Ok(Json(fetch_report(&state, user.tenant_id()?, report_id).await?))
}

/// GET /api/v1/reports/:id/download
pub async fn handle_download_report(
    State(state): State<AppState>,
    user: AuthUser,
    Path(report_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let report = fetch_report(&state, user.tenant_id()?, report_id).await?;
    let bytes = state.documents.get(&report.file_key).await.map_err(|e| match e {
        StorageError::NotFound(_) => {
            AppError::NotFound(format!("File for report {report_id} is missing"))
        }
        other => other.into(),
    })?;
    Ok(attachment(bytes, DOCX_CONTENT_TYPE, &report.file_name))
}

/// DELETE /api/v1/reports/:id
pub async fn handle_delete_report(
    State(state): State<AppState>,
    user: AuthUser,
    Path(report_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let report = fetch_report(&state, user.tenant_id()?, report_id).await?;
    if !user.can_modify(report.created_by) {
        return Err(AppError::forbidden());
    }

    sqlx::query("DELETE FROM reports WHERE id = $1")
        .bind(report_id)
        .execute(&state.db)
        .await?;
    delete_quietly(state.documents.as_ref(), &report.file_key).await;

    info!("User {} deleted report {report_id}", user.id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn file_names_are_filesystem_safe() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(
            report_file_name("张三", "Backend/Platform Engineer", date),
            "张三_Backend_Platform Engineer_20250309.docx"
        );
    }

    #[test]
    fn template_defaults_to_standard() {
        let req: CreateReportRequest =
            serde_json::from_value(json!({"match_id": Uuid::nil()})).unwrap();
        assert_eq!(req.template.unwrap_or(ReportTemplate::Standard), ReportTemplate::Standard);

        let req: CreateReportRequest =
            serde_json::from_value(json!({"match_id": Uuid::nil(), "template": "summary"})).unwrap();
        assert_eq!(req.template, Some(ReportTemplate::Summary));
    }
}
