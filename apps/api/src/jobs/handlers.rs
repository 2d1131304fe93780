use axum::{
    extract::State,
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::profile::{load_job_profile, parse_job_profile, vectorize_job, JobProfileDocument};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extractors::{Json, Path, Query};
use crate::models::department::DepartmentRow;
use crate::models::job::{JobPositionRow, JobStatus};
use crate::pagination::{Page, PageParams};
use crate::state::AppState;
use crate::storage::{delete_quietly, keys};
use crate::tenants::quota::ensure_job_capacity;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    pub status: Option<JobStatus>,
    pub department_id: Option<Uuid>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JobDetailQuery {
    #[serde(default)]
    pub include_profile: bool,
}

#[derive(Debug, Deserialize)]
pub struct PublishQuery {
    pub auto_parse: Option<bool>,
    pub auto_vectorize: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct JobRequest {
    pub title: Option<String>,
    pub department: Option<String>,
    pub department_id: Option<Uuid>,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub location: Option<String>,
    pub salary_min: Option<i32>,
    pub salary_max: Option<i32>,
    pub employment_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: JobPositionRow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<JobProfileDocument>,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub job: JobPositionRow,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct VectorizeResponse {
    pub job_id: Uuid,
    pub vector_id: Uuid,
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

pub async fn fetch_job(state: &AppState, tenant_id: Uuid, job_id: Uuid) -> Result<JobPositionRow, AppError> {
    sqlx::query_as::<_, JobPositionRow>(
        "SELECT * FROM job_positions WHERE id = $1 AND tenant_id = $2",
    )
    .bind(job_id)
    .bind(tenant_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))
}

fn validate_salary(min: Option<i32>, max: Option<i32>) -> Result<(), AppError> {
    if min.is_some_and(|v| v < 0) || max.is_some_and(|v| v < 0) {
        return Err(AppError::Validation("Salary cannot be negative".to_string()));
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(AppError::Validation(
                "salary_min must not exceed salary_max".to_string(),
            ));
        }
    }
    Ok(())
}

/// Name to store alongside `department_id`. An explicit name wins.
async fn department_label(
    state: &AppState,
    tenant_id: Uuid,
    department_id: Uuid,
    explicit: Option<String>,
) -> Result<Option<String>, AppError> {
    let department = sqlx::query_as::<_, DepartmentRow>(
        "SELECT * FROM departments WHERE id = $1 AND tenant_id = $2",
    )
    .bind(department_id)
    .bind(tenant_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::Validation(format!("Department {department_id} not found")))?;
    Ok(explicit.or(Some(department.name)))
}

fn ensure_can_modify(user: &AuthUser, job: &JobPositionRow) -> Result<(), AppError> {
    if user.can_modify(job.created_by) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the job's creator or a tenant admin may change it".to_string(),
        ))
    }
}

async fn set_status(state: &AppState, job: &JobPositionRow, next: JobStatus) -> Result<JobPositionRow, AppError> {
    let current = job.status();
    if !current.can_transition_to(next) {
        return Err(AppError::Validation(format!(
            "Job cannot move from {current} to {next}"
        )));
    }

    let sql = match next {
        JobStatus::Published => {
            "UPDATE job_positions SET status = $2, published_at = NOW(), closed_at = NULL, \
             updated_at = NOW() WHERE id = $1 RETURNING *"
        }
        JobStatus::Closed => {
            "UPDATE job_positions SET status = $2, closed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 RETURNING *"
        }
        JobStatus::Draft => {
            "UPDATE job_positions SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *"
        }
    };

    Ok(sqlx::query_as::<_, JobPositionRow>(sql)
        .bind(job.id)
        .bind(next.as_str())
        .fetch_one(&state.db)
        .await?)
}

// ────────────────────────────────────────────────────────────────────────────
// CRUD
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/jobs/positions
pub async fn handle_list_jobs(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<JobListQuery>,
    Query(page): Query<PageParams>,
) -> Result<Json<Page<JobPositionRow>>, AppError> {
    let tenant_id = user.tenant_id()?;
    let status = query.status.map(|s| s.as_str());
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM job_positions
        WHERE tenant_id = $1
          AND ($2::text IS NULL OR status = $2)
          AND ($3::uuid IS NULL OR department_id = $3)
          AND ($4::text IS NULL OR title ILIKE '%' || $4 || '%')
        "#,
    )
    .bind(tenant_id)
    .bind(status)
    .bind(query.department_id)
    .bind(search)
    .fetch_one(&state.db)
    .await?;

    let items = sqlx::query_as::<_, JobPositionRow>(
        r#"
        SELECT * FROM job_positions
        WHERE tenant_id = $1
          AND ($2::text IS NULL OR status = $2)
          AND ($3::uuid IS NULL OR department_id = $3)
          AND ($4::text IS NULL OR title ILIKE '%' || $4 || '%')
        ORDER BY created_at DESC
        LIMIT $5 OFFSET $6
        "#,
    )
    .bind(tenant_id)
    .bind(status)
    .bind(query.department_id)
    .bind(search)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Page::new(items, total, &page)))
}

/// POST /api/v1/jobs/positions
pub async fn handle_create_job(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<JobRequest>,
) -> Result<(StatusCode, Json<JobPositionRow>), AppError> {
    let tenant_id = user.tenant_id()?;
    let title = req
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("Job title is required".to_string()))?
        .to_string();
    validate_salary(req.salary_min, req.salary_max)?;
    ensure_job_capacity(&state.db, tenant_id).await?;

    let department = match req.department_id {
        Some(department_id) => department_label(&state, tenant_id, department_id, req.department).await?,
        None => req.department,
    };

    let row = sqlx::query_as::<_, JobPositionRow>(
        r#"
        INSERT INTO job_positions (
            id, tenant_id, title, department, department_id, description, requirements,
            location, salary_min, salary_max, employment_type, status, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(&title)
    .bind(department)
    .bind(req.department_id)
    .bind(req.description)
    .bind(req.requirements)
    .bind(req.location)
    .bind(req.salary_min)
    .bind(req.salary_max)
    .bind(req.employment_type)
    .bind(JobStatus::Draft.as_str())
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    info!("User {} created job {} '{title}'", user.id, row.id);
    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/jobs/positions/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<Uuid>,
    Query(query): Query<JobDetailQuery>,
) -> Result<Json<JobDetail>, AppError> {
    let job = fetch_job(&state, user.tenant_id()?, job_id).await?;
    let profile = if query.include_profile {
        load_job_profile(&state, &job).await?
    } else {
        None
    };
    Ok(Json(JobDetail { job, profile }))
}

/// PUT /api/v1/jobs/positions/:id
pub async fn handle_update_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<Uuid>,
    Json(req): Json<JobRequest>,
) -> Result<Json<JobPositionRow>, AppError> {
    let tenant_id = user.tenant_id()?;
    let job = fetch_job(&state, tenant_id, job_id).await?;
    ensure_can_modify(&user, &job)?;

    let title = match req.title.as_deref().map(str::trim) {
        Some("") => return Err(AppError::Validation("Job title cannot be empty".to_string())),
        other => other.map(str::to_string),
    };
    validate_salary(
        req.salary_min.or(job.salary_min),
        req.salary_max.or(job.salary_max),
    )?;

    let department = match req.department_id {
        Some(department_id) => department_label(&state, tenant_id, department_id, req.department).await?,
        None => req.department,
    };

    let row = sqlx::query_as::<_, JobPositionRow>(
        r#"
        UPDATE job_positions SET
            title = COALESCE($2, title),
            department = COALESCE($3, department),
            department_id = COALESCE($4, department_id),
            description = COALESCE($5, description),
            requirements = COALESCE($6, requirements),
            location = COALESCE($7, location),
            salary_min = COALESCE($8, salary_min),
            salary_max = COALESCE($9, salary_max),
            employment_type = COALESCE($10, employment_type),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(job_id)
    .bind(title)
    .bind(department)
    .bind(req.department_id)
    .bind(req.description)
    .bind(req.requirements)
    .bind(req.location)
    .bind(req.salary_min)
    .bind(req.salary_max)
    .bind(req.employment_type)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(row))
}

/// DELETE /api/v1/jobs/positions/:id
///
/// Matches and their reports cascade in the database. Their documents, the
/// job profile and the vector point are removed best effort.
pub async fn handle_delete_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let tenant_id = user.tenant_id()?;
    let job = fetch_job(&state, tenant_id, job_id).await?;
    ensure_can_modify(&user, &job)?;

    let mut orphaned: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT detail_key FROM resume_job_matches WHERE job_id = $1 AND detail_key IS NOT NULL
        UNION ALL
        SELECT r.file_key FROM reports r
        JOIN resume_job_matches m ON m.id = r.match_id
        WHERE m.job_id = $1
        "#,
    )
    .bind(job_id)
    .fetch_all(&state.db)
    .await?;
    orphaned.extend(job.profile_key.clone());

    sqlx::query("DELETE FROM job_positions WHERE id = $1")
        .bind(job_id)
        .execute(&state.db)
        .await?;

    if let Some(point_id) = job.vector_id {
        if let Err(e) = state.vectors.delete(point_id).await {
            warn!("Failed to delete vector {point_id} for job {job_id}: {e}");
        }
    }
    for key in &orphaned {
        delete_quietly(state.documents.as_ref(), key).await;
    }

    info!("User {} deleted job {job_id}", user.id);
    Ok(StatusCode::NO_CONTENT)
}

// ────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/jobs/positions/:id/publish
///
/// Profile parsing and vectorization run before the status flip when
/// requested. Their failures become warnings; the publish still happens.
pub async fn handle_publish_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<Uuid>,
    Query(query): Query<PublishQuery>,
) -> Result<Json<PublishResponse>, AppError> {
    let tenant_id = user.tenant_id()?;
    let mut job = fetch_job(&state, tenant_id, job_id).await?;
    ensure_can_modify(&user, &job)?;
    if job.status() == JobStatus::Published {
        return Err(AppError::Validation("Job is already published".to_string()));
    }

    let mut warnings = Vec::new();

    if query.auto_parse.unwrap_or(true) && job.profile_key.is_none() {
        match parse_job_profile(&state, user.id, &job).await {
            Ok(_) => job = fetch_job(&state, tenant_id, job_id).await?,
            Err(e) => {
                warn!("Auto-parse failed while publishing job {job_id}: {e}");
                warnings.push(format!("Profile parsing failed: {e}"));
            }
        }
    }

    if query.auto_vectorize.unwrap_or(true) && job.profile_key.is_some() && job.vector_id.is_none() {
        if let Err(e) = vectorize_job(&state, user.id, &job).await {
            warn!("Auto-vectorize failed while publishing job {job_id}: {e}");
            warnings.push(format!("Vectorization failed: {e}"));
        }
    }

    let job = set_status(&state, &job, JobStatus::Published).await?;
    info!("User {} published job {job_id} ({} warnings)", user.id, warnings.len());
    Ok(Json(PublishResponse { job, warnings }))
}

/// POST /api/v1/jobs/positions/:id/close
pub async fn handle_close_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobPositionRow>, AppError> {
    let job = fetch_job(&state, user.tenant_id()?, job_id).await?;
    ensure_can_modify(&user, &job)?;
    let job = set_status(&state, &job, JobStatus::Closed).await?;
    info!("User {} closed job {job_id}", user.id);
    Ok(Json(job))
}

/// POST /api/v1/jobs/positions/:id/parse-profile
pub async fn handle_parse_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobProfileDocument>, AppError> {
    let job = fetch_job(&state, user.tenant_id()?, job_id).await?;
    ensure_can_modify(&user, &job)?;
    Ok(Json(parse_job_profile(&state, user.id, &job).await?))
}

/// POST /api/v1/jobs/positions/:id/vectorize
pub async fn handle_vectorize(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<Json<VectorizeResponse>, AppError> {
    let job = fetch_job(&state, user.tenant_id()?, job_id).await?;
    ensure_can_modify(&user, &job)?;
    let vector_id = vectorize_job(&state, user.id, &job).await?;
    Ok(Json(VectorizeResponse { job_id, vector_id }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salary_bounds() {
        assert!(validate_salary(Some(10), Some(20)).is_ok());
        assert!(validate_salary(Some(20), Some(20)).is_ok());
        assert!(validate_salary(None, Some(5)).is_ok());
        assert!(validate_salary(Some(30), Some(20)).is_err());
        assert!(validate_salary(Some(-1), None).is_err());
    }

    fn query<T: serde::de::DeserializeOwned>(uri: &str) -> T {
        axum::extract::Query::<T>::try_from_uri(&uri.parse().unwrap()).unwrap().0
    }

    #[test]
    fn list_query_parses_status() {
        let query: JobListQuery = query("/jobs?status=published&search=rust");
        assert_eq!(query.status, Some(JobStatus::Published));
        assert_eq!(query.search.as_deref(), Some("rust"));
        assert!(query.department_id.is_none());
    }

    #[test]
    fn publish_defaults_to_automatic_steps() {
        let query: PublishQuery = query("/publish?auto_vectorize=false");
        assert!(query.auto_parse.unwrap_or(true));
        assert!(!query.auto_vectorize.unwrap_or(true));
    }
}
