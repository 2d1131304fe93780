use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::Response,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::extract::extract_text_blocking;
use super::files::{sha256_hex, validate_upload, FileKind};
use super::parser::ResumeDocument;
use super::prompts::{resume_parse_prompt, RESUME_PARSE_SYSTEM};
use crate::auth::AuthUser;
use crate::db::is_unique_violation;
use crate::download::attachment;
use crate::errors::AppError;
use crate::extractors::{Json, Path, Query};
use crate::llm_client::resolver::resolve_provider;
use crate::models::resume::{ParseStatus, ResumeRow};
use crate::pagination::{Page, PageParams};
use crate::state::AppState;
use crate::storage::{delete_quietly, get_json, keys, put_json, StorageError};
use crate::tenants::quota::{consume_resume_quota, release_resume_quota};

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ResumeListQuery {
    pub search: Option<String>,
    pub parse_status: Option<ParseStatus>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub resume: ResumeRow,
    pub duplicate: bool,
}

#[derive(Debug, Serialize)]
pub struct ResumeDetail {
    #[serde(flatten)]
    pub resume: ResumeRow,
    pub parsed: Option<ResumeDocument>,
}

/// Relational columns denormalized from the parsed payload.
#[derive(Debug, Default, PartialEq)]
struct ResumeSummary {
    candidate_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    highest_education: Option<String>,
    years_of_experience: Option<f64>,
    skills: Vec<String>,
}

impl ResumeSummary {
    fn from_document(document: &ResumeDocument, today: NaiveDate) -> Self {
        let info = &document.basic_info;
        ResumeSummary {
            candidate_name: info.name.clone(),
            email: info.email.clone(),
            phone: info.phone.clone(),
            highest_education: document
                .highest_education()
                .map(|(_, label)| label.to_string()),
            years_of_experience: Some(document.years_of_experience(today)),
            skills: document.technical_skills(),
        }
    }
}

/// Result of one LLM parse attempt, already persisted to the document store
/// when it succeeded.
enum ParseOutcome {
    Parsed {
        parsed_key: String,
        summary: ResumeSummary,
    },
    Failed(String),
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

pub async fn fetch_resume(state: &AppState, tenant_id: Uuid, resume_id: Uuid) -> Result<ResumeRow, AppError> {
    sqlx::query_as::<_, ResumeRow>("SELECT * FROM resumes WHERE id = $1 AND tenant_id = $2")
        .bind(resume_id)
        .bind(tenant_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Resume {resume_id} not found")))
}

/// The parsed payload of a resume that must already be parsed.
pub async fn load_resume_document(state: &AppState, resume: &ResumeRow) -> Result<ResumeDocument, AppError> {
    if !resume.is_parsed() {
        return Err(AppError::Validation(format!(
            "Resume {} has not been parsed successfully",
            resume.id
        )));
    }
    let key = resume.parsed_key.as_deref().ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("parsed resume {} has no payload key", resume.id))
    })?;
    Ok(get_json(state.documents.as_ref(), key).await?)
}

/// Drops any client-side directory components from an uploaded file name.
fn clean_filename(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    (!name.is_empty()).then(|| name.to_string())
}

async fn read_file_field(mut multipart: Multipart) -> Result<(String, Vec<u8>), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .and_then(clean_filename)
            .ok_or_else(|| AppError::Validation("Uploaded file has no name".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Could not read uploaded file: {e}")))?;
        return Ok((filename, bytes.to_vec()));
    }
    Err(AppError::Validation("Multipart field 'file' is required".to_string()))
}

async fn parse_resume_text(state: &AppState, user_id: Uuid, text: &str) -> Result<ResumeDocument, AppError> {
    let provider = resolve_provider(state, user_id).await?;
    let document = state
        .llm
        .call_json(&provider, &resume_parse_prompt(text), RESUME_PARSE_SYSTEM)
        .await
        .map_err(|e| AppError::Llm(format!("Resume parsing failed: {e}")))?;
    Ok(document)
}

/// Runs the LLM parse and stores the payload. Only storage failures are
/// returned as errors; parse failures become `ParseOutcome::Failed`.
async fn run_parse(
    state: &AppState,
    user_id: Uuid,
    tenant_id: Uuid,
    resume_id: Uuid,
    text: &str,
) -> Result<ParseOutcome, AppError> {
    let document = match parse_resume_text(state, user_id, text).await {
        Ok(document) => document,
        Err(e) => {
            warn!("Resume {resume_id} could not be parsed: {e}");
            return Ok(ParseOutcome::Failed(e.to_string()));
        }
    };

    let parsed_key = keys::parsed_resume(tenant_id, resume_id);
    put_json(state.documents.as_ref(), &parsed_key, &document).await?;
    Ok(ParseOutcome::Parsed {
        parsed_key,
        summary: ResumeSummary::from_document(&document, Utc::now().date_naive()),
    })
}

async fn extract(kind: FileKind, bytes: Vec<u8>) -> Result<String, AppError> {
    extract_text_blocking(kind, bytes)
        .await
        .map_err(|e| AppError::UnprocessableEntity(format!("Could not read the resume text: {e}")))
}

struct NewUpload {
    filename: String,
    kind: FileKind,
    hash: String,
    bytes: Vec<u8>,
}

/// Everything after the quota is taken: extract, store, parse, insert.
async fn ingest(
    state: &AppState,
    user: &AuthUser,
    tenant_id: Uuid,
    upload: NewUpload,
) -> Result<ResumeRow, AppError> {
    let resume_id = Uuid::new_v4();
    let file_size = upload.bytes.len() as i64;
    let text = extract(upload.kind, upload.bytes.clone()).await?;

    let file_key = keys::resume_file(tenant_id, resume_id, upload.kind.as_str());
    state
        .documents
        .put(&file_key, upload.bytes, upload.kind.content_type())
        .await?;

    let outcome = match run_parse(state, user.id, tenant_id, resume_id, &text).await {
        Ok(outcome) => outcome,
        Err(e) => {
            delete_quietly(state.documents.as_ref(), &file_key).await;
            return Err(e);
        }
    };

    let (parsed_key, status, parse_error, summary) = match outcome {
        ParseOutcome::Parsed {
            parsed_key,
            summary,
        } => (Some(parsed_key), ParseStatus::Parsed, None, summary),
        ParseOutcome::Failed(message) => (
            None,
            ParseStatus::Failed,
            Some(message),
            ResumeSummary::default(),
        ),
    };

    let inserted = sqlx::query_as::<_, ResumeRow>(
        r#"
        INSERT INTO resumes (
            id, tenant_id, uploaded_by, original_filename, file_type, file_size,
            file_hash, file_key, parsed_key, parse_status, parse_error,
            candidate_name, email, phone, highest_education, years_of_experience, skills
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        RETURNING *
        "#,
    )
    .bind(resume_id)
    .bind(tenant_id)
    .bind(user.id)
    .bind(&upload.filename)
    .bind(upload.kind.as_str())
    .bind(file_size)
    .bind(&upload.hash)
    .bind(&file_key)
    .bind(&parsed_key)
    .bind(status.as_str())
    .bind(&parse_error)
    .bind(&summary.candidate_name)
    .bind(&summary.email)
    .bind(&summary.phone)
    .bind(&summary.highest_education)
    .bind(summary.years_of_experience)
    .bind(&summary.skills)
    .fetch_one(&state.db)
    .await;

    match inserted {
        Ok(row) => Ok(row),
        Err(e) => {
            delete_quietly(state.documents.as_ref(), &file_key).await;
            if let Some(key) = &parsed_key {
                delete_quietly(state.documents.as_ref(), key).await;
            }
            if is_unique_violation(&e) {
                Err(AppError::Conflict(
                    "The same file was uploaded concurrently".to_string(),
                ))
            } else {
                Err(e.into())
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Upload
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/resumes
///
/// Multipart upload with a single `file` field. Re-uploading identical bytes
/// returns the existing resume without consuming quota.
pub async fn handle_upload_resume(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let tenant_id = user.tenant_id()?;
    let (filename, bytes) = read_file_field(multipart).await?;
    let kind = validate_upload(&filename, &bytes, state.config.upload_max_bytes)?;
    let hash = sha256_hex(&bytes);

    let existing = sqlx::query_as::<_, ResumeRow>(
        "SELECT * FROM resumes WHERE tenant_id = $1 AND file_hash = $2",
    )
    .bind(tenant_id)
    .bind(&hash)
    .fetch_optional(&state.db)
    .await?;
    if let Some(resume) = existing {
        info!("Upload of {filename} matched existing resume {}", resume.id);
        return Ok((
            StatusCode::OK,
            Json(UploadResponse {
                resume,
                duplicate: true,
            }),
        ));
    }

    consume_resume_quota(&state.db, tenant_id).await?;

    let upload = NewUpload {
        filename,
        kind,
        hash,
        bytes,
    };
    match ingest(&state, &user, tenant_id, upload).await {
        Ok(resume) => {
            info!(
                "User {} uploaded resume {} ({})",
                user.id, resume.id, resume.parse_status
            );
            Ok((
                StatusCode::CREATED,
                Json(UploadResponse {
                    resume,
                    duplicate: false,
                }),
            ))
        }
        Err(e) => {
            if let Err(release) = release_resume_quota(&state.db, tenant_id).await {
                warn!("Failed to release resume quota for tenant {tenant_id}: {release}");
            }
            Err(e)
        }
    }
}

/// Status to record when a reparse fails. A resume with a stored payload
/// stays parsed; only `parse_error` changes.
fn status_after_failed_reparse(resume: &ResumeRow) -> ParseStatus {
    if resume.is_parsed() && resume.parsed_key.is_some() {
        ParseStatus::Parsed
    } else {
        ParseStatus::Failed
    }
}

/// POST /api/v1/resumes/:id/reparse
///
/// Re-extracts the stored original and asks the LLM again. A failed retry
/// keeps the previous payload, status and summary columns.
pub async fn handle_reparse_resume(
    State(state): State<AppState>,
    user: AuthUser,
    Path(resume_id): Path<Uuid>,
) -> Result<Json<ResumeRow>, AppError> {
    let tenant_id = user.tenant_id()?;
    let resume = fetch_resume(&state, tenant_id, resume_id).await?;
    let kind = FileKind::parse(&resume.file_type).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "resume {resume_id} has unknown file type '{}'",
            resume.file_type
        ))
    })?;

    let bytes = state.documents.get(&resume.file_key).await?;
    let text = extract(kind, bytes).await?;

    let updated = match run_parse(&state, user.id, tenant_id, resume_id, &text).await? {
        ParseOutcome::Parsed {
            parsed_key,
            summary,
        } => {
            sqlx::query_as::<_, ResumeRow>(
                r#"
                UPDATE resumes
                SET parsed_key = $2, parse_status = $3, parse_error = NULL,
                    candidate_name = $4, email = $5, phone = $6,
                    highest_education = $7, years_of_experience = $8, skills = $9,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(resume_id)
            .bind(&parsed_key)
            .bind(ParseStatus::Parsed.as_str())
            .bind(&summary.candidate_name)
            .bind(&summary.email)
            .bind(&summary.phone)
            .bind(&summary.highest_education)
            .bind(summary.years_of_experience)
            .bind(&summary.skills)
            .fetch_one(&state.db)
            .await?
        }
        ParseOutcome::Failed(message) => {
            sqlx::query_as::<_, ResumeRow>(
                r#"
                UPDATE resumes
                SET parse_status = $2, parse_error = $3, updated_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(resume_id)
            .bind(status_after_failed_reparse(&resume).as_str())
            .bind(&message)
            .fetch_one(&state.db)
            .await?
        }
    };

    info!(
        "User {} reparsed resume {resume_id}: {}",
        user.id, updated.parse_status
    );
    Ok(Json(updated))
}

// ────────────────────────────────────────────────────────────────────────────
// Read / delete
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/resumes
pub async fn handle_list_resumes(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ResumeListQuery>,
    Query(page): Query<PageParams>,
) -> Result<Json<Page<ResumeRow>>, AppError> {
    let tenant_id = user.tenant_id()?;
    let status = query.parse_status.map(|s| s.as_str());
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM resumes
        WHERE tenant_id = $1
          AND ($2::text IS NULL OR parse_status = $2)
          AND ($3::text IS NULL
               OR candidate_name ILIKE '%' || $3 || '%'
               OR email ILIKE '%' || $3 || '%'
               OR original_filename ILIKE '%' || $3 || '%')
        "#,
    )
    .bind(tenant_id)
    .bind(status)
    .bind(search)
    .fetch_one(&state.db)
    .await?;

    let items = sqlx::query_as::<_, ResumeRow>(
        r#"
        SELECT * FROM resumes
        WHERE tenant_id = $1
          AND ($2::text IS NULL OR parse_status = $2)
          AND ($3::text IS NULL
               OR candidate_name ILIKE '%' || $3 || '%'
               OR email ILIKE '%' || $3 || '%'
               OR original_filename ILIKE '%' || $3 || '%')
        ORDER BY created_at DESC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(tenant_id)
    .bind(status)
    .bind(search)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Page::new(items, total, &page)))
}

/// GET /api/v1/resumes/:id
pub async fn handle_get_resume(
    State(state): State<AppState>,
    user: AuthUser,
    Path(resume_id): Path<Uuid>,
) -> Result<Json<ResumeDetail>, AppError> {
    let tenant_id = user.tenant_id()?;
    let resume = fetch_resume(&state, tenant_id, resume_id).await?;

    let parsed = match resume.parsed_key.as_deref() {
        Some(key) if resume.is_parsed() => match get_json(state.documents.as_ref(), key).await {
            Ok(document) => Some(document),
            Err(StorageError::NotFound(_)) => {
                warn!("Parsed payload for resume {resume_id} is missing");
                None
            }
            Err(e) => return Err(e.into()),
        },
        _ => None,
    };

    Ok(Json(ResumeDetail { resume, parsed }))
}

/// GET /api/v1/resumes/:id/file
pub async fn handle_download_resume(
    State(state): State<AppState>,
    user: AuthUser,
    Path(resume_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let tenant_id = user.tenant_id()?;
    let resume = fetch_resume(&state, tenant_id, resume_id).await?;
    let content_type = FileKind::parse(&resume.file_type)
        .map(FileKind::content_type)
        .unwrap_or("application/octet-stream");

    let bytes = state.documents.get(&resume.file_key).await.map_err(|e| match e {
        StorageError::NotFound(_) => {
            AppError::NotFound(format!("Original file for resume {resume_id} is missing"))
        }
        other => other.into(),
    })?;

    Ok(attachment(bytes, content_type, &resume.original_filename))
}

/// DELETE /api/v1/resumes/:id
pub async fn handle_delete_resume(
    State(state): State<AppState>,
    user: AuthUser,
    Path(resume_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let tenant_id = user.tenant_id()?;
    let resume = fetch_resume(&state, tenant_id, resume_id).await?;
    if !user.can_modify(resume.uploaded_by) {
        return Err(AppError::Forbidden(
            "Only the uploader or a tenant admin may delete a resume".to_string(),
        ));
    }

    let mut orphaned: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT detail_key FROM resume_job_matches WHERE resume_id = $1 AND detail_key IS NOT NULL
        UNION ALL
        SELECT r.file_key FROM reports r
        JOIN resume_job_matches m ON m.id = r.match_id
        WHERE m.resume_id = $1
        "#,
    )
    .bind(resume_id)
    .fetch_all(&state.db)
    .await?;
    orphaned.push(resume.file_key.clone());
    orphaned.extend(resume.parsed_key.clone());

    sqlx::query("DELETE FROM resumes WHERE id = $1")
        .bind(resume_id)
        .execute(&state.db)
        .await?;

    for key in &orphaned {
        delete_quietly(state.documents.as_ref(), key).await;
    }

    info!("User {} deleted resume {resume_id}", user.id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::Request;
    use serde_json::json;

    const BOUNDARY: &str = "talentry-boundary";

    async fn multipart_with(parts: &[(&str, Option<&str>, &[u8])]) -> Multipart {
        let mut body = Vec::new();
        for (name, filename, content) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            let disposition = match filename {
                Some(f) => format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n"),
                None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n"),
            };
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/resumes")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        Multipart::from_request(request, &()).await.unwrap()
    }

    #[tokio::test]
    async fn file_field_is_found_among_others() {
        let multipart = multipart_with(&[
            ("note", None, b"hello"),
            ("file", Some("C:\\Users\\hr\\cv.pdf"), b"%PDF-1.4"),
        ])
        .await;
        let (name, bytes) = read_file_field(multipart).await.unwrap();
        assert_eq!(name, "cv.pdf");
        assert_eq!(bytes, b"%PDF-1.4");
    }

    #[tokio::test]
    async fn missing_file_field_is_rejected() {
        let multipart = multipart_with(&[("note", None, b"hello")]).await;
        let err = read_file_field(multipart).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    fn resume(status: ParseStatus, parsed_key: Option<&str>) -> ResumeRow {
        ResumeRow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            uploaded_by: None,
            original_filename: "cv.pdf".into(),
            file_type: "pdf".into(),
            file_size: 8,
            file_hash: "00".into(),
            file_key: "tenants/t/resumes/r/original.pdf".into(),
            parsed_key: parsed_key.map(str::to_string),
            parse_status: status.as_str().into(),
            parse_error: None,
            candidate_name: Some("李雷".into()),
            email: None,
            phone: None,
            highest_education: None,
            years_of_experience: None,
            skills: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn failed_reparse_keeps_a_parsed_resume_usable() {
        let parsed = resume(ParseStatus::Parsed, Some("tenants/t/resumes/r/parsed.json"));
        assert_eq!(status_after_failed_reparse(&parsed), ParseStatus::Parsed);

        let never_parsed = resume(ParseStatus::Failed, None);
        assert_eq!(status_after_failed_reparse(&never_parsed), ParseStatus::Failed);
    }

    #[test]
    fn filenames_lose_directories() {
        assert_eq!(clean_filename("/tmp/a/cv.docx").as_deref(), Some("cv.docx"));
        assert_eq!(clean_filename("简历.pdf").as_deref(), Some("简历.pdf"));
        assert_eq!(clean_filename("dir/"), None);
    }

    #[test]
    fn summary_columns_come_from_the_payload() {
        let document: ResumeDocument = serde_json::from_value(json!({
            "basic_info": {"name": "李雷", "email": "lilei@example.com", "phone": "13800000000"},
            "education": [
                {"school": "A", "education_level": "bachelor", "degree": "Bachelor"},
                {"school": "B", "education_level": "master", "degree": "Master"}
            ],
            "work_experiences": [
                {"company": "X", "start_date": "2020-01", "end_date": "2022-01"}
            ],
            "skills": {"technical": ["Rust", "rust", "Go"]}
        }))
        .unwrap();

        let summary = ResumeSummary::from_document(
            &document,
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        );
        assert_eq!(summary.candidate_name.as_deref(), Some("李雷"));
        assert_eq!(summary.email.as_deref(), Some("lilei@example.com"));
        assert_eq!(summary.highest_education.as_deref(), Some("master"));
        assert_eq!(summary.years_of_experience, Some(2.0));
        assert_eq!(summary.skills, vec!["Rust", "Go"]);
    }
}
