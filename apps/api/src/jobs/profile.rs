//! Job profile: the LLM's structured reading of a posting, stored as a
//! document and embedded for similarity matching.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::prompts::{job_profile_prompt, JOB_PROFILE_SYSTEM};
use crate::errors::AppError;
use crate::lenient;
use crate::llm_client::prompts::organization_context;
use crate::llm_client::resolver::resolve_provider;
use crate::models::department::DepartmentRow;
use crate::models::job::JobPositionRow;
use crate::organization::handlers::fetch_company_info;
use crate::state::AppState;
use crate::storage::{get_json, keys, put_json, StorageError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EducationRequirement {
    #[serde(default, deserialize_with = "lenient::text")]
    pub degree: Option<String>,
    #[serde(default, alias = "major", deserialize_with = "lenient::string_list")]
    pub majors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperienceRequirement {
    #[serde(default, deserialize_with = "lenient::number")]
    pub years: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRequirements {
    #[serde(default)]
    pub education: EducationRequirement,
    #[serde(default)]
    pub experience: ExperienceRequirement,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub skills: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub age_range: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub salary_range: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobProfile {
    #[serde(default, deserialize_with = "lenient::text")]
    pub title: Option<String>,
    #[serde(default)]
    pub requirements: JobRequirements,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub responsibilities: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub description: Option<String>,
    #[serde(default)]
    pub preferences: BTreeMap<String, serde_json::Value>,
}

/// What lands in the document store under `keys::job_profile`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProfileDocument {
    pub job_id: Uuid,
    pub profile: JobProfile,
    pub parsed_at: DateTime<Utc>,
}

/// Text sent to the embedding model for a job.
pub fn vector_text(job: &JobPositionRow, profile: &JobProfile) -> String {
    let req = &profile.requirements;
    let mut parts = vec![format!("Position: {}", job.title)];
    if !req.skills.is_empty() {
        parts.push(format!("Skills: {}", req.skills.join(", ")));
    }
    if !req.experience.fields.is_empty() {
        parts.push(format!("Domains: {}", req.experience.fields.join(", ")));
    }
    if let Some(years) = req.experience.years {
        parts.push(format!("Experience: {years} years"));
    }
    if let Some(degree) = &req.education.degree {
        parts.push(format!("Education: {degree}"));
    }
    if !profile.responsibilities.is_empty() {
        parts.push(format!("Responsibilities: {}", profile.responsibilities.join("; ")));
    }
    if let Some(description) = &profile.description {
        parts.push(format!("Summary: {description}"));
    }
    parts.join(" | ")
}

async fn load_department(
    state: &AppState,
    job: &JobPositionRow,
) -> Result<Option<DepartmentRow>, AppError> {
    let Some(department_id) = job.department_id else {
        return Ok(None);
    };
    Ok(sqlx::query_as::<_, DepartmentRow>(
        "SELECT * FROM departments WHERE id = $1 AND tenant_id = $2",
    )
    .bind(department_id)
    .bind(job.tenant_id)
    .fetch_optional(&state.db)
    .await?)
}

/// Company, department and job context used by every job-related prompt.
pub async fn job_prompt_context(state: &AppState, job: &JobPositionRow) -> Result<String, AppError> {
    let company = fetch_company_info(&state.db, job.tenant_id).await?;
    let department = load_department(state, job).await?;
    Ok(organization_context(company.as_ref(), department.as_ref(), job))
}

/// Runs the LLM over the job and stores the resulting profile.
pub async fn parse_job_profile(
    state: &AppState,
    user_id: Uuid,
    job: &JobPositionRow,
) -> Result<JobProfileDocument, AppError> {
    let provider = resolve_provider(state, user_id).await?;
    let context = job_prompt_context(state, job).await?;

    let profile: JobProfile = state
        .llm
        .call_json(&provider, &job_profile_prompt(&context), JOB_PROFILE_SYSTEM)
        .await
        .map_err(|e| AppError::Llm(format!("Job profile parsing failed: {e}")))?;

    let document = JobProfileDocument {
        job_id: job.id,
        profile,
        parsed_at: Utc::now(),
    };
    let key = keys::job_profile(job.tenant_id, job.id);
    put_json(state.documents.as_ref(), &key, &document).await?;

    sqlx::query("UPDATE job_positions SET profile_key = $2, updated_at = NOW() WHERE id = $1")
        .bind(job.id)
        .bind(&key)
        .execute(&state.db)
        .await?;

    info!("Parsed profile for job {} via {}", job.id, provider.kind);
    Ok(document)
}

/// The stored profile, or `None` if the job was never parsed or the
/// document has gone missing.
pub async fn load_job_profile(
    state: &AppState,
    job: &JobPositionRow,
) -> Result<Option<JobProfileDocument>, AppError> {
    let Some(key) = job.profile_key.as_deref() else {
        return Ok(None);
    };
    match get_json(state.documents.as_ref(), key).await {
        Ok(document) => Ok(Some(document)),
        Err(StorageError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Embeds the job profile and stores it in the vector index. Reuses the
/// job's existing point id so re-vectorizing overwrites in place.
pub async fn vectorize_job(
    state: &AppState,
    user_id: Uuid,
    job: &JobPositionRow,
) -> Result<Uuid, AppError> {
    let document = load_job_profile(state, job).await?.ok_or_else(|| {
        AppError::Validation("Job has no parsed profile; parse the profile first".to_string())
    })?;

    let provider = resolve_provider(state, user_id).await?;
    let embedding = state
        .llm
        .embed(&provider, &vector_text(job, &document.profile))
        .await
        .map_err(|e| AppError::Llm(format!("Job embedding failed: {e}")))?;

    let point_id = job.vector_id.unwrap_or_else(Uuid::new_v4);
    state
        .vectors
        .upsert(point_id, embedding, job.tenant_id, job.id)
        .await?;

    sqlx::query("UPDATE job_positions SET vector_id = $2, updated_at = NOW() WHERE id = $1")
        .bind(job.id)
        .bind(point_id)
        .execute(&state.db)
        .await?;

    info!("Vectorized job {} as point {point_id}", job.id);
    Ok(point_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobPositionRow {
        serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "tenant_id": Uuid::new_v4(),
            "title": "Backend Engineer",
            "department": null,
            "department_id": null,
            "description": null,
            "requirements": null,
            "location": null,
            "salary_min": null,
            "salary_max": null,
            "employment_type": null,
            "status": "draft",
            "profile_key": null,
            "vector_id": null,
            "created_by": null,
            "published_at": null,
            "closed_at": null,
            "created_at": Utc::now(),
            "updated_at": Utc::now(),
        }))
        .unwrap()
    }

    #[test]
    fn profile_tolerates_loose_llm_output() {
        let profile: JobProfile = serde_json::from_str(
            r#"{
                "title": "Backend Engineer",
                "requirements": {
                    "education": {"degree": "本科及以上", "major": "CS, Software Engineering"},
                    "experience": {"years": "3+", "fields": ["payments"]},
                    "skills": ["Rust", "PostgreSQL"],
                    "age_range": null
                },
                "preferences": {"teamwork": "high"}
            }"#,
        )
        .unwrap();

        assert_eq!(profile.requirements.experience.years, Some(3.0));
        assert_eq!(profile.requirements.education.majors.len(), 2);
        assert!(profile.requirements.age_range.is_none());
        assert!(profile.responsibilities.is_empty());
        assert_eq!(profile.preferences["teamwork"], "high");
    }

    #[test]
    fn empty_object_is_a_valid_profile() {
        let profile: JobProfile = serde_json::from_str("{}").unwrap();
        assert!(profile.requirements.skills.is_empty());
    }

    #[test]
    fn vector_text_lists_key_requirements() {
        let mut profile = JobProfile::default();
        profile.requirements.skills = vec!["Rust".into(), "Kafka".into()];
        profile.requirements.experience.years = Some(5.0);
        profile.description = Some("Own the ledger service".into());

        let text = vector_text(&job(), &profile);
        assert!(text.starts_with("Position: Backend Engineer"));
        assert!(text.contains("Skills: Rust, Kafka"));
        assert!(text.contains("Experience: 5 years"));
        assert!(text.ends_with("Summary: Own the ledger service"));
    }
}
