//! One resume against one job: gather the three signals, fuse them, persist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::analysis::MatchAnalysis;
use super::fusion::{
    fuse, weights_for_title, Components, FusionWeights, LabelThresholds, ScoreBreakdown, WeightSource,
};
use super::models::{select_match_model, SelectedModel};
use super::prompts::{match_analysis_prompt, MATCH_ANALYSIS_SYSTEM, NO_PROFILE};
use crate::errors::AppError;
use crate::filtering::engine::{evaluate, FilterOutcome};
use crate::filtering::handlers::load_active_rules;
use crate::jobs::handlers::fetch_job;
use crate::jobs::profile::{job_prompt_context, load_job_profile};
use crate::llm_client::providers::ResolvedProvider;
use crate::llm_client::resolver::resolve_provider;
use crate::models::job::{JobPositionRow, JobStatus};
use crate::models::matching::{MatchRow, MatchStatus};
use crate::resumes::handlers::{fetch_resume, load_resume_document};
use crate::resumes::parser::ResumeDocument;
use crate::state::AppState;
use crate::storage::{keys, put_json};

/// Stored under `detail_key`; everything that went into the score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchDetail {
    pub match_id: Uuid,
    pub resume_id: Uuid,
    pub job_id: Uuid,
    pub match_model_id: Option<Uuid>,
    pub vector_similarity: f64,
    pub rule_outcome: FilterOutcome,
    pub analysis: MatchAnalysis,
    pub breakdown: ScoreBreakdown,
    pub matched_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MatchOutcome {
    #[serde(flatten)]
    pub record: MatchRow,
    pub detail: MatchDetail,
}

pub struct MatchRequest {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub resume_id: Uuid,
    pub job_id: Uuid,
    pub match_model_id: Option<Uuid>,
}

pub fn ensure_matchable(job: &JobPositionRow) -> Result<(), AppError> {
    if job.status() == JobStatus::Closed {
        return Err(AppError::Validation(format!(
            "Job '{}' is closed and cannot be matched",
            job.title
        )));
    }
    Ok(())
}

/// Cosine similarity in 0..1 between the resume embedding and the job's
/// stored point. Every failure degrades to 0.
async fn vector_similarity(
    state: &AppState,
    provider: &ResolvedProvider,
    job: &JobPositionRow,
    resume: &ResumeDocument,
) -> f64 {
    let Some(point_id) = job.vector_id else {
        debug!("Job {} has no vector; similarity is 0", job.id);
        return 0.0;
    };

    let embedding = match state.llm.embed(provider, &resume.embedding_text()).await {
        Ok(embedding) => embedding,
        Err(e) => {
            warn!("Resume embedding failed for job {}: {e}", job.id);
            return 0.0;
        }
    };

    match state.vectors.similarity(point_id, embedding).await {
        Ok(Some(similarity)) => f64::from(similarity).clamp(0.0, 1.0),
        Ok(None) => {
            warn!("Vector point {point_id} for job {} is missing or has another dimension", job.id);
            0.0
        }
        Err(e) => {
            warn!("Vector similarity lookup failed for job {}: {e}", job.id);
            0.0
        }
    }
}

/// The LLM deep analysis. A failed call becomes a zero-score analysis with
/// the error recorded.
async fn analyze(
    state: &AppState,
    provider: &ResolvedProvider,
    job: &JobPositionRow,
    resume: &ResumeDocument,
) -> Result<MatchAnalysis, AppError> {
    let context = job_prompt_context(state, job).await?;
    let profile = match load_job_profile(state, job).await? {
        Some(document) => serde_json::to_string_pretty(&document.profile)
            .map_err(|e| AppError::Internal(e.into()))?,
        None => NO_PROFILE.to_string(),
    };
    let resume_json =
        serde_json::to_string_pretty(resume).map_err(|e| AppError::Internal(e.into()))?;

    let prompt = match_analysis_prompt(&context, &profile, &resume_json);
    match state
        .llm
        .call_json::<MatchAnalysis>(provider, &prompt, MATCH_ANALYSIS_SYSTEM)
        .await
    {
        Ok(analysis) => Ok(analysis),
        Err(e) => {
            warn!("Match analysis failed for job {}: {e}", job.id);
            Ok(MatchAnalysis::failed(format!("LLM analysis failed: {e}")))
        }
    }
}

fn weights_and_thresholds(
    model: Option<&SelectedModel>,
    job_title: &str,
) -> (FusionWeights, WeightSource, LabelThresholds) {
    match model {
        Some(model) => (
            model.config.weights(),
            WeightSource::MatchModel,
            model.config.thresholds,
        ),
        None => {
            let (weights, source) = weights_for_title(job_title);
            (weights, source, LabelThresholds::default())
        }
    }
}

pub async fn match_resume_to_job(state: &AppState, req: MatchRequest) -> Result<MatchOutcome, AppError> {
    let job = fetch_job(state, req.tenant_id, req.job_id).await?;
    ensure_matchable(&job)?;
    let resume = fetch_resume(state, req.tenant_id, req.resume_id).await?;
    let document = load_resume_document(state, &resume).await?;

    let model = select_match_model(state, req.tenant_id, req.match_model_id).await?;
    let provider = resolve_provider(state, req.user_id).await?;

    let similarity = vector_similarity(state, &provider, &job, &document).await;
    let rules = load_active_rules(&state.db, req.tenant_id).await?;
    let rule_outcome = evaluate(&rules, &document, Utc::now().date_naive());
    let analysis = analyze(state, &provider, &job, &document).await?;

    let (weights, source, thresholds) = weights_and_thresholds(model.as_ref(), &job.title);
    let components = Components::new(
        similarity,
        &rule_outcome,
        analysis.llm_score(),
        analysis.org_score(),
    );
    let breakdown = fuse(components, weights, source, thresholds);
    let match_model_id = model.as_ref().map(|m| m.id);

    let record = sqlx::query_as::<_, MatchRow>(
        r#"
        INSERT INTO resume_job_matches (
            id, tenant_id, resume_id, job_id, match_model_id, score, label, status, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (resume_id, job_id) DO UPDATE SET
            match_model_id = EXCLUDED.match_model_id,
            score = EXCLUDED.score,
            label = EXCLUDED.label,
            status = EXCLUDED.status,
            created_by = EXCLUDED.created_by,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(req.tenant_id)
    .bind(resume.id)
    .bind(job.id)
    .bind(match_model_id)
    .bind(breakdown.final_score)
    .bind(breakdown.label.as_str())
    .bind(MatchStatus::Pending.as_str())
    .bind(req.user_id)
    .fetch_one(&state.db)
    .await?;

    let detail = MatchDetail {
        match_id: record.id,
        resume_id: resume.id,
        job_id: job.id,
        match_model_id,
        vector_similarity: similarity,
        rule_outcome,
        analysis,
        breakdown,
        matched_at: Utc::now(),
    };
    let detail_key = keys::match_detail(req.tenant_id, record.id);
    put_json(state.documents.as_ref(), &detail_key, &detail).await?;

    let record = if record.detail_key.as_deref() == Some(detail_key.as_str()) {
        record
    } else {
        sqlx::query_as::<_, MatchRow>(
            "UPDATE resume_job_matches SET detail_key = $2 WHERE id = $1 RETURNING *",
        )
        .bind(record.id)
        .bind(&detail_key)
        .fetch_one(&state.db)
        .await?
    };

    info!(
        "Matched resume {} to job {}: score={} label={} ({})",
        resume.id, job.id, record.score, record.label, detail.breakdown.weight_source
    );
    Ok(MatchOutcome { record, detail })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::fusion::{DEFAULT_WEIGHTS, TECHNICAL_WEIGHTS};
    use crate::matching::models::MatchModelConfig;

    fn job(status: &str) -> JobPositionRow {
        JobPositionRow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            title: "Data Engineer".into(),
            department: None,
            department_id: None,
            description: None,
            requirements: None,
            location: None,
            salary_min: None,
            salary_max: None,
            employment_type: None,
            status: status.into(),
            profile_key: None,
            vector_id: None,
            created_by: None,
            published_at: None,
            closed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn closed_jobs_cannot_be_matched() {
        assert!(ensure_matchable(&job("published")).is_ok());
        assert!(ensure_matchable(&job("draft")).is_ok());
        assert!(matches!(
            ensure_matchable(&job("closed")),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn match_model_overrides_title_weights() {
        let (weights, source, _) = weights_and_thresholds(None, "Data Engineer");
        assert_eq!(weights, TECHNICAL_WEIGHTS);
        assert_eq!(source, WeightSource::Technical);

        let model = SelectedModel {
            id: Uuid::new_v4(),
            config: MatchModelConfig {
                vector_weight: 0.1,
                rule_weight: 0.1,
                llm_weight: 0.8,
                org_weight: 0.0,
                thresholds: LabelThresholds {
                    strongly_recommended: 9.0,
                    recommended: 7.0,
                    cautious: 5.0,
                },
            },
        };
        let (weights, source, thresholds) = weights_and_thresholds(Some(&model), "Data Engineer");
        assert_eq!(weights.llm_weight, 0.8);
        assert_ne!(weights, DEFAULT_WEIGHTS);
        assert_eq!(source, WeightSource::MatchModel);
        assert_eq!(thresholds.strongly_recommended, 9.0);
    }
}
