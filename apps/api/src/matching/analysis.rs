use serde::{Deserialize, Serialize};

use crate::lenient;

/// Neutral organization-fit score (0..10) when the model gives none.
pub const NEUTRAL_ORG_SCORE: f64 = 5.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizationMatch {
    /// 0..100
    #[serde(default, deserialize_with = "lenient::number")]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub reason: Option<String>,
}

/// The LLM's deep analysis of one resume against one job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchAnalysis {
    /// 0..10
    #[serde(default, deserialize_with = "lenient::number")]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub strengths: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub weaknesses: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub risks: Vec<String>,
    #[serde(default)]
    pub organization_match: Option<OrganizationMatch>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub recommendation: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub summary: Option<String>,
    /// Set when the analysis call failed and this is the fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MatchAnalysis {
    pub fn failed(error: impl Into<String>) -> Self {
        MatchAnalysis {
            score: Some(0.0),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn llm_score(&self) -> f64 {
        self.score.unwrap_or(0.0).clamp(0.0, 10.0)
    }

    /// Organization fit rescaled from 0..100 to 0..10.
    pub fn org_score(&self) -> f64 {
        self.organization_match
            .as_ref()
            .and_then(|m| m.score)
            .map(|s| s.clamp(0.0, 100.0) / 10.0)
            .unwrap_or(NEUTRAL_ORG_SCORE)
    }
}
