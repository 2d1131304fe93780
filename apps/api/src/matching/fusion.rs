//! Weighted fusion of the per-signal scores into the final match score.
//!
//! Every component is on a 0..10 scale before weighting:
//! vector similarity ×10, rule pass ratio ×10, the LLM score as returned,
//! and the organization-fit score (0..100) divided by 10.

use serde::{Deserialize, Serialize};

use crate::filtering::engine::FilterOutcome;
use crate::models::matching::MatchLabel;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub vector_weight: f64,
    pub rule_weight: f64,
    pub llm_weight: f64,
    #[serde(default)]
    pub org_weight: f64,
}

impl FusionWeights {
    const fn new(vector: f64, rule: f64, llm: f64, org: f64) -> Self {
        FusionWeights {
            vector_weight: vector,
            rule_weight: rule,
            llm_weight: llm,
            org_weight: org,
        }
    }

    fn as_array(&self) -> [f64; 4] {
        [
            self.vector_weight,
            self.rule_weight,
            self.llm_weight,
            self.org_weight,
        ]
    }

    pub fn validate(&self) -> Result<(), String> {
        let weights = self.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err("weights must be non-negative numbers".to_string());
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err("weights must not all be zero".to_string());
        }
        Ok(())
    }
}

pub const DEFAULT_WEIGHTS: FusionWeights = FusionWeights::new(0.3, 0.2, 0.5, 0.0);
pub const TECHNICAL_WEIGHTS: FusionWeights = FusionWeights::new(0.4, 0.2, 0.4, 0.0);
pub const MANAGEMENT_WEIGHTS: FusionWeights = FusionWeights::new(0.2, 0.2, 0.6, 0.0);
pub const SALES_WEIGHTS: FusionWeights = FusionWeights::new(0.2, 0.5, 0.3, 0.0);

const TECHNICAL_KEYWORDS: &[&str] = &[
    "技术", "研发", "开发", "工程师", "程序员", "架构师", "算法",
    "engineer", "developer", "programmer", "architect", "algorithm",
];
const MANAGEMENT_KEYWORDS: &[&str] = &[
    "管理", "总监", "经理", "主管", "负责人",
    "manager", "director", "head of", "leader", "lead",
];
const SALES_KEYWORDS: &[&str] = &[
    "销售", "市场", "商务", "bd", "sales", "marketing", "business development", "account executive",
];

text_enum! {
    WeightSource {
        Default => "default",
        Technical => "technical",
        Management => "management",
        Sales => "sales",
        MatchModel => "match_model",
    }
}

/// Weights picked from the job title when no match model applies.
/// Technical keywords win over management, management over sales.
pub fn weights_for_title(title: &str) -> (FusionWeights, WeightSource) {
    let title = title.to_lowercase();
    let mentions = |keywords: &[&str]| keywords.iter().any(|k| title.contains(k));

    if mentions(TECHNICAL_KEYWORDS) {
        (TECHNICAL_WEIGHTS, WeightSource::Technical)
    } else if mentions(MANAGEMENT_KEYWORDS) {
        (MANAGEMENT_WEIGHTS, WeightSource::Management)
    } else if mentions(SALES_KEYWORDS) {
        (SALES_WEIGHTS, WeightSource::Sales)
    } else {
        (DEFAULT_WEIGHTS, WeightSource::Default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelThresholds {
    pub strongly_recommended: f64,
    pub recommended: f64,
    pub cautious: f64,
}

impl Default for LabelThresholds {
    fn default() -> Self {
        LabelThresholds {
            strongly_recommended: 8.0,
            recommended: 6.0,
            cautious: 4.0,
        }
    }
}

impl LabelThresholds {
    pub fn validate(&self) -> Result<(), String> {
        let ordered = [self.strongly_recommended, self.recommended, self.cautious];
        if ordered.iter().any(|t| !(0.0..=10.0).contains(t)) {
            return Err("thresholds must be between 0 and 10".to_string());
        }
        if !(self.strongly_recommended > self.recommended && self.recommended > self.cautious) {
            return Err(
                "thresholds must be strictly descending: strongly_recommended > recommended > cautious"
                    .to_string(),
            );
        }
        Ok(())
    }

    pub fn label(&self, score: f64) -> MatchLabel {
        if score >= self.strongly_recommended {
            MatchLabel::StronglyRecommended
        } else if score >= self.recommended {
            MatchLabel::Recommended
        } else if score >= self.cautious {
            MatchLabel::Cautious
        } else {
            MatchLabel::NotRecommended
        }
    }
}

/// Per-signal scores, each on 0..10.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Components {
    pub vector_score: f64,
    pub rule_score: f64,
    pub llm_score: f64,
    pub org_score: f64,
}

pub fn rule_score(outcome: &FilterOutcome) -> f64 {
    let total = outcome.rule_details.len();
    if total == 0 || outcome.passed {
        return 10.0;
    }
    outcome.passed_count() as f64 / total as f64 * 10.0
}

impl Components {
    pub fn new(vector_similarity: f64, rules: &FilterOutcome, llm_score: f64, org_score: f64) -> Self {
        Components {
            vector_score: vector_similarity.clamp(0.0, 1.0) * 10.0,
            rule_score: rule_score(rules),
            llm_score: llm_score.clamp(0.0, 10.0),
            org_score: org_score.clamp(0.0, 10.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub vector_score: f64,
    pub rule_score: f64,
    pub llm_score: f64,
    pub org_score: f64,
    pub final_score: f64,
    pub weights: FusionWeights,
    pub weight_source: WeightSource,
    pub thresholds: LabelThresholds,
    pub label: MatchLabel,
    pub calculation: String,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn fuse(
    components: Components,
    weights: FusionWeights,
    weight_source: WeightSource,
    thresholds: LabelThresholds,
) -> ScoreBreakdown {
    let weighted = weights.vector_weight * components.vector_score
        + weights.rule_weight * components.rule_score
        + weights.llm_weight * components.llm_score
        + weights.org_weight * components.org_score;
    let final_score = round2(weighted.clamp(0.0, 10.0));

    let calculation = format!(
        "{:.2}*{:.2} + {:.2}*{:.2} + {:.2}*{:.2} + {:.2}*{:.2} = {:.2}",
        components.vector_score,
        weights.vector_weight,
        components.rule_score,
        weights.rule_weight,
        components.llm_score,
        weights.llm_weight,
        components.org_score,
        weights.org_weight,
        final_score,
    );

    ScoreBreakdown {
        vector_score: round2(components.vector_score),
        rule_score: round2(components.rule_score),
        llm_score: round2(components.llm_score),
        org_score: round2(components.org_score),
        final_score,
        weights,
        weight_source,
        thresholds,
        label: thresholds.label(final_score),
        calculation,
    }
}
