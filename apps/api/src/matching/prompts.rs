// LLM prompt constants for the deep match analysis.

/// System prompt for the match analysis.
pub const MATCH_ANALYSIS_SYSTEM: &str = "You are a senior recruiting expert. \
    Assess how well a candidate fits a position using only the resume, the position and the company context given. \
    Score objectively and never invent facts about the candidate. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Match analysis prompt template.
/// Replace `{context}`, `{job_profile}` and `{resume}` before sending.
pub const MATCH_ANALYSIS_PROMPT_TEMPLATE: &str = r#"Evaluate the candidate against the position.

{context}

## Structured job profile
{job_profile}

## Candidate resume
{resume}

Return a JSON object with this EXACT schema:
{
  "score": 7.5,
  "strengths": ["where the candidate meets or exceeds the requirements"],
  "weaknesses": ["requirements the candidate misses"],
  "risks": ["hiring risks, e.g. frequent job changes or unverifiable claims"],
  "organization_match": {"score": 70, "reason": "fit with the company's culture, stage and values"},
  "recommendation": "strongly_recommended | recommended | cautious | not_recommended",
  "summary": "three sentence assessment"
}

Rules:
- "score" is a number from 0 to 10 for overall fit with the position.
- "organization_match.score" is a number from 0 to 100.
- Judge organization fit only from the company context; use 50 when there is none.
"#;

/// Stand-in when the job has no parsed profile.
pub const NO_PROFILE: &str = "(not available; rely on the position description above)";

pub fn match_analysis_prompt(context: &str, job_profile: &str, resume: &str) -> String {
    MATCH_ANALYSIS_PROMPT_TEMPLATE
        .replace("{context}", context)
        .replace("{job_profile}", job_profile)
        .replace("{resume}", resume)
}
