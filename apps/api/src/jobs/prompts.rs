// LLM prompt constants for job profile extraction.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for job profile extraction.
pub const JOB_PROFILE_SYSTEM: &str = "You are a senior recruiting analyst. \
    Extract a structured hiring profile from a job posting and its company context. \
    Base every field on the provided text; use null or an empty array when the text is silent. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Job profile prompt template. Replace `{context}` before sending.
pub const JOB_PROFILE_PROMPT_TEMPLATE: &str = r#"Extract the hiring profile for the position below.

{context}

Return a JSON object with this EXACT schema:
{
  "title": "position title",
  "requirements": {
    "education": {"degree": "minimum degree, e.g. bachelor", "majors": ["preferred majors"]},
    "experience": {"years": 3, "fields": ["relevant domains"]},
    "skills": ["required skills"],
    "age_range": "e.g. 25-35, or null",
    "location": "work location, or null",
    "salary_range": "e.g. 20k-35k, or null"
  },
  "responsibilities": ["core duties"],
  "description": "two or three sentence summary of the role",
  "preferences": {
    "reliability": "high | medium | low",
    "innovation": "high | medium | low",
    "teamwork": "high | medium | low",
    "security": "high | medium | low"
  }
}

Rules:
- "years" is a number of years, not text.
- Skills are short canonical names (e.g. "PostgreSQL", not "experience with PostgreSQL databases").
- Preferences reflect what the company context says it values; omit keys you cannot infer.
"#;

pub fn job_profile_prompt(context: &str) -> String {
    JOB_PROFILE_PROMPT_TEMPLATE.replace("{context}", context)
}
