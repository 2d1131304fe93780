// LLM prompt constants for resume parsing.

/// System prompt for resume parsing.
pub const RESUME_PARSE_SYSTEM: &str = "You are an experienced recruiter who reads resumes in English and Chinese. \
    Extract the candidate's information into structured JSON exactly as written in the resume. \
    Never invent facts; use null or an empty array when the resume is silent. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Resume parsing prompt template. Replace `{resume_text}` before sending.
pub const RESUME_PARSE_PROMPT_TEMPLATE: &str = r#"Parse the resume below.

--- RESUME ---
{resume_text}
--- END RESUME ---

Return a JSON object with this EXACT schema:
{
  "basic_info": {
    "name": "full name",
    "email": "email address",
    "phone": "phone number",
    "gender": "male | female | null",
    "birth_date": "YYYY-MM or YYYY-MM-DD",
    "location": "city of residence",
    "current_location": "city of current employment"
  },
  "education": [
    {
      "school": "institution",
      "major": "field of study",
      "education_level": "high_school | associate | bachelor | master | doctorate",
      "degree": "degree as written",
      "start_date": "YYYY-MM",
      "graduation_date": "YYYY-MM"
    }
  ],
  "work_experiences": [
    {
      "company": "employer",
      "position": "job title",
      "location": "city",
      "start_date": "YYYY-MM",
      "end_date": "YYYY-MM, or null when current",
      "is_current": false,
      "responsibilities": ["duties"],
      "achievements": ["measurable results"]
    }
  ],
  "skills": {
    "technical": {
      "explicit": ["skills the resume names"],
      "inferred": ["skills clearly implied by the work described"]
    },
    "soft": ["soft skills"],
    "languages": ["spoken languages with level"]
  },
  "projects": [
    {
      "name": "project name",
      "role": "candidate's role",
      "start_date": "YYYY-MM",
      "end_date": "YYYY-MM",
      "description": "what the project did",
      "achievements": ["results"]
    }
  ],
  "summary": "two sentence professional summary"
}

Rules:
- Dates use YYYY-MM. Write "present" work as "end_date": null with "is_current": true.
- List education and work experience newest first.
- Skills are short canonical names (e.g. "Kubernetes", not "deployed services on Kubernetes").
"#;

pub fn resume_parse_prompt(resume_text: &str) -> String {
    RESUME_PARSE_PROMPT_TEMPLATE.replace("{resume_text}", resume_text)
}
