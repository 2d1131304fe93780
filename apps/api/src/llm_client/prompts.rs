// Shared prompt fragments and the organization-context builder.
// Each feature that calls the LLM keeps its own prompts.rs alongside it.

use crate::models::company::CompanyInfoRow;
use crate::models::department::DepartmentRow;
use crate::models::job::JobPositionRow;

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Sent by the connection test. Any non-empty reply counts as success.
pub const PING_PROMPT: &str = "Reply with the single word: pong";
pub const PING_SYSTEM: &str = "You are a connectivity check. Answer as briefly as possible.";

fn push_field(out: &mut String, label: &str, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
        out.push_str(&format!("- {label}: {value}\n"));
    }
}

pub fn company_context(company: &CompanyInfoRow) -> String {
    let mut out = String::from("## Company\n");
    push_field(&mut out, "Name", Some(&company.name));
    push_field(&mut out, "Industry", company.industry.as_deref());
    push_field(&mut out, "Products", company.products.as_deref());
    push_field(
        &mut out,
        "Application scenarios",
        company.application_scenarios.as_deref(),
    );
    push_field(&mut out, "Culture", company.company_culture.as_deref());
    push_field(&mut out, "Hiring preferences", company.preferences.as_deref());
    push_field(&mut out, "Size", company.company_size.as_deref());
    push_field(&mut out, "Development stage", company.development_stage.as_deref());
    push_field(&mut out, "Business model", company.business_model.as_deref());
    push_field(&mut out, "Core values", company.core_values.as_deref());
    push_field(
        &mut out,
        "Recruitment philosophy",
        company.recruitment_philosophy.as_deref(),
    );
    out
}

pub fn department_context(department: &DepartmentRow) -> String {
    let mut out = String::from("## Department\n");
    push_field(&mut out, "Name", Some(&department.name));
    push_field(&mut out, "Hierarchy", Some(&department.path));
    push_field(&mut out, "Description", department.description.as_deref());
    out
}

pub fn job_context(job: &JobPositionRow) -> String {
    let mut out = String::from("## Position\n");
    push_field(&mut out, "Title", Some(&job.title));
    push_field(&mut out, "Department", job.department.as_deref());
    push_field(&mut out, "Location", job.location.as_deref());
    push_field(&mut out, "Employment type", job.employment_type.as_deref());
    if let (Some(min), Some(max)) = (job.salary_min, job.salary_max) {
        out.push_str(&format!("- Salary range: {min} - {max}\n"));
    }
    push_field(&mut out, "Description", job.description.as_deref());
    push_field(&mut out, "Requirements", job.requirements.as_deref());
    out
}

/// Company, department and job sections joined in that order. Missing pieces are skipped.
pub fn organization_context(
    company: Option<&CompanyInfoRow>,
    department: Option<&DepartmentRow>,
    job: &JobPositionRow,
) -> String {
    let mut sections = Vec::with_capacity(3);
    if let Some(company) = company {
        sections.push(company_context(company));
    }
    if let Some(department) = department {
        sections.push(department_context(department));
    }
    sections.push(job_context(job));
    sections.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn job() -> JobPositionRow {
        JobPositionRow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            title: "Backend Engineer".into(),
            department: Some("Platform".into()),
            department_id: None,
            description: Some("Build APIs".into()),
            requirements: Some("  ".into()),
            location: None,
            salary_min: Some(20000),
            salary_max: Some(30000),
            employment_type: None,
            status: "draft".into(),
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
    fn job_context_skips_blank_fields() {
        let text = job_context(&job());
        assert!(text.contains("- Title: Backend Engineer"));
        assert!(text.contains("- Salary range: 20000 - 30000"));
        assert!(!text.contains("Requirements"));
        assert!(!text.contains("Location"));
    }

    #[test]
    fn organization_context_orders_sections() {
        let company = CompanyInfoRow {
            tenant_id: Uuid::new_v4(),
            name: "Acme".into(),
            industry: Some("Logistics".into()),
            products: None,
            application_scenarios: None,
            company_culture: None,
            preferences: None,
            company_size: None,
            development_stage: None,
            business_model: None,
            core_values: None,
            recruitment_philosophy: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let text = organization_context(Some(&company), None, &job());
        let company_at = text.find("## Company").unwrap();
        let job_at = text.find("## Position").unwrap();
        assert!(company_at < job_at);
        assert!(!text.contains("## Department"));
    }
}
