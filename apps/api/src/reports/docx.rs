//! Renders a match report as a `.docx` with plain paragraphs and tables.

use std::io::Cursor;

use chrono::{DateTime, NaiveDate, Utc};
use docx_rs::{Docx, Paragraph, Run, Table, TableCell, TableRow};
use thiserror::Error;

use crate::matching::service::MatchDetail;
use crate::models::report::ReportTemplate;
use crate::resumes::parser::ResumeDocument;

pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const TITLE_SIZE: usize = 36;
const HEADING_SIZE: usize = 28;

#[derive(Debug, Error)]
#[error("failed to write report document: {0}")]
pub struct RenderError(String);

/// Everything a report shows, gathered by the handler.
pub struct ReportContent<'a> {
    pub job_title: &'a str,
    pub resume: &'a ResumeDocument,
    pub detail: &'a MatchDetail,
    pub generated_at: DateTime<Utc>,
}

fn text(value: &str) -> Paragraph {
    Paragraph::new().add_run(Run::new().add_text(value))
}

fn heading(value: &str) -> Paragraph {
    Paragraph::new().add_run(Run::new().add_text(value).bold().size(HEADING_SIZE))
}

fn bullet_list(doc: Docx, title: &str, items: &[String]) -> Docx {
    let doc = doc.add_paragraph(heading(title));
    if items.is_empty() {
        return doc.add_paragraph(text("None noted."));
    }
    items
        .iter()
        .fold(doc, |doc, item| doc.add_paragraph(text(&format!("• {item}"))))
}

fn cell(value: &str) -> TableCell {
    TableCell::new().add_paragraph(text(value))
}

fn header_cell(value: &str) -> TableCell {
    TableCell::new().add_paragraph(Paragraph::new().add_run(Run::new().add_text(value).bold()))
}

fn table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut table_rows = vec![TableRow::new(headers.iter().map(|h| header_cell(h)).collect())];
    table_rows.extend(
        rows.iter()
            .map(|row| TableRow::new(row.iter().map(|v| cell(v)).collect())),
    );
    Table::new(table_rows)
}

fn or_dash(value: Option<&str>) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or("-").to_string()
}

fn period(start: Option<&str>, end: Option<&str>) -> String {
    format!("{} ~ {}", or_dash(start), or_dash(end))
}

pub fn candidate_name(resume: &ResumeDocument) -> &str {
    resume.basic_info.name.as_deref().unwrap_or("Unnamed candidate")
}

fn basics(doc: Docx, content: &ReportContent, today: NaiveDate) -> Docx {
    let info = &content.resume.basic_info;
    let education = content
        .resume
        .highest_education()
        .map(|(_, label)| label.to_string());
    let rows = vec![
        vec!["Name".to_string(), candidate_name(content.resume).to_string()],
        vec!["Email".to_string(), or_dash(info.email.as_deref())],
        vec!["Phone".to_string(), or_dash(info.phone.as_deref())],
        vec!["Location".to_string(), or_dash(content.resume.location())],
        vec!["Highest education".to_string(), or_dash(education.as_deref())],
        vec![
            "Experience".to_string(),
            format!("{:.1} years", content.resume.years_of_experience(today)),
        ],
    ];
    doc.add_paragraph(heading("Candidate"))
        .add_table(table(&["Field", "Value"], rows))
}

fn score_section(doc: Docx, detail: &MatchDetail) -> Docx {
    let b = &detail.breakdown;
    let rows = vec![
        vec!["Vector similarity".to_string(), format!("{:.2}", b.vector_score), format!("{:.2}", b.weights.vector_weight)],
        vec!["Rule filter".to_string(), format!("{:.2}", b.rule_score), format!("{:.2}", b.weights.rule_weight)],
        vec!["LLM analysis".to_string(), format!("{:.2}", b.llm_score), format!("{:.2}", b.weights.llm_weight)],
        vec!["Organization fit".to_string(), format!("{:.2}", b.org_score), format!("{:.2}", b.weights.org_weight)],
    ];
    doc.add_paragraph(heading("Match score"))
        .add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text(format!("{:.2} / 10", b.final_score)).bold())
                .add_run(Run::new().add_text(format!("   {}", b.label))),
        )
        .add_table(table(&["Component", "Score (0-10)", "Weight"], rows))
        .add_paragraph(text(&format!("Calculation: {}", b.calculation)))
}

fn history_tables(doc: Docx, resume: &ResumeDocument) -> Docx {
    let education = resume
        .education
        .iter()
        .map(|e| {
            vec![
                or_dash(e.school.as_deref()),
                or_dash(e.major.as_deref()),
                or_dash(e.label()),
                period(e.start_date.as_deref(), e.graduation_date.as_deref()),
            ]
        })
        .collect();
    let work = resume
        .work_experiences
        .iter()
        .map(|w| {
            let end = if w.is_current { Some("present") } else { w.end_date.as_deref() };
            vec![
                or_dash(w.company.as_deref()),
                or_dash(w.position.as_deref()),
                period(w.start_date.as_deref(), end),
            ]
        })
        .collect();

    doc.add_paragraph(heading("Education"))
        .add_table(table(&["School", "Major", "Degree", "Period"], education))
        .add_paragraph(heading("Work experience"))
        .add_table(table(&["Company", "Position", "Period"], work))
}

pub fn render_report(content: &ReportContent, template: ReportTemplate) -> Result<Vec<u8>, RenderError> {
    let today = content.generated_at.date_naive();
    let analysis = &content.detail.analysis;

    let mut doc = Docx::new()
        .add_paragraph(
            Paragraph::new().add_run(
                Run::new()
                    .add_text(format!("Candidate Match Report: {}", candidate_name(content.resume)))
                    .bold()
                    .size(TITLE_SIZE),
            ),
        )
        .add_paragraph(text(&format!("Position: {}", content.job_title)))
        .add_paragraph(text(&format!(
            "Generated: {}",
            content.generated_at.format("%Y-%m-%d %H:%M UTC")
        )));

    doc = basics(doc, content, today);
    doc = score_section(doc, content.detail);
    doc = bullet_list(doc, "Strengths", &analysis.strengths);
    doc = bullet_list(doc, "Weaknesses", &analysis.weaknesses);
    doc = bullet_list(doc, "Risks", &analysis.risks);

    doc = doc.add_paragraph(heading("Recommendation")).add_paragraph(text(
        analysis
            .recommendation
            .as_deref()
            .unwrap_or(content.detail.breakdown.label.as_str()),
    ));
    if let Some(summary) = &analysis.summary {
        doc = doc.add_paragraph(text(summary));
    }
    if let Some(error) = &analysis.error {
        doc = doc.add_paragraph(text(&format!("Note: {error}")));
    }

    if template == ReportTemplate::Standard {
        doc = history_tables(doc, content.resume);
    }

    let mut buffer = Cursor::new(Vec::new());
    doc.build()
        .pack(&mut buffer)
        .map_err(|e| RenderError(e.to_string()))?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filtering::engine::FilterOutcome;
    use crate::matching::analysis::MatchAnalysis;
    use crate::matching::fusion::{fuse, Components, LabelThresholds, WeightSource, DEFAULT_WEIGHTS};
    use serde_json::json;
    use std::io::Read;
    use uuid::Uuid;

    fn detail() -> MatchDetail {
        let rule_outcome = FilterOutcome {
            passed: true,
            failed_rules: vec![],
            rule_details: vec![],
            summary: "no active filter rules".into(),
        };
        let analysis = MatchAnalysis {
            score: Some(8.0),
            strengths: vec!["Strong Rust background".into()],
            risks: vec!["Two jobs in one year".into()],
            recommendation: Some("recommended".into()),
            ..Default::default()
        };
        let breakdown = fuse(
            Components::new(0.7, &rule_outcome, 8.0, 5.0),
            DEFAULT_WEIGHTS,
            WeightSource::Default,
            LabelThresholds::default(),
        );
        MatchDetail {
            match_id: Uuid::new_v4(),
            resume_id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            match_model_id: None,
            vector_similarity: 0.7,
            rule_outcome,
            analysis,
            breakdown,
            matched_at: Utc::now(),
        }
    }

    fn resume() -> ResumeDocument {
        serde_json::from_value(json!({
            "basic_info": {"name": "Wang Fang", "email": "wf@example.com"},
            "education": [{"school": "Fudan University", "major": "CS", "education_level": "master"}],
            "work_experiences": [{"company": "Acme Robotics", "position": "Backend Engineer", "start_date": "2019-03", "is_current": true}]
        }))
        .unwrap()
    }

    fn document_xml(bytes: Vec<u8>) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        xml
    }

    #[test]
    fn standard_report_has_history_tables() {
        let (resume, detail) = (resume(), detail());
        let content = ReportContent {
            job_title: "Senior Rust Engineer",
            resume: &resume,
            detail: &detail,
            generated_at: Utc::now(),
        };
        let xml = document_xml(render_report(&content, ReportTemplate::Standard).unwrap());
        assert!(xml.contains("Wang Fang"));
        assert!(xml.contains("Senior Rust Engineer"));
        assert!(xml.contains("Strong Rust background"));
        assert!(xml.contains("Acme Robotics"));
        assert!(xml.contains("Fudan University"));
    }

    #[test]
    fn summary_report_omits_history() {
        let (resume, detail) = (resume(), detail());
        let content = ReportContent {
            job_title: "Senior Rust Engineer",
            resume: &resume,
            detail: &detail,
            generated_at: Utc::now(),
        };
        let xml = document_xml(render_report(&content, ReportTemplate::Summary).unwrap());
        assert!(xml.contains("Two jobs in one year"));
        assert!(!xml.contains("Acme Robotics"));
    }
}
