//! Structured resume payload produced by the LLM, plus the derived facts
//! (highest degree, total experience, age) that rules and summaries read.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::lenient;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasicInfo {
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub gender: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub birth_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub birthday: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub current_location: Option<String>,
    /// Fields the model returned that have no typed slot.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Education {
    #[serde(default, deserialize_with = "lenient::text")]
    pub school: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub major: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub education_level: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub degree: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub graduation_date: Option<String>,
}

impl Education {
    /// Rank of this entry: whichever of `degree` and `education_level` ranks higher.
    pub fn level(&self) -> Option<u8> {
        [self.degree.as_deref(), self.education_level.as_deref()]
            .into_iter()
            .flatten()
            .filter_map(degree_level)
            .max()
    }

    pub fn label(&self) -> Option<&str> {
        self.education_level.as_deref().or(self.degree.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkExperience {
    #[serde(default, deserialize_with = "lenient::text")]
    pub company: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub position: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub end_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_current: bool,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub responsibilities: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub achievements: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechnicalSkills {
    pub explicit: Vec<String>,
    pub inferred: Vec<String>,
}

/// Accepts a flat list (all explicit) or `{explicit, inferred|implicit}`.
fn technical_skills<'de, D>(deserializer: D) -> Result<TechnicalSkills, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => TechnicalSkills {
            explicit: map
                .get("explicit")
                .map(lenient::string_list_from_value)
                .unwrap_or_default(),
            inferred: map
                .get("inferred")
                .or_else(|| map.get("implicit"))
                .map(lenient::string_list_from_value)
                .unwrap_or_default(),
        },
        other => TechnicalSkills {
            explicit: lenient::string_list_from_value(&other),
            inferred: Vec::new(),
        },
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Skills {
    #[serde(default, deserialize_with = "technical_skills")]
    pub technical: TechnicalSkills,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub soft: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub end_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub achievements: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeDocument {
    #[serde(default)]
    pub basic_info: BasicInfo,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub education: Vec<Education>,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub work_experiences: Vec<WorkExperience>,
    #[serde(default)]
    pub skills: Skills,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub projects: Vec<Project>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub summary: Option<String>,
}

impl BasicInfo {
    pub fn birth_date(&self) -> Option<&str> {
        self.birth_date.as_deref().or(self.birthday.as_deref())
    }
}

impl ResumeDocument {
    /// Highest-ranked education entry's label, e.g. `"master"` or `"硕士"`.
    pub fn highest_education(&self) -> Option<(u8, &str)> {
        self.education
            .iter()
            .filter_map(|e| Some((e.level()?, e.label()?)))
            .max_by_key(|(level, _)| *level)
    }

    /// Explicit then inferred technical skills, deduplicated case-insensitively.
    pub fn technical_skills(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.skills
            .technical
            .explicit
            .iter()
            .chain(&self.skills.technical.inferred)
            .filter(|s| seen.insert(s.to_lowercase()))
            .cloned()
            .collect()
    }

    pub fn location(&self) -> Option<&str> {
        self.basic_info
            .location
            .as_deref()
            .or(self.basic_info.current_location.as_deref())
    }

    /// Total years across work experiences, days/365 rounded to one decimal.
    /// Entries without a readable start date are skipped; a missing, unreadable
    /// or "present" end date counts up to `today`.
    pub fn years_of_experience(&self, today: NaiveDate) -> f64 {
        let days: i64 = self
            .work_experiences
            .iter()
            .filter_map(|exp| {
                let start = exp.start_date.as_deref().and_then(parse_year_month)?;
                let end = if exp.is_current {
                    today
                } else {
                    exp.end_date
                        .as_deref()
                        .and_then(parse_year_month)
                        .unwrap_or(today)
                };
                Some((end - start).num_days().max(0))
            })
            .sum();
        (days as f64 / 365.0 * 10.0).round() / 10.0
    }

    /// Age in whole years on `today`, from `basic_info.birth_date`.
    pub fn age_on(&self, today: NaiveDate) -> Option<i32> {
        let birth = self.basic_info.birth_date().and_then(parse_year_month)?;
        let mut age = today.year() - birth.year();
        if (today.month(), today.day()) < (birth.month(), birth.day()) {
            age -= 1;
        }
        (age >= 0).then_some(age)
    }

    /// Compact text used for the resume embedding.
    pub fn embedding_text(&self) -> String {
        let mut parts = Vec::new();
        let skills = self.technical_skills();
        if !skills.is_empty() {
            parts.push(format!("Skills: {}", skills.join(", ")));
        }
        for exp in &self.work_experiences {
            let role = [exp.position.as_deref(), exp.company.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" at ");
            if !role.is_empty() {
                parts.push(format!("Experience: {role}"));
            }
            if !exp.responsibilities.is_empty() {
                parts.push(exp.responsibilities.join("; "));
            }
        }
        for edu in &self.education {
            if let Some(label) = edu.label() {
                let major = edu.major.as_deref().unwrap_or_default();
                parts.push(format!("Education: {label} {major}").trim_end().to_string());
            }
        }
        for project in &self.projects {
            if let Some(name) = &project.name {
                parts.push(format!("Project: {name}"));
            }
        }
        if let Some(summary) = &self.summary {
            parts.push(summary.clone());
        }
        parts.join(" | ")
    }
}

/// Degree rank: doctorate 5, master 4, bachelor 3, associate 2, high school 1,
/// middle school 0. Matches English and Chinese names by substring.
pub fn degree_level(raw: &str) -> Option<u8> {
    let text = raw.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }
    // Checked in order; middle-school names contain "high school".
    const LEVELS: &[(u8, &[&str])] = &[
        (0, &["middle school", "junior high", "初中"]),
        (5, &["doctor", "phd", "ph.d", "博士"]),
        (4, &["master", "msc", "mba", "硕士", "研究生"]),
        (3, &["bachelor", "undergraduate", "本科", "学士"]),
        (2, &["associate", "college", "diploma", "专科", "大专"]),
        (1, &["high school", "secondary", "高中", "中专", "职高"]),
    ];
    LEVELS
        .iter()
        .find(|(_, names)| names.iter().any(|n| text.contains(n)))
        .map(|(level, _)| *level)
}

/// Parses `YYYY-MM`, `YYYY.MM`, `YYYY/MM`, `YYYY年MM月`, `YYYY-MM-DD` and bare
/// `YYYY` (as January) to the first of the month.
pub fn parse_year_month(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    let year_part: String = text.chars().take_while(char::is_ascii_digit).collect();
    if year_part.len() != 4 {
        return None;
    }
    let year: i32 = year_part.parse().ok()?;

    let rest = &text[4..];
    let mut chars = rest.chars();
    let month = match chars.next() {
        None => 1,
        Some('-' | '.' | '/' | '年') => {
            let digits: String = chars.by_ref().take_while(char::is_ascii_digit).collect();
            if digits.is_empty() {
                1
            } else {
                digits.parse().ok()?
            }
        }
        Some(_) => return None,
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn year_month_formats() {
        assert_eq!(parse_year_month("2019-04"), Some(date(2019, 4, 1)));
        assert_eq!(parse_year_month("2019.4"), Some(date(2019, 4, 1)));
        assert_eq!(parse_year_month("2019/04"), Some(date(2019, 4, 1)));
        assert_eq!(parse_year_month("2019年4月"), Some(date(2019, 4, 1)));
        assert_eq!(parse_year_month("2019"), Some(date(2019, 1, 1)));
        assert_eq!(parse_year_month("2019-04-18"), Some(date(2019, 4, 1)));
        assert_eq!(parse_year_month("present"), None);
        assert_eq!(parse_year_month("2019-13"), None);
        assert_eq!(parse_year_month("19-04"), None);
    }

    #[test]
    fn degree_levels_cover_both_languages() {
        assert_eq!(degree_level("PhD"), Some(5));
        assert_eq!(degree_level("博士"), Some(5));
        assert_eq!(degree_level("Master of Science"), Some(4));
        assert_eq!(degree_level("本科"), Some(3));
        assert_eq!(degree_level("Associate"), Some(2));
        assert_eq!(degree_level("High School"), Some(1));
        assert_eq!(degree_level("初中"), Some(0));
        assert_eq!(degree_level("Junior High School"), Some(0));
        assert_eq!(degree_level("Senior High School"), Some(1));
        assert_eq!(degree_level("unknown"), None);
    }

    #[test]
    fn document_tolerates_loose_shapes() {
        let doc: ResumeDocument = serde_json::from_str(
            r#"{
                "basic_info": {"name": "Li Lei", "birthday": "1995-06", "wechat": "lilei"},
                "education": null,
                "work_experiences": [{"company": "Acme", "start_date": "2020-01", "is_current": "true"}],
                "skills": {"technical": ["Rust", "SQL"], "soft": "communication, teamwork"}
            }"#,
        )
        .unwrap();

        assert_eq!(doc.basic_info.birth_date(), Some("1995-06"));
        assert_eq!(doc.basic_info.extra["wechat"], "lilei");
        assert!(doc.education.is_empty());
        assert!(doc.work_experiences[0].is_current);
        assert_eq!(doc.skills.technical.explicit, vec!["Rust", "SQL"]);
        assert_eq!(doc.skills.soft.len(), 2);
    }

    #[test]
    fn split_technical_skills_are_merged_without_duplicates() {
        let doc: ResumeDocument = serde_json::from_str(
            r#"{"skills": {"technical": {"explicit": ["Rust", "Go"], "implicit": ["rust", "Docker"]}}}"#,
        )
        .unwrap();
        assert_eq!(doc.technical_skills(), vec!["Rust", "Go", "Docker"]);
    }

    #[test]
    fn experience_sums_periods_and_counts_current_to_today() {
        let doc: ResumeDocument = serde_json::from_value(serde_json::json!({
            "work_experiences": [
                {"start_date": "2018-01", "end_date": "2020-01"},
                {"start_date": "2020-01", "end_date": "present"},
                {"start_date": null, "end_date": "2015-01"}
            ]
        }))
        .unwrap();
        let years = doc.years_of_experience(date(2023, 1, 1));
        assert_eq!(years, 5.0);
    }

    #[test]
    fn age_respects_birthday_not_yet_reached() {
        let mut doc = ResumeDocument::default();
        doc.basic_info.birth_date = Some("1990-06".into());
        assert_eq!(doc.age_on(date(2024, 5, 31)), Some(33));
        assert_eq!(doc.age_on(date(2024, 6, 1)), Some(34));
    }

    #[test]
    fn highest_education_picks_top_rank() {
        let doc: ResumeDocument = serde_json::from_value(serde_json::json!({
            "education": [
                {"school": "A", "education_level": "本科"},
                {"school": "B", "education_level": "硕士", "degree": "Master"}
            ]
        }))
        .unwrap();
        assert_eq!(doc.highest_education(), Some((4, "硕士")));
    }
}
