//! Rule evaluation. Pure: callers load the rules and the resume, and pass
//! `today` so age and experience are reproducible.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::filter_rule::{FilterRuleRow, LogicOperator, RuleType};
use crate::resumes::parser::{degree_level, ResumeDocument};

text_enum! {
    CompareOp {
        Eq => "==",
        Ne => "!=",
        Gt => ">",
        Ge => ">=",
        Lt => "<",
        Le => "<=",
        In => "in",
        NotIn => "not_in",
    }
}

impl CompareOp {
    fn is_ordering(self) -> bool {
        !matches!(self, CompareOp::In | CompareOp::NotIn)
    }

    fn compare_numbers(self, actual: f64, expected: f64) -> bool {
        match self {
            CompareOp::Eq => actual == expected,
            CompareOp::Ne => actual != expected,
            CompareOp::Gt => actual > expected,
            CompareOp::Ge => actual >= expected,
            CompareOp::Lt => actual < expected,
            CompareOp::Le => actual <= expected,
            CompareOp::In | CompareOp::NotIn => false,
        }
    }

    /// Generic comparison over JSON values. Numbers compare numerically,
    /// strings case-insensitively; `in`/`not_in` need an array on the right.
    fn compare_values(self, actual: &Value, expected: &Value) -> bool {
        match self {
            CompareOp::In => expected
                .as_array()
                .is_some_and(|items| items.iter().any(|v| values_equal(actual, v))),
            CompareOp::NotIn => expected
                .as_array()
                .map_or(true, |items| !items.iter().any(|v| values_equal(actual, v))),
            CompareOp::Eq => values_equal(actual, expected),
            CompareOp::Ne => !values_equal(actual, expected),
            ordering => match (as_number(actual), as_number(expected)) {
                (Some(a), Some(b)) => ordering.compare_numbers(a, b),
                _ => match (actual.as_str(), expected.as_str()) {
                    (Some(a), Some(b)) => {
                        let (a, b) = (a.to_lowercase(), b.to_lowercase());
                        match ordering {
                            CompareOp::Gt => a > b,
                            CompareOp::Ge => a >= b,
                            CompareOp::Lt => a < b,
                            CompareOp::Le => a <= b,
                            _ => false,
                        }
                    }
                    _ => false,
                },
            },
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x == y;
    }
    match (a.as_str(), b.as_str()) {
        (Some(x), Some(y)) => x.trim().eq_ignore_ascii_case(y.trim()),
        _ => a == b,
    }
}

fn default_ge() -> CompareOp {
    CompareOp::Ge
}

fn default_eq() -> CompareOp {
    CompareOp::Eq
}

// ────────────────────────────────────────────────────────────────────────────
// Typed rule configs
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EducationRule {
    pub degree: String,
    #[serde(default = "default_ge")]
    pub operator: CompareOp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceRule {
    pub years: f64,
    #[serde(default = "default_ge")]
    pub operator: CompareOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AgeOperator {
    #[default]
    #[serde(rename = "in_range")]
    InRange,
    #[serde(untagged)]
    Compare(CompareOp),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgeRule {
    #[serde(deserialize_with = "crate::lenient::text")]
    pub age_range: Option<String>,
    #[serde(default)]
    pub operator: AgeOperator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillMatch {
    #[default]
    Any,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRule {
    pub skills: Vec<String>,
    #[serde(default)]
    pub match_type: SkillMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationRule {
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomRule {
    pub field_path: String,
    #[serde(default = "default_eq")]
    pub operator: CompareOp,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgeBounds {
    Range(i32, i32),
    Single(i32),
}

fn parse_age_range(raw: &str) -> Option<AgeBounds> {
    let cleaned = raw.trim().trim_end_matches(['岁', '歲']).trim();
    match cleaned.split_once(['-', '~', '–']) {
        Some((lo, hi)) => {
            let lo = lo.trim().parse().ok()?;
            let hi = hi.trim().trim_end_matches('岁').trim().parse().ok()?;
            (lo <= hi).then_some(AgeBounds::Range(lo, hi))
        }
        None => cleaned.parse().ok().map(AgeBounds::Single),
    }
}

#[derive(Debug, Clone)]
pub enum RuleConfig {
    Education(EducationRule),
    Experience(ExperienceRule),
    Age(AgeRule),
    Skill(SkillRule),
    Location(LocationRule),
    Custom(CustomRule),
}

impl RuleConfig {
    /// Validates `config` against the shape `rule_type` requires.
    pub fn parse(rule_type: RuleType, config: &Value) -> Result<Self, String> {
        fn typed<T: serde::de::DeserializeOwned>(config: &Value) -> Result<T, String> {
            serde_json::from_value(config.clone()).map_err(|e| e.to_string())
        }

        let parsed = match rule_type {
            RuleType::Education => {
                let rule: EducationRule = typed(config)?;
                if degree_level(&rule.degree).is_none() {
                    return Err(format!("unknown degree '{}'", rule.degree));
                }
                if !rule.operator.is_ordering() {
                    return Err("education rules need a comparison operator".to_string());
                }
                RuleConfig::Education(rule)
            }
            RuleType::Experience => {
                let rule: ExperienceRule = typed(config)?;
                if rule.years < 0.0 || !rule.years.is_finite() {
                    return Err("years must be a non-negative number".to_string());
                }
                if !rule.operator.is_ordering() {
                    return Err("experience rules need a comparison operator".to_string());
                }
                RuleConfig::Experience(rule)
            }
            RuleType::Age => {
                let rule: AgeRule = typed(config)?;
                let bounds = rule
                    .age_range
                    .as_deref()
                    .and_then(parse_age_range)
                    .ok_or_else(|| "age_range must look like \"25-35\" or \"30\"".to_string())?;
                match (rule.operator, bounds) {
                    (AgeOperator::Compare(op), _) if !op.is_ordering() => {
                        return Err("age rules need in_range or a comparison operator".to_string())
                    }
                    (AgeOperator::Compare(_), AgeBounds::Range(..)) => {
                        return Err("a comparison operator needs a single age".to_string())
                    }
                    _ => {}
                }
                RuleConfig::Age(rule)
            }
            RuleType::Skill => {
                let rule: SkillRule = typed(config)?;
                if rule.skills.iter().all(|s| s.trim().is_empty()) {
                    return Err("skills must not be empty".to_string());
                }
                RuleConfig::Skill(rule)
            }
            RuleType::Location => {
                let rule: LocationRule = typed(config)?;
                if rule.locations.iter().all(|s| s.trim().is_empty()) {
                    return Err("locations must not be empty".to_string());
                }
                RuleConfig::Location(rule)
            }
            RuleType::Custom => {
                let rule: CustomRule = typed(config)?;
                if rule.field_path.trim().is_empty() {
                    return Err("field_path must not be empty".to_string());
                }
                RuleConfig::Custom(rule)
            }
        };
        Ok(parsed)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Evaluation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDetail {
    pub rule_id: Uuid,
    pub name: String,
    pub rule_type: String,
    pub logic_operator: String,
    pub passed: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterOutcome {
    pub passed: bool,
    pub failed_rules: Vec<String>,
    pub rule_details: Vec<RuleDetail>,
    pub summary: String,
}

impl FilterOutcome {
    pub fn passed_count(&self) -> usize {
        self.rule_details.iter().filter(|d| d.passed).count()
    }
}

pub const NO_RULES_SUMMARY: &str = "no active filter rules";

fn check(config: &RuleConfig, resume: &ResumeDocument, today: NaiveDate) -> (bool, String) {
    match config {
        RuleConfig::Education(rule) => {
            let Some((level, label)) = resume.highest_education() else {
                return (false, "resume has no education entries".to_string());
            };
            let required = degree_level(&rule.degree).unwrap_or(0);
            let passed = rule.operator.compare_numbers(level.into(), required.into());
            (
                passed,
                format!(
                    "candidate education {label} (level {level}) {} required {} (level {required})",
                    rule.operator, rule.degree
                ),
            )
        }
        RuleConfig::Experience(rule) => {
            if resume.work_experiences.is_empty() {
                return (false, "resume has no work experience".to_string());
            }
            let years = resume.years_of_experience(today);
            (
                rule.operator.compare_numbers(years, rule.years),
                format!("candidate has {years} years {} required {} years", rule.operator, rule.years),
            )
        }
        RuleConfig::Age(rule) => {
            let Some(age) = resume.age_on(today) else {
                return (false, "resume has no readable birth date".to_string());
            };
            let range = rule.age_range.as_deref().unwrap_or_default();
            let Some(bounds) = parse_age_range(range) else {
                return (false, format!("invalid age range '{range}'"));
            };
            let passed = match (rule.operator, bounds) {
                (AgeOperator::InRange, AgeBounds::Range(lo, hi)) => (lo..=hi).contains(&age),
                (AgeOperator::InRange, AgeBounds::Single(target)) => (age - target).abs() <= 2,
                (AgeOperator::Compare(op), AgeBounds::Single(target)) => {
                    op.compare_numbers(age.into(), target.into())
                }
                (AgeOperator::Compare(_), AgeBounds::Range(..)) => false,
            };
            let operator = match rule.operator {
                AgeOperator::InRange => "in_range".to_string(),
                AgeOperator::Compare(op) => op.to_string(),
            };
            (passed, format!("candidate age {age}, required {operator} {range}"))
        }
        RuleConfig::Skill(rule) => {
            let have: Vec<String> = resume
                .technical_skills()
                .iter()
                .map(|s| s.trim().to_lowercase())
                .collect();
            let required: Vec<&str> = rule
                .skills
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect();
            let matched: Vec<&str> = required
                .iter()
                .copied()
                .filter(|s| have.contains(&s.to_lowercase()))
                .collect();
            let passed = match rule.match_type {
                SkillMatch::Any => !matched.is_empty(),
                SkillMatch::All => matched.len() == required.len(),
            };
            let mode = match rule.match_type {
                SkillMatch::Any => "any",
                SkillMatch::All => "all",
            };
            (
                passed,
                format!(
                    "matched [{}] of required [{}] ({mode})",
                    matched.join(", "),
                    required.join(", ")
                ),
            )
        }
        RuleConfig::Location(rule) => {
            let Some(location) = resume.location().filter(|l| !l.trim().is_empty()) else {
                return (false, "resume has no location".to_string());
            };
            let candidate = location.trim().to_lowercase();
            let hit = rule
                .locations
                .iter()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .find(|l| {
                    let wanted = l.to_lowercase();
                    candidate.contains(&wanted) || wanted.contains(&candidate)
                });
            match hit {
                Some(place) => (true, format!("candidate location {location} matches {place}")),
                None => (
                    false,
                    format!(
                        "candidate location {location} is not in [{}]",
                        rule.locations.join(", ")
                    ),
                ),
            }
        }
        RuleConfig::Custom(rule) => {
            let document = match serde_json::to_value(resume) {
                Ok(value) => value,
                Err(e) => return (false, format!("resume could not be read: {e}")),
            };
            let Some(actual) = resolve_path(&document, &rule.field_path).filter(|v| !v.is_null())
            else {
                return (false, format!("field {} is missing", rule.field_path));
            };
            (
                rule.operator.compare_values(actual, &rule.value),
                format!(
                    "field {} = {actual} {} {}",
                    rule.field_path, rule.operator, rule.value
                ),
            )
        }
    }
}

/// Walks a dotted path; numeric segments index into arrays.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn evaluate_rule(rule: &FilterRuleRow, resume: &ResumeDocument, today: NaiveDate) -> RuleDetail {
    let (passed, reason) = match RuleType::parse(&rule.rule_type) {
        None => (false, format!("unknown rule type '{}'", rule.rule_type)),
        Some(rule_type) => match RuleConfig::parse(rule_type, &rule.rule_config) {
            Ok(config) => check(&config, resume, today),
            Err(e) => (false, format!("invalid rule config: {e}")),
        },
    };
    RuleDetail {
        rule_id: rule.id,
        name: rule.name.clone(),
        rule_type: rule.rule_type.clone(),
        logic_operator: rule.logic_operator.clone(),
        passed,
        reason,
    }
}

/// Evaluates the active rules in `rules` against one resume.
///
/// AND rules are all mandatory. When OR rules exist, at least one must pass.
pub fn evaluate(rules: &[FilterRuleRow], resume: &ResumeDocument, today: NaiveDate) -> FilterOutcome {
    let mut active: Vec<&FilterRuleRow> = rules.iter().filter(|r| r.is_active).collect();
    active.sort_by(|a, b| b.priority.cmp(&a.priority));

    if active.is_empty() {
        return FilterOutcome {
            passed: true,
            failed_rules: Vec::new(),
            rule_details: Vec::new(),
            summary: NO_RULES_SUMMARY.to_string(),
        };
    }

    let details: Vec<RuleDetail> = active
        .iter()
        .map(|rule| evaluate_rule(rule, resume, today))
        .collect();

    let is_or = |d: &RuleDetail| LogicOperator::parse(&d.logic_operator) == Some(LogicOperator::Or);
    let and_passed = details.iter().filter(|d| !is_or(*d)).all(|d| d.passed);
    let mut or_rules = details.iter().filter(|d| is_or(*d)).peekable();
    let or_passed = or_rules.peek().is_none() || or_rules.any(|d| d.passed);
    let passed = and_passed && or_passed;

    let failed_rules: Vec<String> = details
        .iter()
        .filter(|d| !d.passed)
        .map(|d| d.name.clone())
        .collect();

    let total = details.len();
    let summary = if passed {
        format!(
            "passed screening ({} of {total} rules satisfied)",
            total - failed_rules.len()
        )
    } else {
        format!(
            "failed {} of {total} rules: {}",
            failed_rules.len(),
            failed_rules.join(", ")
        )
    };

    FilterOutcome {
        passed,
        failed_rules,
        rule_details: details,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn rule(name: &str, rule_type: RuleType, logic: LogicOperator, config: Value) -> FilterRuleRow {
        FilterRuleRow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            name: name.to_string(),
            description: None,
            rule_type: rule_type.as_str().to_string(),
            rule_config: config,
            logic_operator: logic.as_str().to_string(),
            priority: 0,
            is_active: true,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn resume() -> ResumeDocument {
        serde_json::from_value(json!({
            "basic_info": {"name": "Wang Fang", "birth_date": "1994-03", "location": "北京市朝阳区"},
            "education": [{"school": "PKU", "education_level": "硕士"}],
            "work_experiences": [
                {"company": "A", "start_date": "2018-07", "end_date": "2021-07"},
                {"company": "B", "start_date": "2021-07", "is_current": true}
            ],
            "skills": {"technical": {"explicit": ["Python", "Kubernetes"], "inferred": ["Linux"]}}
        }))
        .unwrap()
    }

    #[test]
    fn no_rules_passes() {
        let outcome = evaluate(&[], &resume(), today());
        assert!(outcome.passed);
        assert_eq!(outcome.summary, NO_RULES_SUMMARY);
    }

    #[test]
    fn inactive_rules_are_ignored() {
        let mut r = rule("edu", RuleType::Education, LogicOperator::And, json!({"degree": "博士"}));
        r.is_active = false;
        let outcome = evaluate(&[r], &resume(), today());
        assert!(outcome.passed);
        assert!(outcome.rule_details.is_empty());
    }

    #[test]
    fn education_compares_levels() {
        let ok = rule("edu", RuleType::Education, LogicOperator::And, json!({"degree": "bachelor", "operator": ">="}));
        let too_high = rule("phd", RuleType::Education, LogicOperator::And, json!({"degree": "博士"}));
        assert!(evaluate(&[ok], &resume(), today()).passed);
        let outcome = evaluate(&[too_high], &resume(), today());
        assert!(!outcome.passed);
        assert_eq!(outcome.failed_rules, vec!["phd"]);
    }

    #[test]
    fn experience_counts_current_role_to_today() {
        // 2018-07 .. 2024-06-15 rounds to 6.0 years.
        let five = rule("exp", RuleType::Experience, LogicOperator::And, json!({"years": 5}));
        let seven = rule("exp7", RuleType::Experience, LogicOperator::And, json!({"years": 6.5, "operator": ">="}));
        let below = rule("junior", RuleType::Experience, LogicOperator::And, json!({"years": 3, "operator": "<"}));
        assert!(evaluate(&[five], &resume(), today()).passed);
        assert!(!evaluate(&[seven], &resume(), today()).passed);
        assert!(!evaluate(&[below], &resume(), today()).passed);
    }

    #[test]
    fn age_range_and_single_value() {
        // Born 1994-03, so 30 on 2024-06-15.
        let range = rule("age", RuleType::Age, LogicOperator::And, json!({"age_range": "25-30"}));
        let near = rule("age", RuleType::Age, LogicOperator::And, json!({"age_range": "28"}));
        let far = rule("age", RuleType::Age, LogicOperator::And, json!({"age_range": "27"}));
        let under = rule("age", RuleType::Age, LogicOperator::And, json!({"age_range": 35, "operator": "<="}));
        assert!(evaluate(&[range], &resume(), today()).passed);
        assert!(evaluate(&[near], &resume(), today()).passed);
        assert!(!evaluate(&[far], &resume(), today()).passed);
        assert!(evaluate(&[under], &resume(), today()).passed);
    }

    #[test]
    fn missing_birth_date_fails_with_reason() {
        let mut doc = resume();
        doc.basic_info.birth_date = None;
        let r = rule("age", RuleType::Age, LogicOperator::And, json!({"age_range": "20-40"}));
        let outcome = evaluate(&[r], &doc, today());
        assert!(!outcome.passed);
        assert!(outcome.rule_details[0].reason.contains("birth date"));
    }

    #[test]
    fn skills_any_and_all_are_case_insensitive() {
        let any = rule("any", RuleType::Skill, LogicOperator::And, json!({"skills": ["go", "python"]}));
        let all = rule("all", RuleType::Skill, LogicOperator::And, json!({"skills": ["python", "linux"], "match_type": "all"}));
        let all_missing = rule("all2", RuleType::Skill, LogicOperator::And, json!({"skills": ["python", "rust"], "match_type": "all"}));
        assert!(evaluate(&[any], &resume(), today()).passed);
        assert!(evaluate(&[all], &resume(), today()).passed);
        assert!(!evaluate(&[all_missing], &resume(), today()).passed);
    }

    #[test]
    fn location_matches_substrings_both_ways() {
        let city = rule("loc", RuleType::Location, LogicOperator::And, json!({"locations": ["北京", "上海"]}));
        let other = rule("loc", RuleType::Location, LogicOperator::And, json!({"locations": ["深圳"]}));
        assert!(evaluate(&[city], &resume(), today()).passed);
        assert!(!evaluate(&[other], &resume(), today()).passed);
    }

    #[test]
    fn custom_rule_reads_dotted_path() {
        let r = rule(
            "school",
            RuleType::Custom,
            LogicOperator::And,
            json!({"field_path": "education.0.school", "operator": "in", "value": ["pku", "THU"]}),
        );
        assert!(evaluate(&[r], &resume(), today()).passed);

        let missing = rule(
            "wechat",
            RuleType::Custom,
            LogicOperator::And,
            json!({"field_path": "basic_info.wechat", "value": "x"}),
        );
        let outcome = evaluate(&[missing], &resume(), today());
        assert!(!outcome.passed);
        assert!(outcome.rule_details[0].reason.contains("missing"));
    }

    #[test]
    fn or_group_needs_one_pass_and_and_rules_stay_mandatory() {
        let or_fail = rule("sz", RuleType::Location, LogicOperator::Or, json!({"locations": ["深圳"]}));
        let or_pass = rule("bj", RuleType::Location, LogicOperator::Or, json!({"locations": ["北京"]}));
        let and_pass = rule("edu", RuleType::Education, LogicOperator::And, json!({"degree": "本科"}));

        let outcome = evaluate(
            &[or_fail.clone(), or_pass, and_pass.clone()],
            &resume(),
            today(),
        );
        assert!(outcome.passed);
        assert_eq!(outcome.failed_rules, vec!["sz"]);

        let outcome = evaluate(&[or_fail, and_pass], &resume(), today());
        assert!(!outcome.passed);
    }

    #[test]
    fn rules_run_in_priority_order() {
        let mut low = rule("low", RuleType::Skill, LogicOperator::And, json!({"skills": ["python"]}));
        low.priority = 1;
        let mut high = rule("high", RuleType::Skill, LogicOperator::And, json!({"skills": ["linux"]}));
        high.priority = 10;
        let outcome = evaluate(&[low, high], &resume(), today());
        assert_eq!(outcome.rule_details[0].name, "high");
        assert_eq!(outcome.passed_count(), 2);
    }

    #[test]
    fn config_validation_rejects_mismatched_shapes() {
        assert!(RuleConfig::parse(RuleType::Education, &json!({"degree": "master"})).is_ok());
        assert!(RuleConfig::parse(RuleType::Education, &json!({"years": 3})).is_err());
        assert!(RuleConfig::parse(RuleType::Education, &json!({"degree": "wizard"})).is_err());
        assert!(RuleConfig::parse(RuleType::Experience, &json!({"years": -1})).is_err());
        assert!(RuleConfig::parse(RuleType::Age, &json!({"age_range": "35-25"})).is_err());
        assert!(RuleConfig::parse(RuleType::Age, &json!({"age_range": "25-35", "operator": ">="})).is_err());
        assert!(RuleConfig::parse(RuleType::Skill, &json!({"skills": []})).is_err());
        assert!(RuleConfig::parse(RuleType::Location, &json!({"locations": ["北京"]})).is_ok());
        assert!(RuleConfig::parse(RuleType::Custom, &json!({"field_path": ""})).is_err());
    }

    #[test]
    fn invalid_stored_config_fails_the_rule() {
        let broken = rule("broken", RuleType::Experience, LogicOperator::And, json!({"years": "many"}));
        let outcome = evaluate(&[broken], &resume(), today());
        assert!(!outcome.passed);
        assert!(outcome.rule_details[0].reason.starts_with("invalid rule config"));
    }
}
