//! Tolerant deserializers for LLM-produced JSON, where numbers arrive as
//! strings, lists arrive as comma-separated text and fields go missing.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// `3`, `3.5`, `"3"`, `"3+ years"` → `Some(3.0 | 3.5)`; anything else → `None`.
pub fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(number_from_value(&Value::deserialize(deserializer)?))
}

pub fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => leading_number(s),
        _ => None,
    }
}

fn leading_number(text: &str) -> Option<f64> {
    let trimmed = text.trim_start();
    let end = trimmed
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

/// Any scalar as text. `null` and empty strings become `None`.
pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(text_from_value(&Value::deserialize(deserializer)?))
}

pub fn text_from_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// A list of strings, a single comma/semicolon separated string, or `null`.
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(string_list_from_value(&Value::deserialize(deserializer)?))
}

pub fn string_list_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(text_from_value).collect(),
        Value::String(s) => s
            .split([',', ';', '，', '、'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// A list that may arrive as `null`.
pub fn seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// `true`, `"true"`, `"yes"` or `1`. Anything else is `false`.
pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_are_read_from_strings() {
        assert_eq!(number_from_value(&json!(3)), Some(3.0));
        assert_eq!(number_from_value(&json!("3.5")), Some(3.5));
        assert_eq!(number_from_value(&json!("5+ years")), Some(5.0));
        assert_eq!(number_from_value(&json!("unknown")), None);
        assert_eq!(number_from_value(&Value::Null), None);
    }

    #[test]
    fn lists_accept_delimited_text() {
        assert_eq!(
            string_list_from_value(&json!("Rust, Go;Python、SQL")),
            vec!["Rust", "Go", "Python", "SQL"]
        );
        assert_eq!(string_list_from_value(&json!(["a", 1, null])), vec!["a", "1"]);
        assert!(string_list_from_value(&Value::Null).is_empty());
    }

    #[test]
    fn blank_text_is_none() {
        assert_eq!(text_from_value(&json!("  ")), None);
        assert_eq!(text_from_value(&json!(42)), Some("42".to_string()));
    }
}
