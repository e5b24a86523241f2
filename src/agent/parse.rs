//! Lenient parsing of model output.
//!
//! Models wrap JSON in markdown fences, prepend chatter, or return a bare
//! list. These helpers recover the structured part when one exists and
//! return `None` otherwise so each agent can apply its own fallback.

use regex::Regex;
use serde_json::Value;

/// Strips a surrounding markdown code fence, if any.
#[must_use]
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    }
}

/// Finds a JSON object that carries `key`.
///
/// Tries the whole (unfenced) content first, then the first flat
/// `{ ... }` span mentioning the key.
#[must_use]
pub fn extract_object(content: &str, key: &str) -> Option<Value> {
    let body = strip_code_fence(content);
    if let Ok(value) = serde_json::from_str::<Value>(body)
        && value.get(key).is_some()
    {
        return Some(value);
    }

    let pattern = format!(r#"\{{[^{{}}]*"{}"[^{{}}]*\}}"#, regex::escape(key));
    let re = Regex::new(&pattern).ok()?;
    re.find_iter(body)
        .filter_map(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .find(|v| v.get(key).is_some())
}

/// Finds a list of strings: a bare JSON array, an array under a known
/// key, or the first `[ ... ]` span in the text.
#[must_use]
pub fn extract_string_array(content: &str) -> Option<Vec<String>> {
    let body = strip_code_fence(content);

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let array = match &value {
            Value::Array(_) => Some(&value),
            Value::Object(map) => ["sub_queries", "queries", "questions"]
                .iter()
                .find_map(|k| map.get(*k)),
            _ => None,
        };
        if let Some(items) = array.and_then(strings_of) {
            return Some(items);
        }
    }

    let re = Regex::new(r"(?s)\[.*?\]").ok()?;
    re.find_iter(body)
        .filter_map(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .find_map(|v| strings_of(&v))
}

/// Double-quoted fragments of at least `min_chars` characters.
#[must_use]
pub fn quoted_strings(content: &str, min_chars: usize) -> Vec<String> {
    let Ok(re) = Regex::new(r#""([^"\n]+)""#) else {
        return Vec::new();
    };
    re.captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| s.chars().count() >= min_chars)
        .collect()
}

/// Reads a string field, trimmed, when present and non-empty.
#[must_use]
pub fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Reads a boolean field, also accepting `"true"`/`"false"` strings.
#[must_use]
pub fn bool_field(value: &Value, key: &str) -> Option<bool> {
    match value.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn strings_of(value: &Value) -> Option<Vec<String>> {
    let items: Vec<String> = value
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() { None } else { Some(items) }
}
