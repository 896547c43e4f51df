// SPDX-License-Identifier: PMPL-1.0-or-later

//! Validating AI-produced reports
//!
//! Model output is untrusted. Result entries are accepted under several
//! field spellings, anything unusable is skipped, and missing sections get
//! defaults. Severities are clamped to what the job level may report.

use serde_json::{Map, Value};

use crate::ai::{extract_json_object, interpret, AiPayload};
use crate::core::{renumber, Confidence, Finding, Severity, VerificationLevel};
use crate::error::{excerpt, ParseError};

/// Keys that may carry specification text, in lookup order
const SPEC_KEYS: &[&str] = &["specifications", "spec_draft", "specification", "spec", "content"];

/// Validated findings plus the log lines the model supplied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub results: Vec<Finding>,
    pub logs: Vec<String>,
}

/// Locate the JSON object in `text` and validate it as a report
pub fn parse_report(text: &str, level: VerificationLevel, default_file: &str) -> Result<Report, ParseError> {
    let value = extract_json_object(text)?;
    validate_report(&value, level, default_file).map_err(|reason| ParseError::new(reason, text))
}

/// Validate an already-extracted report object
pub fn validate_report(value: &Value, level: VerificationLevel, default_file: &str) -> Result<Report, String> {
    let object = value.as_object().ok_or("report is not a JSON object")?;

    let entries = match lookup(object, &["results", "issues", "findings"]) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => return Err(format!("results must be a list, found {}", type_name(other))),
    };

    let mut results: Vec<Finding> = entries
        .iter()
        .filter_map(|entry| normalize_finding(entry, level, default_file))
        .collect();
    let skipped = entries.len() - results.len();
    if results.is_empty() {
        results.push(Finding::placeholder(default_file));
    }

    let mut logs: Vec<String> = match object.get("logs") {
        Some(Value::Array(items)) => items.iter().filter_map(log_line).collect(),
        Some(Value::String(s)) => s.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect(),
        _ => Vec::new(),
    };
    if logs.is_empty() {
        logs.push("Report received without analysis logs".to_string());
    }
    if skipped > 0 {
        logs.push(format!("Skipped {} malformed result entr{}", skipped, if skipped == 1 { "y" } else { "ies" }));
    }

    Ok(Report {
        results: renumber(results),
        logs,
    })
}

/// Turn one lenient result entry into a finding; `None` when unusable
pub fn normalize_finding(entry: &Value, level: VerificationLevel, default_file: &str) -> Option<Finding> {
    if let Value::String(text) = entry {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        return Some(Finding::new(excerpt(text, 80), text, Severity::Low, default_file));
    }

    let object = entry.as_object()?;
    let title = text_field(object, &["title", "error_type", "check", "name", "rule"]);
    let description = text_field(object, &["description", "message", "details"]);
    let (title, description) = match (title, description) {
        (None, None) => return None,
        (Some(t), None) => (t.clone(), t),
        (None, Some(d)) => (excerpt(&d, 80), d),
        (Some(t), Some(d)) => (t, d),
    };

    let severity = text_field(object, &["severity", "impact", "level"])
        .map(|label| Severity::from_label(&label))
        .unwrap_or(Severity::Medium)
        .clamp_for(level);
    let file = text_field(object, &["file", "filename", "file_name"]).unwrap_or_else(|| default_file.to_string());

    let mut finding = Finding::new(title, description, severity, file)
        .at_line(number_field(object, &["line", "line_number", "lineNumber"]));
    finding.column = number_field(object, &["column", "column_number", "columnNumber"]);
    finding.confidence = text_field(object, &["confidence"]).and_then(|c| Confidence::from_label(&c));
    finding.contract_name = text_field(object, &["contract_name", "contract"]);
    finding.function_name = text_field(object, &["function_name", "function"]);
    finding.suggested_fix = text_field(object, &["suggested_fix", "fix", "recommendation"]);
    Some(finding)
}

/// Normalize a model's specification draft. A JSON wrapper is unwrapped;
/// anything else is kept as trimmed text.
pub fn normalize_draft(text: &str) -> Option<String> {
    let unwrapped = match interpret(text) {
        AiPayload::Structured(map) => spec_text(&Value::Object(map)),
        AiPayload::Text(_) => None,
    };
    unwrapped.or_else(|| Some(text.trim().to_string()).filter(|t| !t.is_empty()))
}

/// Normalize an approval payload: a string, or a wrapper object whose
/// specification field holds a string, a list of strings or an object
pub fn normalize_confirmation(payload: &Value) -> Option<String> {
    spec_text(payload)
}

fn spec_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => spec_text(other),
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(map) => match SPEC_KEYS.iter().find_map(|key| map.get(*key)) {
            Some(inner @ (Value::String(_) | Value::Array(_))) => return spec_text(inner),
            Some(inner @ Value::Object(_)) => serde_json::to_string_pretty(inner).unwrap_or_default(),
            _ => return None,
        },
        _ => return None,
    };
    Some(text).filter(|t| !t.is_empty())
}

fn lookup<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| object.get(*key))
}

fn text_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn number_field(object: &Map<String, Value>, keys: &[&str]) -> Option<u32> {
    keys.iter().find_map(|key| match object.get(*key)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn log_line(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::String(_) | Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
