// SPDX-License-Identifier: PMPL-1.0-or-later

//! Interpreting model responses
//!
//! Models wrap JSON in prose and code fences. These helpers find the
//! payload without trusting the response to be well formed.

use serde_json::{Map, Value};

use crate::error::ParseError;

/// What a response turned out to contain
#[derive(Debug, Clone, PartialEq)]
pub enum AiPayload {
    /// A JSON object was found in the response
    Structured(Map<String, Value>),
    /// Plain text, trimmed
    Text(String),
}

/// Classify a response as structured or plain text
pub fn interpret(text: &str) -> AiPayload {
    match extract_json_object(text) {
        Ok(Value::Object(map)) => AiPayload::Structured(map),
        _ => AiPayload::Text(text.trim().to_string()),
    }
}

/// Opening braces tried by the balanced-span fallback
pub const MAX_CANDIDATE_SPANS: usize = 64;

/// Find the JSON object embedded in `text`.
///
/// Tries the span from the first `{` to the last `}` first. If that span is
/// not a valid object, returns the first balanced `{...}` span that is,
/// trying at most [`MAX_CANDIDATE_SPANS`] opening braces.
pub fn extract_json_object(text: &str) -> Result<Value, ParseError> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(ParseError::new("no JSON object in response", text));
    };

    if start < end {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&text[start..=end]) {
            return Ok(value);
        }
    }

    for (open, _) in text.match_indices('{').take(MAX_CANDIDATE_SPANS) {
        if let Some(close) = matching_brace(&text[open..]) {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&text[open..open + close + 1]) {
                return Ok(value);
            }
        }
    }

    Err(ParseError::new("no well-formed JSON object in response", text))
}

/// Byte offset of the brace closing the one at offset 0, skipping string contents
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Body of the first fenced code block, or the whole text trimmed
pub fn strip_code_fence(text: &str) -> String {
    let Some(open) = text.find("```") else {
        return text.trim().to_string();
    };
    let after_open = &text[open + 3..];
    // skip the language tag line
    let body_start = after_open.find('\n').map_or(after_open.len(), |i| i + 1);
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim().to_string(),
        None => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracts_object_from_prose() {
        let text = "Here is the report:\n```json\n{\"results\": [], \"logs\": [\"ok\"]}\n```\nDone.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value, json!({"results": [], "logs": ["ok"]}));
    }

    #[test]
    fn test_falls_back_to_first_balanced_object() {
        // first-to-last span covers two objects and is not valid JSON
        let text = r#"first {"results": [1]} then {"other": true}"#;
        let value = extract_json_object(text).unwrap();
        assert_eq!(value, json!({"results": [1]}));
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let text = r#"noise { broken {"description": "uses } and { in text", "n": 1} tail"#;
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn test_no_object_is_parse_error() {
        let err = extract_json_object("I could not analyze this contract.").unwrap_err();
        assert!(err.reason.contains("no JSON object"));

        let err = extract_json_object("{ not json }").unwrap_err();
        assert!(err.reason.contains("well-formed"));
        assert_eq!(err.excerpt, "{ not json }");
    }

    #[test]
    fn test_fallback_tries_a_bounded_number_of_spans() {
        // every opening brace here is unbalanced
        let noisy = format!("{}{}", "{ ".repeat(50_000), r#"{"a": 1}"#);
        assert!(extract_json_object(&noisy).is_err());

        let within = format!("{}{}", "{ ".repeat(MAX_CANDIDATE_SPANS - 1), r#"{"a": 1}"#);
        assert_eq!(extract_json_object(&within).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_interpret_tags_payloads() {
        assert!(matches!(interpret(r#"{"a": 1}"#), AiPayload::Structured(_)));
        assert_eq!(
            interpret("  1. Balances never go negative.  "),
            AiPayload::Text("1. Balances never go negative.".to_string())
        );
        // arrays are not objects
        assert!(matches!(interpret("[1, 2]"), AiPayload::Text(_)));
    }

    #[test]
    fn test_strip_code_fence() {
        let text = "Sure:\n```cvl\nrule solvency { assert true; }\n```\nAnything else?";
        assert_eq!(strip_code_fence(text), "rule solvency { assert true; }");
        assert_eq!(strip_code_fence("  rule r {}  "), "rule r {}");
        assert_eq!(strip_code_fence("```\nunterminated"), "unterminated");
    }
}
