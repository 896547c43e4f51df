// SPDX-License-Identifier: PMPL-1.0-or-later

//! Slither-compatible static analyzer adapter
//!
//! Invocation: `slither <source> --json <artifact>`. The JSON artifact is
//! preferred; when it is missing, unreadable or empty the human-readable
//! output is scanned with a header pattern instead.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::ffi::OsString;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use super::{StaticAnalyzer, ToolOutput};
use crate::config::AnalyzerConfig;
use crate::core::{renumber, Confidence, Finding, Severity};
use crate::error::AdapterError;
use crate::executor::ProcessRunner;

const TOOL: &str = "analyzer";

/// Slither adapter
pub struct SlitherAnalyzer {
    config: AnalyzerConfig,
    runner: ProcessRunner,
}

impl SlitherAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let runner = ProcessRunner::from_secs(config.timeout_secs);
        SlitherAnalyzer { config, runner }
    }
}

#[async_trait]
impl StaticAnalyzer for SlitherAnalyzer {
    fn name(&self) -> &str {
        "slither"
    }

    async fn analyze(&self, source: &Path) -> ToolOutput {
        // Removed on every exit path when `scratch` drops
        let scratch = tempfile::Builder::new()
            .prefix("solguard-analyzer-")
            .tempdir()
            .map_err(|e| AdapterError::new(TOOL, format!("cannot create scratch directory: {}", e)))?;
        let artifact = scratch.path().join("report.json");

        let mut args: Vec<OsString> = vec![
            source.as_os_str().to_owned(),
            "--json".into(),
            artifact.as_os_str().to_owned(),
        ];
        args.extend(self.config.args.iter().map(OsString::from));

        info!("Running analyzer on {}", source.display());
        let output = self
            .runner
            .run(&self.config.executable, &args)
            .await
            .map_err(|e| AdapterError::new(TOOL, format!("{:#}", e)))?;

        if output.killed {
            return Err(AdapterError::new(
                TOOL,
                output.kill_reason.unwrap_or_else(|| "killed".to_string()),
            ));
        }

        let file_name = display_name(source);
        let artifact_text = tokio::fs::read_to_string(&artifact).await.ok();

        if let Some(reason) = artifact_text.as_deref().and_then(reported_failure) {
            warn!("Analyzer reported failure: {}", reason);
            let diagnostics = if output.stderr.trim().is_empty() {
                reason.clone()
            } else {
                format!("{}\n{}", reason, output.stderr)
            };
            return Err(AdapterError::new(TOOL, format!("analysis failed: {}", reason))
                .with_diagnostics(diagnostics));
        }

        let mut findings = artifact_text
            .as_deref()
            .and_then(|text| parse_json_report(text, &file_name))
            .unwrap_or_default();

        if findings.is_empty() {
            // `--json -` style invocations put the report on stdout
            findings = parse_json_report(&output.stdout, &file_name).unwrap_or_default();
        }

        if findings.is_empty() && !output.success() && output.stdout.trim().is_empty() {
            // a failing run only counts when its stderr carries findings
            findings = parse_text_report(&output.stderr, &file_name);
            if findings.is_empty() {
                warn!("Analyzer exited with {:?} and produced no findings", output.exit_code);
                return Err(AdapterError::new(
                    TOOL,
                    format!("exit code {:?} with no usable output", output.exit_code),
                )
                .with_diagnostics(output.stderr));
            }
        }

        if findings.is_empty() {
            debug!("No JSON findings; falling back to text output");
            findings = parse_text_report(&output.combined(), &file_name);
        }

        if findings.is_empty() {
            findings.push(Finding::placeholder(file_name));
        }

        Ok(renumber(findings))
    }
}

fn display_name(source: &Path) -> String {
    source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| source.display().to_string())
}

/// The `error` text of a report the tool marked `"success": false`
fn reported_failure(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    if value.get("success").and_then(Value::as_bool) != Some(false) {
        return None;
    }
    let reason = match value.get("error") {
        Some(Value::String(e)) if !e.trim().is_empty() => e.trim().to_string(),
        Some(Value::Null) | None => "the tool reported an unsuccessful run".to_string(),
        Some(other) => other.to_string(),
    };
    Some(reason)
}

/// Map the tool's impact vocabulary; anything unrecognized is low
pub fn map_impact(impact: &str) -> Severity {
    match impact.trim().to_lowercase().as_str() {
        "high" => Severity::High,
        "medium" => Severity::Medium,
        "low" => Severity::Low,
        _ => Severity::Low,
    }
}

/// Parse a JSON report into findings.
///
/// Returns `None` when `text` is not JSON of the expected shape, so callers
/// can fall back to text parsing.
pub fn parse_json_report(text: &str, default_file: &str) -> Option<Vec<Finding>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let report: Value = serde_json::from_str(text).ok()?;
    let detectors = report
        .get("results")
        .and_then(|r| r.get("detectors"))
        .and_then(Value::as_array)?;

    Some(
        detectors
            .iter()
            .filter_map(|detector| detector_to_finding(detector, default_file))
            .collect(),
    )
}

fn detector_to_finding(detector: &Value, default_file: &str) -> Option<Finding> {
    let detector = detector.as_object()?;
    let str_field = |key: &str| detector.get(key).and_then(Value::as_str).unwrap_or("");

    let check = str_field("check");
    let description = str_field("description").trim();
    if check.is_empty() && description.is_empty() {
        return None;
    }

    let elements = detector
        .get("elements")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let mut finding = Finding::new(
        if check.is_empty() { "unclassified" } else { check },
        description,
        map_impact(str_field("impact")),
        default_file,
    )
    .at_line(first_line(elements));
    // the tool reports no columns
    finding.column = Some(1);
    finding.confidence = Confidence::from_label(str_field("confidence"));

    if let Some(file) = first_file(elements) {
        finding.file = file;
    }
    for element in elements {
        let name = element.get("name").and_then(Value::as_str);
        match element.get("type").and_then(Value::as_str) {
            Some("function") if finding.function_name.is_none() => {
                finding.function_name = name.map(str::to_string);
                if finding.contract_name.is_none() {
                    finding.contract_name = parent_contract(element);
                }
            }
            Some("contract") if finding.contract_name.is_none() => {
                finding.contract_name = name.map(str::to_string);
            }
            _ => {
                if finding.contract_name.is_none() {
                    finding.contract_name = parent_contract(element);
                }
            }
        }
    }

    Some(finding)
}

fn first_line(elements: &[Value]) -> Option<u32> {
    elements.iter().find_map(|element| {
        element
            .get("source_mapping")
            .and_then(|m| m.get("lines"))
            .and_then(Value::as_array)
            .and_then(|lines| lines.iter().find_map(Value::as_u64))
            .and_then(|line| u32::try_from(line).ok())
    })
}

fn first_file(elements: &[Value]) -> Option<String> {
    elements.iter().find_map(|element| {
        let mapping = element.get("source_mapping")?;
        ["filename_relative", "filename_short", "filename_absolute"]
            .iter()
            .find_map(|key| mapping.get(*key).and_then(Value::as_str))
            .filter(|f| !f.is_empty())
            .map(str::to_string)
    })
}

fn parent_contract(element: &Value) -> Option<String> {
    let parent = element.get("type_specific_fields")?.get("parent")?;
    match parent.get("type").and_then(Value::as_str) {
        Some("contract") => parent.get("name").and_then(Value::as_str).map(str::to_string),
        _ => parent_contract(parent),
    }
}

fn header_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?m)^[ \t]*(?P<title>[A-Z][A-Za-z0-9 _\-]*?)[ \t]*(?:\((?P<severity>[A-Za-z]+)\)[ \t]*)?\bin[ \t]+(?P<contract>[A-Za-z_$][A-Za-z0-9_$]*)(?:\.(?P<function>[A-Za-z_$][A-Za-z0-9_$]*)\([^)\n]*\))?(?:[ \t]*\((?P<file>[^()#\s]+)#(?P<line>\d+)(?:-\d+)?\))?",
            )
            .map_err(|e| warn!("Text report pattern failed to compile: {}", e))
            .ok()
        })
        .as_ref()
}

/// Severity keyword match on a text header
fn header_severity(header: &str) -> Severity {
    let header = header.to_lowercase();
    if header.contains("high") || header.contains("critical") {
        Severity::High
    } else if header.contains("low") || header.contains("informational") {
        Severity::Low
    } else {
        Severity::Medium
    }
}

/// Extract findings from the tool's human-readable output
pub fn parse_text_report(text: &str, default_file: &str) -> Vec<Finding> {
    let Some(pattern) = header_pattern() else {
        return vec![];
    };
    pattern
        .captures_iter(text)
        .map(|caps| {
            let header = caps.get(0).map_or("", |m| m.as_str()).trim();
            let title = caps.name("title").map_or("", |m| m.as_str()).trim();
            let contract = caps.name("contract").map(|m| m.as_str().to_string());
            let line = caps
                .name("line")
                .and_then(|m| m.as_str().parse::<u32>().ok());
            let file = caps
                .name("file")
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| default_file.to_string());

            let severity = caps
                .name("severity")
                .map_or_else(|| header_severity(title), |m| header_severity(m.as_str()));

            let mut finding = Finding::new(title, header, severity, file).at_line(line);
            if line.is_some() {
                finding.column = Some(1);
            }
            finding.contract_name = contract;
            finding.function_name = caps.name("function").map(|m| m.as_str().to_string());
            finding
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FindingKind;

    const REPORT: &str = r#"{
        "success": true,
        "error": null,
        "results": {
            "detectors": [
                {
                    "check": "reentrancy-eth",
                    "impact": "High",
                    "confidence": "Medium",
                    "description": "Reentrancy in Bank.withdraw(uint256) (contracts/Bank.sol#10-17)",
                    "elements": [
                        {
                            "type": "function",
                            "name": "withdraw",
                            "source_mapping": {
                                "lines": [10, 11, 12],
                                "filename_relative": "contracts/Bank.sol"
                            },
                            "type_specific_fields": {
                                "parent": {"type": "contract", "name": "Bank"}
                            }
                        }
                    ]
                },
                {
                    "check": "solc-version",
                    "impact": "Informational",
                    "confidence": "High",
                    "description": "Pragma version ^0.8.0 allows old versions",
                    "elements": []
                },
                {
                    "check": "timestamp",
                    "impact": "Low",
                    "confidence": "Medium",
                    "description": "Bank.unlock() uses timestamp for comparisons",
                    "elements": [{"type": "node", "source_mapping": {"lines": []}}]
                }
            ]
        }
    }"#;

    #[test]
    fn test_json_report_maps_every_detector() {
        let findings = parse_json_report(REPORT, "Bank.sol").unwrap();
        assert_eq!(findings.len(), 3);

        let reentrancy = &findings[0];
        assert_eq!(reentrancy.title, "reentrancy-eth");
        assert_eq!(reentrancy.severity, Severity::High);
        assert_eq!(reentrancy.kind, FindingKind::Error);
        assert_eq!(reentrancy.line, Some(10));
        assert_eq!(reentrancy.column, Some(1));
        assert_eq!(reentrancy.file, "contracts/Bank.sol");
        assert_eq!(reentrancy.function_name.as_deref(), Some("withdraw"));
        assert_eq!(reentrancy.contract_name.as_deref(), Some("Bank"));
        assert_eq!(reentrancy.confidence, Some(Confidence::Medium));

        assert_eq!(findings[1].severity, Severity::Low);
        assert_eq!(findings[1].line, None);
        assert_eq!(findings[1].file, "Bank.sol");

        assert_eq!(findings[2].severity, Severity::Low);
        assert_eq!(findings[2].line, None);
    }

    #[test]
    fn test_impact_mapping() {
        assert_eq!(map_impact("High"), Severity::High);
        assert_eq!(map_impact("Medium"), Severity::Medium);
        assert_eq!(map_impact("Low"), Severity::Low);
        assert_eq!(map_impact("Optimization"), Severity::Low);
        assert_eq!(map_impact(""), Severity::Low);
    }

    #[test]
    fn test_non_json_returns_none() {
        assert!(parse_json_report("INFO:Detectors:", "a.sol").is_none());
        assert!(parse_json_report("", "a.sol").is_none());
        assert!(parse_json_report(r#"{"success": false}"#, "a.sol").is_none());
    }

    #[test]
    fn test_malformed_detector_entries_are_skipped() {
        let text = r#"{"results": {"detectors": [42, {"check": "x", "impact": "Medium", "elements": "nope"}]}}"#;
        let findings = parse_json_report(text, "a.sol").unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);
    }

    #[test]
    fn test_unsuccessful_report_is_a_failure() {
        let text = r#"{"success": false, "error": "InvalidCompilation: ParserError", "results": {}}"#;
        assert_eq!(reported_failure(text).as_deref(), Some("InvalidCompilation: ParserError"));
        assert!(reported_failure(r#"{"success": false, "error": null}"#).is_some());
        assert!(reported_failure(REPORT).is_none());
        assert!(reported_failure("not json").is_none());
    }

    #[test]
    fn test_text_report_with_locator() {
        let text = "INFO:Detectors:\n\
            Reentrancy in Bank.withdraw(uint256) (contracts/Bank.sol#10-17):\n\
            \tExternal calls:\n\
            Reference: https://github.com/crytic/slither/wiki/Detector-Documentation#reentrancy\n";
        let findings = parse_text_report(text, "Bank.sol");
        assert_eq!(findings.len(), 1);
        let f = &findings[0];
        assert_eq!(f.title, "Reentrancy");
        assert_eq!(f.contract_name.as_deref(), Some("Bank"));
        assert_eq!(f.function_name.as_deref(), Some("withdraw"));
        assert_eq!(f.file, "contracts/Bank.sol");
        assert_eq!(f.line, Some(10));
        assert_eq!(f.severity, Severity::Medium);
    }

    #[test]
    fn test_text_report_severity_keyword_without_locator() {
        let text = "Unchecked transfer (High) in Vault\nShadowing (informational) in Token.owner()";
        let findings = parse_text_report(text, "Vault.sol");
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].line, None);
        assert_eq!(findings[0].file, "Vault.sol");
        assert_eq!(findings[1].severity, Severity::Low);
        assert_eq!(findings[1].contract_name.as_deref(), Some("Token"));
    }

    #[test]
    fn test_text_report_without_matches() {
        let text = "Compilation warnings\nall good\n";
        assert!(parse_text_report(text, "a.sol").is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary_is_adapter_error() {
        let analyzer = SlitherAnalyzer::new(AnalyzerConfig {
            executable: "/nonexistent/slither".into(),
            timeout_secs: 5,
            ..Default::default()
        });
        let err = analyzer.analyze(Path::new("Bank.sol")).await.unwrap_err();
        assert_eq!(err.tool, "analyzer");
    }
}
