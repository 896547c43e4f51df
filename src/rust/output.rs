// SPDX-License-Identifier: PMPL-1.0-or-later

//! Output formatting module for CLI
//!
//! Provides JSON and pretty-printed text output with colors

use anyhow::Result;
use colored::{ColoredString, Colorize};
use serde::Serialize;
use solguard::core::{Finding, JobStatus, Severity, VerificationJob};
use std::fmt::Display;
use std::str::FromStr;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid output format: {}. Must be 'text' or 'json'", s)),
        }
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Availability of one external dependency, for `solguard tools`
#[derive(Debug, Serialize)]
pub struct ToolStatus {
    pub name: String,
    pub available: bool,
    pub detail: String,
}

/// Output formatter for different output formats
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Output a success message
    pub fn success(&self, message: &str) -> Result<()> {
        match self.format {
            OutputFormat::Text => println!("{}", message.green().bold()),
            OutputFormat::Json => self.output_json(&JsonMessage {
                level: "success",
                message,
            })?,
        }
        Ok(())
    }

    /// Output an error message
    pub fn error(&self, message: &str) -> Result<()> {
        match self.format {
            OutputFormat::Text => eprintln!("{}", message.red().bold()),
            OutputFormat::Json => self.output_json(&JsonMessage {
                level: "error",
                message,
            })?,
        }
        Ok(())
    }

    /// Output an info message
    pub fn info(&self, message: &str) -> Result<()> {
        match self.format {
            OutputFormat::Text => println!("{}", message),
            OutputFormat::Json => self.output_json(&JsonMessage {
                level: "info",
                message,
            })?,
        }
        Ok(())
    }

    /// Output a section header
    pub fn header(&self, title: &str) -> Result<()> {
        if self.format == OutputFormat::Text {
            println!("\n{}", title.bold().underline());
            println!("{}", "=".repeat(title.len()));
        }
        Ok(())
    }

    /// Output a full job record
    pub fn job(&self, job: &VerificationJob) -> Result<()> {
        match self.format {
            OutputFormat::Text => self.job_text(job),
            OutputFormat::Json => self.output_json(job)?,
        }
        Ok(())
    }

    fn job_text(&self, job: &VerificationJob) {
        println!();
        println!("{} {}", "Verification".cyan().bold(), job.id.bright_blue());
        println!("  Level:  {}", job.level);
        println!("  Status: {}", status_label(job.status));
        if let Some(completed) = job.completed_at {
            let elapsed = completed - job.created_at;
            println!("  Took:   {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0);
        }
        if let Some(error) = &job.error {
            println!("  Error:  {}", error.red());
        }

        if let Some(spec) = &job.spec_used {
            println!("\n{}", "Approved specification".yellow().bold());
            for line in spec.lines() {
                println!("  {}", line);
            }
        } else if let Some(draft) = &job.spec_draft {
            println!("\n{}", "Specification draft".yellow().bold());
            for line in draft.lines() {
                println!("  {}", line);
            }
        }

        println!("\n{} ({})", "Results".yellow().bold(), job.results.len());
        for finding in &job.results {
            println!("{}", render_finding(finding));
        }

        if !job.logs.is_empty() {
            println!("\n{}", "Log".magenta().bold());
            for entry in &job.logs {
                println!("  {} {}", "-".dimmed(), entry);
            }
        }
        println!();
    }

    /// Output the dependency availability table
    pub fn tools(&self, tools: &[ToolStatus]) -> Result<()> {
        match self.format {
            OutputFormat::Text => {
                for tool in tools {
                    let mark = if tool.available { "✓".green() } else { "✗".red() };
                    println!("  {} {:<12} {}", mark, tool.name.bold(), tool.detail.dimmed());
                }
            }
            OutputFormat::Json => self.output_json(&tools)?,
        }
        Ok(())
    }

    /// Output JSON
    fn output_json<T: Serialize + ?Sized>(&self, data: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        println!("{}", json);
        Ok(())
    }
}

fn status_label(status: JobStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        JobStatus::Completed => label.green().bold(),
        JobStatus::Failed => label.red().bold(),
        JobStatus::AwaitingConfirmation => label.yellow().bold(),
        JobStatus::Running | JobStatus::Processing => label.cyan(),
    }
}

fn severity_label(severity: Severity) -> ColoredString {
    let label = format!("[{}]", severity.to_string().to_uppercase());
    match severity {
        Severity::Critical => label.on_red().white().bold(),
        Severity::High => label.red().bold(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.dimmed(),
    }
}

/// One finding as an indented text block
pub fn render_finding(finding: &Finding) -> String {
    let location = match (finding.line, finding.column) {
        (Some(line), Some(column)) => format!("{}:{}:{}", finding.file, line, column),
        (Some(line), None) => format!("{}:{}", finding.file, line),
        _ => finding.file.clone(),
    };
    let mut out = format!(
        "  {}. {} {} ({})\n     {}",
        finding.id,
        severity_label(finding.severity),
        finding.title.bold(),
        location,
        finding.description
    );
    if let Some(fix) = &finding.suggested_fix {
        out.push_str(&format!("\n     {} {}", "fix:".green(), fix));
    }
    out
}

#[derive(Serialize)]
struct JsonMessage<'a> {
    level: &'a str,
    message: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_render_finding_location() {
        colored::control::set_override(false);
        let mut finding = Finding::new("Reentrancy", "external call before state update", Severity::High, "Bank.sol")
            .at_line(Some(12));
        finding.id = 1;
        finding.column = Some(1);
        finding.suggested_fix = Some("update balances first".into());

        let text = render_finding(&finding);
        assert!(text.contains("1. [HIGH] Reentrancy (Bank.sol:12:1)"));
        assert!(text.contains("fix: update balances first"));
    }
}
