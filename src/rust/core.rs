// SPDX-License-Identifier: PMPL-1.0-or-later

//! Core types for verification jobs and findings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VerifyError;

/// Depth of a verification request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationLevel {
    /// Static analysis plus AI reformatting
    Simple,
    /// AI-drafted specification, human confirmation, formal proving
    Deep,
}

impl FromStr for VerificationLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simple" => Ok(VerificationLevel::Simple),
            "deep" => Ok(VerificationLevel::Deep),
            _ => Err(anyhow::anyhow!("Unknown verification level: {}", s)),
        }
    }
}

impl fmt::Display for VerificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationLevel::Simple => write!(f, "simple"),
            VerificationLevel::Deep => write!(f, "deep"),
        }
    }
}

/// Job status as observed by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    AwaitingConfirmation,
    /// Deep job proving an approved specification
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// Re-entering `AwaitingConfirmation` is permitted from every state but
    /// `Completed`: the confirmation gate uses it to recover a job whose
    /// finalize pass failed or was interrupted.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Completed, _) => false,
            (_, AwaitingConfirmation) => true,
            (a, b) if a == b => !a.is_terminal(),
            (Running, _) => true,
            (AwaitingConfirmation, Processing | Failed) => true,
            (Processing, Completed | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Running => "running",
            JobStatus::AwaitingConfirmation => "awaiting_confirmation",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Severity of a finding, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Lenient mapping of free-form severity/impact labels
    pub fn from_label(label: &str) -> Severity {
        let label = label.trim().to_lowercase();
        if label.contains("critical") {
            Severity::Critical
        } else if label.contains("high") {
            Severity::High
        } else if label.contains("medium") || label.contains("moderate") {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Highest severity a level may report
    pub fn clamp_for(self, level: VerificationLevel) -> Severity {
        match level {
            VerificationLevel::Simple => self.min(Severity::High),
            VerificationLevel::Deep => self,
        }
    }

    pub fn kind(self) -> FindingKind {
        match self {
            Severity::Critical | Severity::High => FindingKind::Error,
            Severity::Medium => FindingKind::Warning,
            Severity::Low => FindingKind::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Error,
    Warning,
    Info,
}

/// Detector confidence as reported by the tool or the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn from_label(label: &str) -> Option<Confidence> {
        match label.trim().to_lowercase().as_str() {
            "high" => Some(Confidence::High),
            "medium" => Some(Confidence::Medium),
            "low" => Some(Confidence::Low),
            _ => None,
        }
    }
}

/// One normalized, reported issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// 1-based position within the result sequence
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub title: String,
    pub description: String,
    /// Absent when the tool could not map the issue to a line
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub column: Option<u32>,
    pub file: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub confidence: Option<Confidence>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub contract_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub suggested_fix: Option<String>,
}

impl Finding {
    /// Create a finding; `kind` is derived from `severity`
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        file: impl Into<String>,
    ) -> Self {
        Finding {
            id: 0,
            kind: severity.kind(),
            title: title.into(),
            description: description.into(),
            line: None,
            column: None,
            file: file.into(),
            severity,
            confidence: None,
            contract_name: None,
            function_name: None,
            suggested_fix: None,
        }
    }

    pub fn at_line(mut self, line: Option<u32>) -> Self {
        self.line = line;
        self
    }

    /// The "analysis ran, nothing found" marker
    pub fn placeholder(file: impl Into<String>) -> Self {
        Finding::new(
            "No issues detected",
            "The analyzer ran but reported no recognizable issues.",
            Severity::Low,
            file,
        )
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == FindingKind::Info && self.title == "No issues detected"
    }
}

/// Assign 1-based ids in sequence order
pub fn renumber(findings: Vec<Finding>) -> Vec<Finding> {
    findings
        .into_iter()
        .enumerate()
        .map(|(i, mut f)| {
            f.id = i as u32 + 1;
            f
        })
        .collect()
}

/// The artifact under analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when a job record is created
#[derive(Debug, Clone)]
pub struct NewJob {
    pub project_id: String,
    pub level: VerificationLevel,
    pub status: JobStatus,
    pub logs: Vec<String>,
}

/// Persistent record of one verification request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationJob {
    pub id: String,
    pub project_id: String,
    pub level: VerificationLevel,
    pub status: JobStatus,
    pub logs: Vec<String>,
    pub results: Vec<Finding>,
    pub spec_draft: Option<String>,
    pub spec_used: Option<String>,
    pub prover_artifact: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl VerificationJob {
    pub fn from_new(id: String, new: NewJob, now: DateTime<Utc>) -> Self {
        let completed_at = new.status.is_terminal().then_some(now);
        VerificationJob {
            id,
            project_id: new.project_id,
            level: new.level,
            status: new.status,
            logs: new.logs,
            results: Vec::new(),
            spec_draft: None,
            spec_used: None,
            prover_artifact: None,
            error: None,
            created_at: now,
            completed_at,
        }
    }

    /// Apply a partial update.
    ///
    /// Rejects illegal status transitions without touching the record. Stamps
    /// `completed_at` on entry into a terminal state and clears it when a job
    /// is reset out of one.
    pub fn apply(&mut self, update: JobUpdate, now: DateTime<Utc>) -> Result<(), VerifyError> {
        if let Some(next) = update.status {
            if !self.status.can_advance_to(next) {
                return Err(VerifyError::IllegalTransition {
                    from: self.status,
                    to: next,
                });
            }
        }

        match update.logs {
            LogUpdate::Append(entries) => self.logs.extend(entries),
            LogUpdate::Replace(entries) => {
                if entries.starts_with(&self.logs) {
                    self.logs = entries;
                } else {
                    // would drop or reorder history
                    self.logs.extend(entries);
                }
            }
        }

        if let Some(results) = update.results {
            self.results = results;
        }
        if let Some(draft) = update.spec_draft {
            self.spec_draft = Some(draft);
        }
        if let Some(spec) = update.spec_used {
            self.spec_used = Some(spec);
        }
        if let Some(artifact) = update.prover_artifact {
            self.prover_artifact = Some(artifact);
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }

        if let Some(next) = update.status {
            let was_terminal = self.status.is_terminal();
            self.status = next;
            if next.is_terminal() {
                if !was_terminal {
                    self.completed_at = Some(now);
                }
            } else {
                self.completed_at = None;
            }
        }

        Ok(())
    }
}

/// How an update treats the audit log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogUpdate {
    Append(Vec<String>),
    /// Full sequence; only honored when it extends the existing log
    Replace(Vec<String>),
}

impl Default for LogUpdate {
    fn default() -> Self {
        LogUpdate::Append(Vec::new())
    }
}

/// Partial update of a job record
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub logs: LogUpdate,
    pub results: Option<Vec<Finding>>,
    pub spec_draft: Option<String>,
    pub spec_used: Option<String>,
    pub prover_artifact: Option<String>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        JobUpdate {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn log(entry: impl Into<String>) -> Self {
        JobUpdate::default().with_log(entry)
    }

    pub fn with_log(mut self, entry: impl Into<String>) -> Self {
        match &mut self.logs {
            LogUpdate::Append(entries) | LogUpdate::Replace(entries) => entries.push(entry.into()),
        }
        self
    }

    pub fn with_logs(mut self, entries: impl IntoIterator<Item = String>) -> Self {
        match &mut self.logs {
            LogUpdate::Append(existing) | LogUpdate::Replace(existing) => existing.extend(entries),
        }
        self
    }

    pub fn with_results(mut self, results: Vec<Finding>) -> Self {
        self.results = Some(results);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
