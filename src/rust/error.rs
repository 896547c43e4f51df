// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error taxonomy for the verification workflow
//!
//! Adapter, transform and parse failures are folded into a job's audit log
//! by the workflow. Only `RecordNotFound` and `InvalidInput` are expected to
//! reach a caller synchronously.

use thiserror::Error;

use crate::core::JobStatus;

/// An external tool or its runtime could not produce usable output
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{tool} failed: {message}")]
pub struct AdapterError {
    /// Tool that failed (`analyzer`, `prover`, `prover-runtime`)
    pub tool: String,
    /// Short human-readable summary
    pub message: String,
    /// Raw diagnostic text (usually stderr)
    pub diagnostics: String,
}

impl AdapterError {
    pub fn new(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            message: message.into(),
            diagnostics: String::new(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: impl Into<String>) -> Self {
        self.diagnostics = diagnostics.into();
        self
    }

    /// Summary plus a bounded excerpt of the diagnostics, for audit logs
    pub fn log_line(&self) -> String {
        let diagnostics = self.diagnostics.trim();
        if diagnostics.is_empty() {
            self.to_string()
        } else {
            format!("{}: {}", self, excerpt(diagnostics, 2000))
        }
    }
}

/// No completion backend produced a response
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("no AI backend is configured")]
    NoBackend,

    #[error("all {} AI backends failed: {}", .attempts.len(), .attempts.join("; "))]
    AllBackendsFailed { attempts: Vec<String> },
}

/// A structured payload could not be located or validated in a text response
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("could not parse structured payload: {reason}")]
pub struct ParseError {
    pub reason: String,
    /// Leading part of the offending text
    pub excerpt: String,
}

impl ParseError {
    pub fn new(reason: impl Into<String>, text: &str) -> Self {
        Self {
            reason: reason.into(),
            excerpt: excerpt(text, 200),
        }
    }
}

/// Umbrella error for job-level operations
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },

    #[error("record store error: {0}")]
    Store(String),
}

impl VerifyError {
    /// Stable label used in audit logs
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::Adapter(_) => "AdapterError",
            VerifyError::Transform(_) => "TransformError",
            VerifyError::Parse(_) => "ParseError",
            VerifyError::RecordNotFound(_) => "RecordNotFound",
            VerifyError::InvalidInput(_) => "InvalidInput",
            VerifyError::IllegalTransition { .. } => "IllegalTransition",
            VerifyError::Store(_) => "StoreError",
        }
    }

    /// `Kind: message`, with adapter diagnostics included
    pub fn log_line(&self) -> String {
        match self {
            VerifyError::Adapter(e) => format!("{}: {}", self.kind(), e.log_line()),
            other => format!("{}: {}", other.kind(), other),
        }
    }
}

/// Truncate on a char boundary
pub(crate) fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}
