// SPDX-License-Identifier: PMPL-1.0-or-later

//! Formal prover adapters
//!
//! A prover checks a contract against generated specification code. The
//! runtime it executes in is built once and shared by every job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::AdapterError;

pub mod certora;
pub mod runtime;

pub use certora::CertoraProver;
pub use runtime::ProverRuntime;

/// Raw outcome of one proving run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProverReport {
    /// stdout and stderr, in that order
    pub raw_output: String,
    /// stdout parsed as JSON, when it was JSON
    pub structured: Option<serde_json::Value>,
    pub exit_code: Option<i32>,
}

impl ProverReport {
    /// Text handed to the result-reformatting transform
    pub fn transform_input(&self) -> String {
        match &self.structured {
            Some(value) => serde_json::to_string_pretty(value).unwrap_or_else(|_| self.raw_output.clone()),
            None => self.raw_output.clone(),
        }
    }
}

/// A formal-verification tool
#[async_trait]
pub trait FormalProver: Send + Sync {
    fn name(&self) -> &str;

    /// Prove the contract at `source` against `spec_code`
    async fn prove(&self, source: &Path, spec_code: &str) -> Result<ProverReport, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transform_input_prefers_structured() {
        let report = ProverReport {
            raw_output: "noise".into(),
            structured: Some(json!({"rules": {"solvency": "VIOLATED"}})),
            exit_code: Some(0),
        };
        assert!(report.transform_input().contains("VIOLATED"));

        let report = ProverReport {
            raw_output: "rule solvency: FAILED".into(),
            structured: None,
            exit_code: Some(1),
        };
        assert_eq!(report.transform_input(), "rule solvency: FAILED");
    }
}
