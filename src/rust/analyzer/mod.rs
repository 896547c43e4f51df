// SPDX-License-Identifier: PMPL-1.0-or-later

//! Static analyzer adapters
//!
//! An analyzer turns a contract source file into normalized findings. The
//! `Err` side of [`ToolOutput`] means the tool never produced usable output;
//! a run that found nothing yields a single placeholder finding instead.

use async_trait::async_trait;
use std::path::Path;

use crate::core::Finding;
use crate::error::AdapterError;

pub mod slither;

pub use slither::SlitherAnalyzer;

/// Result of one analyzer run
pub type ToolOutput = Result<Vec<Finding>, AdapterError>;

/// A static-analysis tool invoked against a source file
#[async_trait]
pub trait StaticAnalyzer: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Analyze the contract at `source`
    async fn analyze(&self, source: &Path) -> ToolOutput;
}
