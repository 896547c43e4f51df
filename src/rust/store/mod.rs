// SPDX-License-Identifier: PMPL-1.0-or-later

//! Persistence seams
//!
//! The workflow reads and writes job records through [`RecordStore`] and
//! resolves contract source through [`ProjectSource`]. Both are traits so a
//! database-backed store can replace [`MemoryStore`] without touching the
//! workflow.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{JobUpdate, NewJob, Project, VerificationJob};
use crate::error::VerifyError;

pub mod memory;

pub use memory::MemoryStore;

/// Ordering of query results by creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    #[default]
    Newest,
    Oldest,
}

/// Filter for listing job records
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    pub project_id: Option<String>,
    pub order: Order,
    pub limit: Option<usize>,
}

impl JobQuery {
    /// Latest jobs for one project
    pub fn for_project(project_id: impl Into<String>) -> Self {
        JobQuery {
            project_id: Some(project_id.into()),
            ..Default::default()
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Keyed persistence for job records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record and return its id
    async fn create(&self, job: NewJob) -> Result<String, VerifyError>;

    /// Apply a partial update atomically and return the updated record
    async fn update(&self, id: &str, update: JobUpdate) -> Result<VerificationJob, VerifyError>;

    async fn get(&self, id: &str) -> Result<Option<VerificationJob>, VerifyError>;

    async fn query(&self, query: JobQuery) -> Result<Vec<VerificationJob>, VerifyError>;
}

/// Resolves a project id to the contract under analysis
#[async_trait]
pub trait ProjectSource: Send + Sync {
    async fn project(&self, id: &str) -> Result<Option<Project>, VerifyError>;
}
