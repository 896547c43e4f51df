// SPDX-License-Identifier: PMPL-1.0-or-later

//! Verification jobs
//!
//! [`VerificationService`] owns the lifecycle of every job: it creates the
//! record, hands the slow steps to the [`JobRunner`] and exposes the
//! confirmation gate that resumes a deep job. Each job's steps run
//! sequentially; separate jobs run concurrently up to the configured limit.

use anyhow::Context;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tracing::info;

use crate::ai::AiTransform;
use crate::analyzer::{SlitherAnalyzer, StaticAnalyzer};
use crate::config::AppConfig;
use crate::core::{JobStatus, JobUpdate, NewJob, Project, VerificationJob, VerificationLevel};
use crate::error::{AdapterError, VerifyError};
use crate::prover::{CertoraProver, FormalProver};
use crate::store::{JobQuery, MemoryStore, ProjectSource, RecordStore};

pub mod deep;
pub mod report;
pub mod runner;
pub mod simple;

pub use report::{normalize_confirmation, normalize_draft, parse_report, Report};
pub use runner::{JobFuture, JobRunner};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Collaborators shared by every job step
#[derive(Clone)]
pub(crate) struct Workflow {
    store: Arc<dyn RecordStore>,
    projects: Arc<dyn ProjectSource>,
    analyzer: Arc<dyn StaticAnalyzer>,
    prover: Arc<dyn FormalProver>,
    ai: AiTransform,
}

impl Workflow {
    async fn load_project(&self, project_id: &str) -> Result<Project, VerifyError> {
        self.projects
            .project(project_id)
            .await?
            .ok_or_else(|| VerifyError::RecordNotFound(format!("project {}", project_id)))
    }

    async fn log(&self, job_id: &str, entry: impl Into<String>) -> Result<(), VerifyError> {
        self.store.update(job_id, JobUpdate::log(entry)).await.map(|_| ())
    }
}

/// A scratch directory holding the contract source for one job step.
/// Removed when dropped.
pub(crate) struct Workspace {
    _dir: TempDir,
    pub source: PathBuf,
    pub file_name: String,
}

impl Workspace {
    pub(crate) async fn stage(project: &Project) -> Result<Self, VerifyError> {
        let dir = tempfile::Builder::new()
            .prefix("solguard-job-")
            .tempdir()
            .map_err(|e| AdapterError::new("workspace", format!("cannot create job workspace: {}", e)))?;
        let file_name = source_file_name(&project.name);
        let source = dir.path().join(&file_name);
        tokio::fs::write(&source, &project.code)
            .await
            .map_err(|e| AdapterError::new("workspace", format!("cannot write contract source: {}", e)))?;
        Ok(Workspace {
            _dir: dir,
            source,
            file_name,
        })
    }
}

/// Project names become file names only when they are plain `.sol` names
fn source_file_name(project_name: &str) -> String {
    let plain = project_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if plain && project_name.ends_with(".sol") && !project_name.starts_with('.') {
        project_name.to_string()
    } else {
        "contract.sol".to_string()
    }
}

/// Entry point for starting, confirming and inspecting verification jobs
pub struct VerificationService {
    workflow: Workflow,
    runner: JobRunner,
    confirm_gate: Mutex<()>,
}

impl VerificationService {
    /// Must be called from within a tokio runtime
    pub fn new(
        store: Arc<dyn RecordStore>,
        projects: Arc<dyn ProjectSource>,
        analyzer: Arc<dyn StaticAnalyzer>,
        prover: Arc<dyn FormalProver>,
        ai: AiTransform,
        max_concurrent: usize,
    ) -> Self {
        let runner = JobRunner::start(Arc::clone(&store), max_concurrent);
        VerificationService {
            workflow: Workflow {
                store,
                projects,
                analyzer,
                prover,
                ai,
            },
            runner,
            confirm_gate: Mutex::new(()),
        }
    }

    /// Wire the configured adapters around an in-memory store
    pub fn from_config(config: &AppConfig, store: Arc<MemoryStore>) -> anyhow::Result<Self> {
        let ai = AiTransform::from_config(&config.ai).context("Failed to build AI backends")?;
        info!(
            "AI backends: {}",
            if ai.is_configured() {
                ai.backend_names().join(", ")
            } else {
                "none".to_string()
            }
        );
        Ok(Self::new(
            store.clone(),
            store,
            Arc::new(SlitherAnalyzer::new(config.analyzer.clone())),
            Arc::new(CertoraProver::new(config.prover.clone())),
            ai,
            config.jobs.max_concurrent,
        ))
    }

    /// Start static analysis plus AI reformatting; returns the job id
    pub async fn start_simple(&self, project_id: &str) -> Result<String, VerifyError> {
        self.start(project_id, VerificationLevel::Simple).await
    }

    /// Start drafting a specification; the job pauses for confirmation
    pub async fn start_deep(&self, project_id: &str) -> Result<String, VerifyError> {
        self.start(project_id, VerificationLevel::Deep).await
    }

    async fn start(&self, project_id: &str, level: VerificationLevel) -> Result<String, VerifyError> {
        let project = self.workflow.load_project(project_id).await?;
        let job_id = self
            .workflow
            .store
            .create(NewJob {
                project_id: project_id.to_string(),
                level,
                status: JobStatus::Running,
                logs: vec![format!("{} verification requested for {}", capitalize(level), project.name)],
            })
            .await?;
        info!("Created {} job {} for project {}", level, job_id, project_id);

        let workflow = self.workflow.clone();
        let id = job_id.clone();
        let work: JobFuture = match level {
            VerificationLevel::Simple => Box::pin(async move { workflow.run_simple(&id, project).await }),
            VerificationLevel::Deep => Box::pin(async move { workflow.run_draft(&id, project).await }),
        };
        self.submit(&job_id, work).await?;
        Ok(job_id)
    }

    /// Approve specification text for a deep job and start proving it
    pub async fn confirm(&self, job_id: &str, approved: &str) -> Result<(), VerifyError> {
        let spec = approved.trim();
        if spec.is_empty() {
            return Err(VerifyError::InvalidInput("approved specification is empty".to_string()));
        }

        // one confirmation decision at a time
        let _gate = self.confirm_gate.lock().await;
        let job = self.status(job_id).await?;

        if job.level != VerificationLevel::Deep {
            return Err(VerifyError::InvalidInput(format!(
                "job {} is a {} verification and takes no specification",
                job_id, job.level
            )));
        }
        if job.status == JobStatus::Completed {
            return Err(VerifyError::InvalidInput(format!("job {} has already completed", job_id)));
        }
        if job.spec_draft.is_none() {
            return Err(VerifyError::InvalidInput(format!(
                "job {} has no specification draft to confirm",
                job_id
            )));
        }
        // `awaiting_confirmation` and `failed` are a unit's last write, so only
        // `running` and `processing` mean work is under way
        let busy = matches!(job.status, JobStatus::Running | JobStatus::Processing);
        if busy && self.runner.is_in_flight(job_id) {
            if job.spec_used.as_deref() == Some(spec) {
                info!("Job {} is already proving this specification", job_id);
                return Ok(());
            }
            return Err(VerifyError::InvalidInput(format!(
                "job {} is {} and cannot take a different specification",
                job_id, job.status
            )));
        }

        let project = self.workflow.load_project(&job.project_id).await?;
        if job.status != JobStatus::AwaitingConfirmation {
            self.workflow
                .store
                .update(
                    job_id,
                    JobUpdate::status(JobStatus::AwaitingConfirmation)
                        .with_log(format!("Job was {}; reset to awaiting confirmation", job.status)),
                )
                .await?;
        }

        let update = JobUpdate {
            spec_used: Some(spec.to_string()),
            ..JobUpdate::status(JobStatus::Processing)
        }
        .with_log("Specification approved; starting formal verification");
        self.workflow.store.update(job_id, update).await?;
        info!("Job {} confirmed", job_id);

        let workflow = self.workflow.clone();
        let id = job_id.to_string();
        let spec = spec.to_string();
        self.submit(job_id, Box::pin(async move { workflow.run_finalize(&id, project, spec).await }))
            .await
    }

    /// [`confirm`](Self::confirm) with a JSON payload: a string or a wrapper object
    pub async fn confirm_payload(&self, job_id: &str, payload: &Value) -> Result<(), VerifyError> {
        let spec = normalize_confirmation(payload)
            .ok_or_else(|| VerifyError::InvalidInput("approved specification is empty".to_string()))?;
        self.confirm(job_id, &spec).await
    }

    pub async fn status(&self, job_id: &str) -> Result<VerificationJob, VerifyError> {
        self.workflow
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| VerifyError::RecordNotFound(format!("verification {}", job_id)))
    }

    /// Jobs for a project, newest first
    pub async fn history(&self, project_id: &str, limit: Option<usize>) -> Result<Vec<VerificationJob>, VerifyError> {
        let mut query = JobQuery::for_project(project_id);
        query.limit = limit;
        self.workflow.store.query(query).await
    }

    /// Poll until `done` holds or `timeout` elapses; returns the last record seen
    pub async fn wait_for<F>(&self, job_id: &str, done: F, timeout: Duration) -> Result<VerificationJob, VerifyError>
    where
        F: Fn(&VerificationJob) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = self.status(job_id).await?;
            if done(&job) || tokio::time::Instant::now() >= deadline {
                return Ok(job);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Jobs with queued or running background work
    pub fn active_jobs(&self) -> usize {
        self.runner.in_flight_count()
    }

    pub fn ai_backends(&self) -> Vec<String> {
        self.workflow.ai.backend_names()
    }

    async fn submit(&self, job_id: &str, work: JobFuture) -> Result<(), VerifyError> {
        if let Err(e) = self.runner.submit(job_id, work) {
            runner::mark_failed(self.workflow.store.as_ref(), job_id, e.log_line()).await;
            return Err(e);
        }
        Ok(())
    }
}

fn capitalize(level: VerificationLevel) -> &'static str {
    match level {
        VerificationLevel::Simple => "Simple",
        VerificationLevel::Deep => "Deep",
    }
}
