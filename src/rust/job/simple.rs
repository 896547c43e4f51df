// SPDX-License-Identifier: PMPL-1.0-or-later

//! Simple verification: static analysis, then AI reformatting

use tracing::{info, warn};

use super::report::parse_report;
use super::{Workflow, Workspace};
use crate::ai::{prompts, TransformMode};
use crate::core::{renumber, Finding, JobStatus, JobUpdate, Project, VerificationLevel};
use crate::error::VerifyError;

impl Workflow {
    /// Analyze, reformat and complete a simple job.
    ///
    /// An analyzer failure still completes the job, with no results. A
    /// response that cannot be parsed falls back to the analyzer's findings.
    /// Transform failures propagate and fail the job.
    pub(crate) async fn run_simple(&self, job_id: &str, project: Project) -> Result<(), VerifyError> {
        let workspace = Workspace::stage(&project).await?;
        self.log(job_id, format!("Running static analysis ({})", self.analyzer.name()))
            .await?;

        let findings = match self.analyzer.analyze(&workspace.source).await {
            Ok(findings) => findings,
            Err(e) => {
                warn!("Job {}: analyzer failed: {}", job_id, e);
                let line = VerifyError::from(e).log_line();
                self.store
                    .update(
                        job_id,
                        JobUpdate::status(JobStatus::Completed)
                            .with_log(line.clone())
                            .with_log("Static analysis did not run; no results recorded")
                            .with_results(Vec::new())
                            .with_error(line),
                    )
                    .await?;
                return Ok(());
            }
        };
        drop(workspace);

        let findings: Vec<Finding> = findings
            .into_iter()
            .map(|mut f| {
                f.severity = f.severity.clamp_for(VerificationLevel::Simple);
                f.kind = f.severity.kind();
                f
            })
            .collect();
        self.log(
            job_id,
            format!("Static analysis reported {} finding(s)", findings.iter().filter(|f| !f.is_placeholder()).count()),
        )
        .await?;

        let input = serde_json::to_string_pretty(&findings).unwrap_or_default();
        let response = self
            .ai
            .transform(&input, &prompts::reformat_findings(), TransformMode::Reformat)
            .await?;

        let file_name = source_name(&findings, &project);
        let update = match parse_report(&response, VerificationLevel::Simple, &file_name) {
            Ok(report) => {
                let count = report.results.len();
                JobUpdate::status(JobStatus::Completed)
                    .with_logs(report.logs)
                    .with_log(format!("Verification completed with {} result(s)", count))
                    .with_results(report.results)
            }
            Err(e) => {
                warn!("Job {}: unusable AI report: {}", job_id, e);
                let line = VerifyError::from(e).log_line();
                JobUpdate::status(JobStatus::Completed)
                    .with_log(line.clone())
                    .with_log("Reporting the analyzer's own findings")
                    .with_results(renumber(findings))
                    .with_error(line)
            }
        };
        self.store.update(job_id, update).await?;
        info!("Job {} completed", job_id);
        Ok(())
    }
}

fn source_name(findings: &[Finding], project: &Project) -> String {
    findings
        .first()
        .map(|f| f.file.clone())
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| project.name.clone())
}
