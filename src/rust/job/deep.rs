// SPDX-License-Identifier: PMPL-1.0-or-later

//! Deep verification
//!
//! Phase one drafts an English specification and pauses the job. Once the
//! specification is approved, phase two turns it into prover code, runs the
//! prover and reformats the outcome. Every failure in either phase fails
//! the job; artifacts written before the failure are kept.

use tracing::info;

use super::report::{normalize_draft, parse_report};
use super::{Workflow, Workspace};
use crate::ai::{prompts, strip_code_fence, TransformMode};
use crate::core::{JobStatus, JobUpdate, Project, VerificationLevel};
use crate::error::{ParseError, VerifyError};

impl Workflow {
    pub(crate) async fn run_draft(&self, job_id: &str, project: Project) -> Result<(), VerifyError> {
        self.log(job_id, "Drafting formal specification").await?;

        let response = self
            .ai
            .transform(&project.code, prompts::DRAFT_SPECIFICATION, TransformMode::DeepReasoning)
            .await?;
        let draft = normalize_draft(&response)
            .ok_or_else(|| ParseError::new("specification draft is empty", &response))?;

        let update = JobUpdate {
            spec_draft: Some(draft),
            ..JobUpdate::status(JobStatus::AwaitingConfirmation)
        }
        .with_log("Specification draft ready for review");
        self.store.update(job_id, update).await?;
        info!("Job {} awaiting confirmation", job_id);
        Ok(())
    }

    pub(crate) async fn run_finalize(&self, job_id: &str, project: Project, spec: String) -> Result<(), VerifyError> {
        self.log(job_id, "Generating verification code").await?;
        let response = self
            .ai
            .transform(&spec, prompts::GENERATE_SPEC_CODE, TransformMode::DeepReasoning)
            .await?;
        let code = strip_code_fence(&response);
        if code.is_empty() {
            return Err(ParseError::new("generated verification code is empty", &response).into());
        }

        let update = JobUpdate {
            prover_artifact: Some(code.clone()),
            ..Default::default()
        }
        .with_log(format!("Generated verification code ({} lines)", code.lines().count()));
        self.store.update(job_id, update).await?;

        let workspace = Workspace::stage(&project).await?;
        self.log(job_id, format!("Running formal verification ({})", self.prover.name()))
            .await?;
        let outcome = self.prover.prove(&workspace.source, &code).await?;
        self.log(
            job_id,
            format!("Prover finished with exit code {}", outcome.exit_code.map_or("none".to_string(), |c| c.to_string())),
        )
        .await?;

        let response = self
            .ai
            .transform(&outcome.transform_input(), &prompts::reformat_prover_results(), TransformMode::Reformat)
            .await?;
        let report = parse_report(&response, VerificationLevel::Deep, &workspace.file_name)?;

        let count = report.results.len();
        let update = JobUpdate::status(JobStatus::Completed)
            .with_logs(report.logs)
            .with_log(format!("Formal verification completed with {} result(s)", count))
            .with_results(report.results);
        self.store.update(job_id, update).await?;
        info!("Job {} completed", job_id);
        Ok(())
    }
}
