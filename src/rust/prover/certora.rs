// SPDX-License-Identifier: PMPL-1.0-or-later

//! Certora-compatible prover adapter
//!
//! Invocation, from inside the shared runtime:
//! `<interpreter> <entry> <source> --spec <specFile> --json`

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::{FormalProver, ProverReport, ProverRuntime};
use crate::config::ProverConfig;
use crate::error::AdapterError;
use crate::executor::ProcessRunner;

const TOOL: &str = "prover";

pub struct CertoraProver {
    runtime: Arc<ProverRuntime>,
    runner: ProcessRunner,
    extra_args: Vec<String>,
}

impl CertoraProver {
    /// Create a prover with its own runtime
    pub fn new(config: ProverConfig) -> Self {
        let runner = ProcessRunner::from_secs(config.timeout_secs);
        let extra_args = config.args.clone();
        CertoraProver {
            runtime: Arc::new(ProverRuntime::new(config)),
            runner,
            extra_args,
        }
    }

    pub fn runtime(&self) -> &Arc<ProverRuntime> {
        &self.runtime
    }
}

#[async_trait]
impl FormalProver for CertoraProver {
    fn name(&self) -> &str {
        "certora"
    }

    async fn prove(&self, source: &Path, spec_code: &str) -> Result<ProverReport, AdapterError> {
        self.runtime.ensure_ready().await?;

        // Removed on every exit path when `scratch` drops
        let scratch = tempfile::Builder::new()
            .prefix("solguard-spec-")
            .tempdir()
            .map_err(|e| AdapterError::new(TOOL, format!("cannot create scratch directory: {}", e)))?;
        let spec_path = scratch.path().join("contract.spec");
        tokio::fs::write(&spec_path, spec_code)
            .await
            .map_err(|e| AdapterError::new(TOOL, format!("cannot write spec file: {}", e)))?;

        let mut args: Vec<OsString> = vec![
            self.runtime.entry_point().into_os_string(),
            source.as_os_str().to_owned(),
            "--spec".into(),
            spec_path.into_os_string(),
            "--json".into(),
        ];
        args.extend(self.extra_args.iter().map(OsString::from));

        info!("Running prover on {}", source.display());
        let output = self
            .runner
            .run(&self.runtime.interpreter(), &args)
            .await
            .map_err(|e| AdapterError::new(TOOL, format!("{:#}", e)))?;

        if output.killed {
            return Err(AdapterError::new(
                TOOL,
                output.kill_reason.unwrap_or_else(|| "killed".to_string()),
            ));
        }

        let raw_output = output.combined();
        if !output.success() && raw_output.trim().is_empty() {
            warn!("Prover exited with {:?} and produced no output", output.exit_code);
            return Err(AdapterError::new(
                TOOL,
                format!("exit code {:?} with no output", output.exit_code),
            ));
        }

        let structured = serde_json::from_str(output.stdout.trim()).ok();

        Ok(ProverReport {
            raw_output,
            structured,
            exit_code: output.exit_code,
        })
    }
}
