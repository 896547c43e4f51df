// SPDX-License-Identifier: PMPL-1.0-or-later

//! Shared, lazily-built prover runtime
//!
//! The prover runs inside a Python virtual environment whose dependencies
//! come from a fixed requirements manifest. Building it is slow, so it is
//! done at most once per process: a readiness flag behind an async mutex
//! lets exactly one initialization run while other callers wait. A failed
//! build leaves the flag unset and the next caller tries again.

use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::ProverConfig;
use crate::error::AdapterError;
use crate::executor::ProcessRunner;

const TOOL: &str = "prover-runtime";
const MARKER: &str = ".solguard-ready";

#[derive(Debug, Default)]
struct RuntimeState {
    ready: bool,
    init_attempts: u32,
}

/// Isolated environment the prover executes in
#[derive(Debug)]
pub struct ProverRuntime {
    config: ProverConfig,
    state: Mutex<RuntimeState>,
}

impl ProverRuntime {
    pub fn new(config: ProverConfig) -> Self {
        ProverRuntime {
            config,
            state: Mutex::new(RuntimeState::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.config.runtime_dir
    }

    pub fn bin_dir(&self) -> PathBuf {
        if cfg!(windows) {
            self.config.runtime_dir.join("Scripts")
        } else {
            self.config.runtime_dir.join("bin")
        }
    }

    /// The environment's own interpreter
    pub fn interpreter(&self) -> PathBuf {
        self.bin_dir().join("python")
    }

    pub fn entry_point(&self) -> PathBuf {
        self.bin_dir().join(&self.config.entry_point)
    }

    pub async fn is_ready(&self) -> bool {
        self.state.lock().await.ready
    }

    /// Number of initialization attempts made so far
    pub async fn init_attempts(&self) -> u32 {
        self.state.lock().await.init_attempts
    }

    /// Build the runtime unless it is already ready.
    ///
    /// The lock is held for the whole build, so concurrent callers queue
    /// behind the single attempt and then observe its outcome.
    pub async fn ensure_ready(&self) -> Result<(), AdapterError> {
        let mut state = self.state.lock().await;
        if state.ready {
            return Ok(());
        }

        state.init_attempts += 1;
        info!(
            "Initializing prover runtime at {} (attempt {})",
            self.config.runtime_dir.display(),
            state.init_attempts
        );

        match self.build().await {
            Ok(()) => {
                state.ready = true;
                info!("Prover runtime ready");
                Ok(())
            }
            Err(e) => {
                warn!("Prover runtime initialization failed: {}", e);
                Err(e)
            }
        }
    }

    async fn build(&self) -> Result<(), AdapterError> {
        let requirements = tokio::fs::read_to_string(&self.config.requirements)
            .await
            .map_err(|e| {
                AdapterError::new(
                    TOOL,
                    format!(
                        "cannot read requirements manifest {}: {}",
                        self.config.requirements.display(),
                        e
                    ),
                )
            })?;

        let marker = self.config.runtime_dir.join(MARKER);
        if self.interpreter().exists() {
            if let Ok(installed) = tokio::fs::read_to_string(&marker).await {
                if installed == requirements {
                    info!("Reusing existing prover runtime");
                    return Ok(());
                }
            }
        }

        let runner = ProcessRunner::from_secs(self.config.install_timeout_secs);

        if !self.interpreter().exists() {
            if let Some(parent) = self.config.runtime_dir.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    AdapterError::new(TOOL, format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
            let root = self.config.runtime_dir.as_os_str().to_owned();
            let output = runner
                .run(&self.config.python, [std::ffi::OsString::from("-m"), "venv".into(), root])
                .await
                .map_err(|e| AdapterError::new(TOOL, format!("{:#}", e)))?;
            if !output.success() {
                return Err(AdapterError::new(TOOL, "virtual environment creation failed")
                    .with_diagnostics(output.combined()));
            }
        }

        let manifest = self.config.requirements.as_os_str().to_owned();
        let output = runner
            .run(
                &self.interpreter(),
                [
                    std::ffi::OsString::from("-m"),
                    "pip".into(),
                    "install".into(),
                    "--quiet".into(),
                    "-r".into(),
                    manifest,
                ],
            )
            .await
            .map_err(|e| AdapterError::new(TOOL, format!("{:#}", e)))?;
        if !output.success() {
            let reason = output
                .kill_reason
                .clone()
                .unwrap_or_else(|| "dependency installation failed".to_string());
            return Err(AdapterError::new(TOOL, reason).with_diagnostics(output.combined()));
        }

        tokio::fs::write(&marker, requirements)
            .await
            .map_err(|e| AdapterError::new(TOOL, format!("cannot write {}: {}", marker.display(), e)))?;
        Ok(())
    }
}
