// SPDX-License-Identifier: PMPL-1.0-or-later

//! Time-bounded subprocess execution

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured result of one process run
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if killed or terminated by a signal)
    pub exit_code: Option<i32>,
    /// Whether the process was killed for exceeding its time limit
    pub killed: bool,
    pub kill_reason: Option<String>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout followed by stderr, skipping empty streams
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
            (false, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (true, true) => String::new(),
        }
    }
}

/// Runs external commands with a time limit
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    time_limit: Duration,
}

impl ProcessRunner {
    pub fn new(time_limit: Duration) -> Self {
        Self { time_limit }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Run `program` with `args` and stdin closed.
    ///
    /// Spawn failures are errors. Exceeding the time limit is not: the child
    /// is killed and the output reports `killed = true`.
    pub async fn run<I, S>(&self, program: &Path, args: I) -> Result<ProcessOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Spawning {:?}", cmd.as_std());

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", program.display()))?;

        match tokio::time::timeout(self.time_limit, child.wait_with_output()).await {
            Ok(result) => {
                let output = result
                    .with_context(|| format!("Failed to wait for {}", program.display()))?;
                Ok(ProcessOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    exit_code: output.status.code(),
                    killed: false,
                    kill_reason: None,
                })
            }
            Err(_) => {
                // the child future was dropped; kill_on_drop reaps the process
                warn!(
                    "{} exceeded its time limit of {:?}",
                    program.display(),
                    self.time_limit
                );
                Ok(ProcessOutput {
                    killed: true,
                    kill_reason: Some(format!(
                        "Time limit exceeded ({} seconds)",
                        self.time_limit.as_secs()
                    )),
                    ..Default::default()
                })
            }
        }
    }
}

/// First line of `<program> --version`, if the program can be run at all
pub async fn probe_version(program: &Path) -> Option<String> {
    let runner = ProcessRunner::from_secs(15);
    let output = runner.run(program, ["--version"]).await.ok()?;
    if output.killed {
        return None;
    }
    output
        .combined()
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}
