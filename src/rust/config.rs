// SPDX-License-Identifier: PMPL-1.0-or-later

//! Runtime configuration
//!
//! Loaded from an optional TOML file. Every section has defaults, so an empty
//! file (or no file) yields a usable configuration with no AI backends.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub analyzer: AnalyzerConfig,
    pub prover: ProverConfig,
    pub ai: AiConfig,
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors: false,
        }
    }
}

/// Static analyzer invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Analyzer executable (Slither-compatible CLI)
    pub executable: PathBuf,
    /// Extra arguments appended after `--json <path>`
    pub args: Vec<String>,
    /// Time limit in seconds
    pub timeout_secs: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("slither"),
            args: vec![],
            timeout_secs: 300,
        }
    }
}

/// Formal prover and its isolated runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProverConfig {
    /// Interpreter used to create the runtime
    pub python: PathBuf,
    /// Where the runtime environment lives
    pub runtime_dir: PathBuf,
    /// Dependency manifest installed into the runtime on first use
    pub requirements: PathBuf,
    /// Prover entry point inside the runtime's `bin` directory
    pub entry_point: String,
    /// Extra arguments appended after `--json`
    pub args: Vec<String>,
    /// Time limit for one proving run, in seconds
    pub timeout_secs: u64,
    /// Time limit for building the runtime, in seconds
    pub install_timeout_secs: u64,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            python: PathBuf::from("python3"),
            runtime_dir: PathBuf::from(".solguard/prover-runtime"),
            requirements: PathBuf::from("prover-requirements.txt"),
            entry_point: "certoraRun".to_string(),
            args: vec![],
            timeout_secs: 900,
            install_timeout_secs: 900,
        }
    }
}

/// AI completion backends, tried in order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Per-request time limit in seconds
    pub request_timeout_secs: u64,
    pub backends: Vec<AiBackendConfig>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 120,
            backends: vec![],
        }
    }
}

/// One OpenAI-compatible chat-completions endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiBackendConfig {
    pub name: String,
    /// Full chat-completions URL
    pub endpoint: String,
    /// Model for reformatting
    pub model: String,
    /// Model for deep reasoning; falls back to `model`
    #[serde(default)]
    pub reasoning_model: Option<String>,
    /// Inline credential (prefer `api_key_env`)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the credential
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl AiBackendConfig {
    /// Resolve the credential, preferring the inline key
    pub fn credential(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Some(key.clone());
        }
        self.api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Jobs allowed to run at the same time
    pub max_concurrent: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

impl AppConfig {
    /// Load from a TOML file, or defaults when `path` is `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => AppConfig::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.jobs.max_concurrent == 0 {
            anyhow::bail!("jobs.max_concurrent must be at least 1");
        }
        for backend in &self.ai.backends {
            if backend.endpoint.trim().is_empty() {
                anyhow::bail!("AI backend '{}' has an empty endpoint", backend.name);
            }
        }
        Ok(())
    }

    /// Append a backend described by `SOLGUARD_AI_ENDPOINT`, `SOLGUARD_AI_MODEL`
    /// and `SOLGUARD_AI_KEY`, when the endpoint variable is set.
    fn apply_env_overrides(&mut self) {
        let Ok(endpoint) = std::env::var("SOLGUARD_AI_ENDPOINT") else {
            return;
        };
        let Ok(model) = std::env::var("SOLGUARD_AI_MODEL") else {
            warn!("SOLGUARD_AI_ENDPOINT is set but SOLGUARD_AI_MODEL is not; ignoring");
            return;
        };
        debug!("Adding AI backend from environment: {}", endpoint);
        self.ai.backends.push(AiBackendConfig {
            name: "env".to_string(),
            endpoint,
            model,
            reasoning_model: std::env::var("SOLGUARD_AI_REASONING_MODEL").ok(),
            api_key: None,
            api_key_env: Some("SOLGUARD_AI_KEY".to_string()),
        });
    }
}
