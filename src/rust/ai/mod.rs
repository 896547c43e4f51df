// SPDX-License-Identifier: PMPL-1.0-or-later

//! AI text transforms
//!
//! A transform sends a (prompt, content) pair to the first configured
//! completion backend that answers. Failures and time-outs move on to the
//! next backend; callers always get text or a [`TransformError`].

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{AiBackendConfig, AiConfig};
use crate::error::TransformError;

pub mod openai;
pub mod payload;
pub mod prompts;

pub use openai::OpenAiBackend;
pub use payload::{extract_json_object, interpret, strip_code_fence, AiPayload};

/// Model/style variant for a transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformMode {
    /// Fast, low-temperature restructuring of existing content
    Reformat,
    /// Reasoning model with a larger output budget
    DeepReasoning,
}

impl TransformMode {
    /// (temperature, max_tokens)
    pub fn sampling(self) -> (f32, u32) {
        match self {
            TransformMode::Reformat => (0.1, 4096),
            TransformMode::DeepReasoning => (0.3, 8192),
        }
    }

    pub fn select_model(self, backend: &AiBackendConfig) -> &str {
        match self {
            TransformMode::Reformat => &backend.model,
            TransformMode::DeepReasoning => backend.reasoning_model.as_deref().unwrap_or(&backend.model),
        }
    }
}

/// One completion call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub content: String,
    pub mode: TransformMode,
}

/// A text-completion provider
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Ordered-fallback transform over the configured backends
#[derive(Clone)]
pub struct AiTransform {
    backends: Vec<Arc<dyn CompletionBackend>>,
    request_timeout: Duration,
}

impl AiTransform {
    pub fn new(backends: Vec<Arc<dyn CompletionBackend>>, request_timeout: Duration) -> Self {
        AiTransform {
            backends,
            request_timeout,
        }
    }

    /// Build HTTP backends for every configured endpoint
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder().timeout(request_timeout).build()?;
        let backends = config
            .backends
            .iter()
            .map(|b| Arc::new(OpenAiBackend::new(b.clone(), client.clone())) as Arc<dyn CompletionBackend>)
            .collect();
        Ok(Self::new(backends, request_timeout))
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    pub fn is_configured(&self) -> bool {
        !self.backends.is_empty()
    }

    /// Transform `content` under `prompt`, returning the first successful response
    pub async fn transform(
        &self,
        content: &str,
        prompt: &str,
        mode: TransformMode,
    ) -> Result<String, TransformError> {
        if self.backends.is_empty() {
            warn!("AI transform requested but no backend is configured");
            return Err(TransformError::NoBackend);
        }

        let request = CompletionRequest {
            system: prompt.to_string(),
            content: content.to_string(),
            mode,
        };

        let mut attempts = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            match tokio::time::timeout(self.request_timeout, backend.complete(&request)).await {
                Ok(Ok(text)) => {
                    info!("AI backend '{}' answered ({} chars)", backend.name(), text.len());
                    return Ok(text);
                }
                Ok(Err(e)) => {
                    warn!("AI backend '{}' failed: {:#}", backend.name(), e);
                    attempts.push(format!("{}: {:#}", backend.name(), e));
                }
                Err(_) => {
                    warn!("AI backend '{}' timed out after {:?}", backend.name(), self.request_timeout);
                    attempts.push(format!("{}: timed out", backend.name()));
                }
            }
        }

        Err(TransformError::AllBackendsFailed { attempts })
    }
}
