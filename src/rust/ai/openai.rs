// SPDX-License-Identifier: PMPL-1.0-or-later

//! OpenAI-compatible chat-completions backend

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CompletionBackend, CompletionRequest};
use crate::config::AiBackendConfig;
use crate::error::excerpt;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// One configured endpoint
pub struct OpenAiBackend {
    config: AiBackendConfig,
    client: Client,
}

impl OpenAiBackend {
    pub fn new(config: AiBackendConfig, client: Client) -> Self {
        OpenAiBackend { config, client }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let model = request.mode.select_model(&self.config);
        let (temperature, max_tokens) = request.mode.sampling();

        let body = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.content,
                },
            ],
            temperature,
            max_tokens,
        };

        debug!("POST {} (model {})", self.config.endpoint, model);
        let mut call = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = self.config.credential() {
            call = call.bearer_auth(key);
        }

        let response = call
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.config.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("HTTP {}: {}", status, excerpt(text.trim(), 300));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("response is not a chat-completions payload")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        match content {
            Some(text) => Ok(text),
            None => bail!("response contained no message content"),
        }
    }
}
