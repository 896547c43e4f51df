// SPDX-License-Identifier: PMPL-1.0-or-later

//! Scripted stand-ins for the analyzer, the prover, AI backends and the
//! record store. Each pops its next scripted result in the order it was added.

use async_trait::async_trait;
use solguard::ai::{CompletionBackend, CompletionRequest};
use solguard::analyzer::{StaticAnalyzer, ToolOutput};
use solguard::core::{Finding, JobUpdate, NewJob, VerificationJob};
use solguard::error::{AdapterError, VerifyError};
use solguard::prover::{FormalProver, ProverReport};
use solguard::store::{JobQuery, MemoryStore, RecordStore};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn next<T>(queue: &Mutex<Vec<T>>) -> Option<T> {
    let mut queue = queue.lock().unwrap();
    if queue.is_empty() {
        None
    } else {
        Some(queue.remove(0))
    }
}

/// A mock static analyzer
#[derive(Default)]
pub struct MockAnalyzer {
    pub results: Arc<Mutex<Vec<ToolOutput>>>,
    pub sources: Arc<Mutex<Vec<String>>>,
}

impl MockAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&self, result: ToolOutput) {
        self.results.lock().unwrap().push(result);
    }

    pub fn calls(&self) -> usize {
        self.sources.lock().unwrap().len()
    }
}

#[async_trait]
impl StaticAnalyzer for MockAnalyzer {
    fn name(&self) -> &str {
        "mock-analyzer"
    }

    async fn analyze(&self, source: &Path) -> ToolOutput {
        let code = tokio::fs::read_to_string(source).await.unwrap_or_default();
        self.sources.lock().unwrap().push(code);
        let file = source.file_name().unwrap().to_string_lossy().to_string();
        next(&self.results).unwrap_or_else(|| Ok(vec![Finding::placeholder(file)]))
    }
}

/// A mock formal prover
#[derive(Default)]
pub struct MockProver {
    pub results: Arc<Mutex<Vec<Result<ProverReport, AdapterError>>>>,
    pub specs: Arc<Mutex<Vec<String>>>,
    pub delay: Option<Duration>,
}

impl MockProver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        MockProver {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn add_result(&self, result: Result<ProverReport, AdapterError>) {
        self.results.lock().unwrap().push(result);
    }

    pub fn calls(&self) -> usize {
        self.specs.lock().unwrap().len()
    }
}

#[async_trait]
impl FormalProver for MockProver {
    fn name(&self) -> &str {
        "mock-prover"
    }

    async fn prove(&self, _source: &Path, spec_code: &str) -> Result<ProverReport, AdapterError> {
        self.specs.lock().unwrap().push(spec_code.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        next(&self.results).unwrap_or_else(|| {
            Ok(ProverReport {
                raw_output: "rule solvency: VERIFIED".to_string(),
                structured: None,
                exit_code: Some(0),
            })
        })
    }
}

/// A mock completion backend
pub struct MockBackend {
    pub name: String,
    pub responses: Arc<Mutex<Vec<anyhow::Result<String>>>>,
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockBackend {
    pub fn new(name: &str) -> Self {
        MockBackend {
            name: name.to_string(),
            responses: Arc::new(Mutex::new(vec![])),
            requests: Arc::new(Mutex::new(vec![])),
        }
    }

    pub fn add_response(&self, text: &str) {
        self.responses.lock().unwrap().push(Ok(text.to_string()));
    }

    pub fn add_failure(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push(Err(anyhow::anyhow!(message.to_string())));
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        next(&self.responses).unwrap_or_else(|| Err(anyhow::anyhow!("no scripted response")))
    }
}

/// A record store whose writers return only some time after each update is
/// visible to readers, like a remote database acknowledging late
pub struct SlowCommitStore {
    pub inner: Arc<MemoryStore>,
    pub latency: Duration,
}

#[async_trait]
impl RecordStore for SlowCommitStore {
    async fn create(&self, job: NewJob) -> Result<String, VerifyError> {
        self.inner.create(job).await
    }

    async fn update(&self, id: &str, update: JobUpdate) -> Result<VerificationJob, VerifyError> {
        let job = self.inner.update(id, update).await?;
        tokio::time::sleep(self.latency).await;
        Ok(job)
    }

    async fn get(&self, id: &str) -> Result<Option<VerificationJob>, VerifyError> {
        self.inner.get(id).await
    }

    async fn query(&self, query: JobQuery) -> Result<Vec<VerificationJob>, VerifyError> {
        self.inner.query(query).await
    }
}
