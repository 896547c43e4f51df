// SPDX-License-Identifier: PMPL-1.0-or-later

//! Common test utilities for the solguard test suite

#![allow(dead_code)]

use solguard::ai::{AiTransform, CompletionBackend};
use solguard::core::{JobStatus, VerificationJob};
use solguard::job::VerificationService;
use solguard::store::{MemoryStore, RecordStore};
use std::sync::Arc;
use std::time::Duration;

pub mod mocks;

use mocks::{MockAnalyzer, MockBackend, MockProver, SlowCommitStore};

/// Withdraw sends ether before zeroing the balance
pub const REENTRANT_BANK: &str = r#"// SPDX-License-Identifier: MIT
pragma solidity ^0.8.0;

contract Bank {
    mapping(address => uint256) public balances;

    function deposit() external payable {
        balances[msg.sender] += msg.value;
    }

    function withdraw() external {
        uint256 amount = balances[msg.sender];
        (bool ok, ) = msg.sender.call{value: amount}("");
        require(ok, "transfer failed");
        balances[msg.sender] = 0;
    }
}
"#;

pub const BALANCE_SPEC: &str = "1. Balances must never go negative.";

/// A service wired to scripted collaborators, with one registered project
pub struct Harness {
    pub service: VerificationService,
    pub store: Arc<MemoryStore>,
    pub analyzer: Arc<MockAnalyzer>,
    pub prover: Arc<MockProver>,
    pub backend: Arc<MockBackend>,
    /// Second backend, wired only by [`Harness::with_fallback`]
    pub fallback: Arc<MockBackend>,
    pub project_id: String,
}

#[derive(Default)]
struct Setup {
    prover: Option<MockProver>,
    without_ai: bool,
    with_fallback: bool,
    commit_latency: Option<Duration>,
}

impl Harness {
    /// One scripted AI backend
    pub async fn new() -> Self {
        Self::build(Setup::default()).await
    }

    /// No AI backend at all
    pub async fn without_ai() -> Self {
        Self::build(Setup {
            without_ai: true,
            ..Setup::default()
        })
        .await
    }

    pub async fn with_prover(prover: MockProver) -> Self {
        Self::build(Setup {
            prover: Some(prover),
            ..Setup::default()
        })
        .await
    }

    /// `backend` first, then `fallback`
    pub async fn with_fallback() -> Self {
        Self::build(Setup {
            with_fallback: true,
            ..Setup::default()
        })
        .await
    }

    /// Store updates become visible `latency` before the writer resumes
    pub async fn with_commit_latency(latency: Duration) -> Self {
        Self::build(Setup {
            commit_latency: Some(latency),
            ..Setup::default()
        })
        .await
    }

    async fn build(setup: Setup) -> Self {
        let store = Arc::new(MemoryStore::new());
        let project = store.create_project("Bank.sol", REENTRANT_BANK).await;
        let analyzer = Arc::new(MockAnalyzer::new());
        let prover = Arc::new(setup.prover.unwrap_or_default());
        let backend = Arc::new(MockBackend::new("scripted"));
        let fallback = Arc::new(MockBackend::new("fallback"));

        let mut backends: Vec<Arc<dyn CompletionBackend>> = vec![];
        if !setup.without_ai {
            backends.push(backend.clone());
            if setup.with_fallback {
                backends.push(fallback.clone());
            }
        }
        let records: Arc<dyn RecordStore> = match setup.commit_latency {
            Some(latency) => Arc::new(SlowCommitStore {
                inner: store.clone(),
                latency,
            }),
            None => store.clone(),
        };
        let service = VerificationService::new(
            records,
            store.clone(),
            analyzer.clone(),
            prover.clone(),
            AiTransform::new(backends, Duration::from_secs(5)),
            4,
        );

        Harness {
            service,
            store,
            analyzer,
            prover,
            backend,
            fallback,
            project_id: project.id,
        }
    }

    pub async fn wait_terminal(&self, job_id: &str) -> VerificationJob {
        let job = self
            .service
            .wait_for(job_id, |job| job.status.is_terminal(), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(job.status.is_terminal(), "job {} stuck in {}", job_id, job.status);
        job
    }

    pub async fn wait_status(&self, job_id: &str, status: JobStatus) -> VerificationJob {
        let job = self
            .service
            .wait_for(
                job_id,
                |job| job.status == status || job.status.is_terminal(),
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        assert_eq!(job.status, status, "logs: {:?}", job.logs);
        job
    }

    /// Wait until no background work remains
    pub async fn settle(&self) {
        for _ in 0..500 {
            if self.service.active_jobs() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("background work did not finish");
    }
}

/// `completed_at` is present exactly when the job is terminal
pub fn assert_completion_stamp(job: &VerificationJob) {
    assert_eq!(
        job.completed_at.is_some(),
        job.status.is_terminal(),
        "status {} with completed_at {:?}",
        job.status,
        job.completed_at
    );
}

pub fn logs_mention(job: &VerificationJob, needle: &str) -> bool {
    job.logs.iter().any(|entry| entry.contains(needle))
}
