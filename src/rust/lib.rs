// SPDX-License-Identifier: PMPL-1.0-or-later

//! solguard: smart-contract verification workflows
//!
//! Runs a contract through a static analyzer and, for deep verification,
//! through an AI-drafted and human-approved formal specification checked by
//! a prover. Every request is a persisted job that moves through a small
//! state machine and always ends `completed` or `failed`.

pub mod ai;
pub mod analyzer;
pub mod config;
pub mod core;
pub mod error;
pub mod executor;
pub mod job;
pub mod prover;
pub mod server;
pub mod store;

pub use ai::{AiTransform, CompletionBackend, TransformMode};
pub use analyzer::{StaticAnalyzer, ToolOutput};
pub use config::AppConfig;
pub use core::{Finding, JobStatus, Severity, VerificationJob, VerificationLevel};
pub use error::{AdapterError, ParseError, TransformError, VerifyError};
pub use job::VerificationService;
pub use prover::{FormalProver, ProverReport};
pub use store::{MemoryStore, ProjectSource, RecordStore};
