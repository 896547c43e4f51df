// SPDX-License-Identifier: PMPL-1.0-or-later

//! External process execution
//!
//! Every analyzer, prover and runtime-install invocation goes through a
//! time-bounded runner. A process that outlives its limit is killed.

pub mod runner;

pub use runner::{ProcessOutput, ProcessRunner};
