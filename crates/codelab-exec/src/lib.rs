//! # codelab-exec
//!
//! Compute-service client and job orchestration for code execution.
//!
//! - [`languages`] — fixed language name → compute-service id mapping
//! - [`types`] — request/result types and status normalization
//! - [`client`] — [`ComputeService`](client::ComputeService) trait and the
//!   Judge0-compatible reqwest implementation
//! - [`orchestrator`] — validate → submit → poll → normalize state machine
//!
//! Callers await a single future per submission; the bounded polling loop
//! (40 attempts, ~350 ms apart) is internal.

#![deny(unsafe_code)]

pub mod client;
pub mod languages;
pub mod orchestrator;
pub mod types;

pub use client::{ComputeError, ComputeService, Judge0Client};
pub use orchestrator::{ExecError, JobOrchestrator, PollConfig};
pub use types::{ExecutionRequest, ExecutionResult, ExecutionStatus};
