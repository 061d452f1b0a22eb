//! Execution request/result types and status normalization.
//!
//! The compute service reports status as a free-form description string
//! (`"In Queue"`, `"Processing"`, `"Accepted"`, ...). [`normalize_status`]
//! maps that vocabulary onto the fixed [`ExecutionStatus`] enumeration so
//! callers never see the service's wording.

use serde::{Deserialize, Serialize};

/// A code-execution request as accepted by the gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Compute-service language id (must be in the recognized table).
    pub language_id: u32,
    /// Program source; must be non-empty.
    pub source_code: String,
    /// Standard input fed to the program.
    #[serde(default)]
    pub stdin: String,
    /// Base64-encode source/stdin in transit and decode outputs on the
    /// way back. Must be threaded consistently through submit and fetch.
    #[serde(default)]
    pub base64_encoded: bool,
}

/// Terminal-or-in-progress status of one execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Waiting in the service queue.
    Queued,
    /// Currently executing.
    Running,
    /// Ran to completion.
    Succeeded,
    /// Source failed to compile.
    CompileError,
    /// Program crashed or exited non-zero.
    RuntimeError,
    /// Execution (or polling) exceeded its time bound.
    Timeout,
    /// The compute service failed or reported an internal error.
    ServiceError,
}

impl ExecutionStatus {
    /// Whether polling should continue.
    pub fn is_in_progress(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

/// Normalized outcome of one execution, transient per request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Normalized status.
    pub status: ExecutionStatus,
    /// Program stdout.
    pub stdout: String,
    /// Program stderr; when the service left it empty it is populated
    /// from compile output so callers have one field to inspect.
    pub stderr: String,
    /// Compiler diagnostics, when any.
    pub compile_output: String,
    /// Wall time in milliseconds, when reported.
    pub time_ms: Option<u64>,
    /// Peak memory in kilobytes, when reported.
    pub memory_kb: Option<u64>,
}

impl ExecutionResult {
    /// The fixed result returned when the polling bound is exhausted.
    pub fn poll_timeout() -> Self {
        Self {
            status: ExecutionStatus::Timeout,
            stdout: String::new(),
            stderr: "Timeout waiting for result".into(),
            compile_output: String::new(),
            time_ms: None,
            memory_kb: None,
        }
    }
}

/// Raw submission state as returned by the compute service.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawSubmission {
    /// Service status object.
    #[serde(default)]
    pub status: Option<RawStatus>,
    /// Raw stdout (possibly base64).
    #[serde(default)]
    pub stdout: Option<String>,
    /// Raw stderr (possibly base64).
    #[serde(default)]
    pub stderr: Option<String>,
    /// Raw compiler output (possibly base64).
    #[serde(default)]
    pub compile_output: Option<String>,
    /// Wall time in seconds, as a decimal string (e.g. `"0.002"`).
    #[serde(default)]
    pub time: Option<String>,
    /// Peak memory in kilobytes.
    #[serde(default)]
    pub memory: Option<u64>,
}

/// Service status object: `{ id, description }`.
#[derive(Clone, Debug, Deserialize)]
pub struct RawStatus {
    /// Human-readable status description; the normalization key.
    #[serde(default)]
    pub description: String,
}

/// Map a service status description onto [`ExecutionStatus`].
///
/// Pure function; unknown terminal descriptions map to `ServiceError` so
/// an unexpected vocabulary never leaves a job looking in-progress.
pub fn normalize_status(description: &str) -> ExecutionStatus {
    match description {
        "In Queue" => ExecutionStatus::Queued,
        "Processing" => ExecutionStatus::Running,
        "Accepted" | "Wrong Answer" => ExecutionStatus::Succeeded,
        "Compilation Error" => ExecutionStatus::CompileError,
        "Time Limit Exceeded" => ExecutionStatus::Timeout,
        d if d.starts_with("Runtime Error") => ExecutionStatus::RuntimeError,
        _ => ExecutionStatus::ServiceError,
    }
}

/// Parse the service's decimal-seconds time field into milliseconds.
pub fn parse_time_ms(time: Option<&str>) -> Option<u64> {
    let secs: f64 = time?.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some((secs * 1000.0).round() as u64)
}
