//! Job orchestration: validate → submit → poll → normalize.
//!
//! The caller sees a single future resolving to an [`ExecutionResult`];
//! the bounded polling loop against the compute service is internal.
//! `Timeout` is a normal terminal result, never an error.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, warn};

use crate::client::{ComputeError, ComputeService, SubmissionBody};
use crate::languages;
use crate::types::{
    ExecutionRequest, ExecutionResult, RawSubmission, normalize_status, parse_time_ms,
};

/// Bounds for the internal polling loop.
#[derive(Clone, Copy, Debug)]
pub struct PollConfig {
    /// Maximum status fetches before giving up with a `Timeout` result.
    pub max_attempts: u32,
    /// Delay between consecutive fetches.
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 40,
            interval: Duration::from_millis(350),
        }
    }
}

/// Failures surfaced to the caller instead of a result.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// Bad input; no network call was made.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// What was wrong with the request.
        message: String,
    },

    /// The submission call itself failed; not retried at this layer.
    #[error("compute service unavailable: {0}")]
    ServiceUnavailable(#[source] ComputeError),

    /// A poll attempt failed in transit; fatal for this submission.
    #[error("compute service error: {0}")]
    ServiceError(#[source] ComputeError),
}

/// Drives one execution request through the compute service.
pub struct JobOrchestrator {
    service: Arc<dyn ComputeService>,
    poll: PollConfig,
}

impl JobOrchestrator {
    /// Create an orchestrator over a compute service.
    pub fn new(service: Arc<dyn ComputeService>) -> Self {
        Self {
            service,
            poll: PollConfig::default(),
        }
    }

    /// Override the polling bounds (used by tests and tuning).
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Run a request to a terminal result.
    ///
    /// Validates locally, submits asynchronously, then polls until the
    /// service reports anything other than queued/running or the attempt
    /// bound is exhausted.
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecError> {
        validate(request)?;

        let encoded = request.base64_encoded;
        let (source, stdin) = if encoded {
            (
                BASE64.encode(&request.source_code),
                BASE64.encode(&request.stdin),
            )
        } else {
            (request.source_code.clone(), request.stdin.clone())
        };

        let body = SubmissionBody::new(request.language_id, source, stdin);
        let token = self
            .service
            .submit(&body, encoded)
            .await
            .map_err(ExecError::ServiceUnavailable)?;
        debug!(token, language_id = request.language_id, "job submitted, polling");

        for attempt in 1..=self.poll.max_attempts {
            let raw = self
                .service
                .fetch(&token, encoded)
                .await
                .map_err(ExecError::ServiceError)?;

            if let Some(status) = raw.status.as_ref() {
                if !normalize_status(&status.description).is_in_progress() {
                    debug!(token, attempt, status = %status.description, "job terminal");
                    return Ok(normalize_result(raw, encoded));
                }
            }

            if attempt < self.poll.max_attempts {
                tokio::time::sleep(self.poll.interval).await;
            }
        }

        warn!(token, attempts = self.poll.max_attempts, "polling bound exhausted");
        Ok(ExecutionResult::poll_timeout())
    }

    /// Fetch the latest normalized result for an already-submitted job.
    ///
    /// Single status query, no polling; an in-progress job comes back with
    /// status `Queued`/`Running` and empty outputs.
    pub async fn fetch_result(
        &self,
        token: &str,
        base64_encoded: bool,
    ) -> Result<ExecutionResult, ExecError> {
        let raw = self
            .service
            .fetch(token, base64_encoded)
            .await
            .map_err(ExecError::ServiceError)?;
        Ok(normalize_result(raw, base64_encoded))
    }
}

/// Local validation; rejects before any network call.
fn validate(request: &ExecutionRequest) -> Result<(), ExecError> {
    if !languages::is_recognized(request.language_id) {
        return Err(ExecError::InvalidRequest {
            message: format!("unrecognized language_id {}", request.language_id),
        });
    }
    if request.source_code.is_empty() {
        return Err(ExecError::InvalidRequest {
            message: "source_code must be non-empty".into(),
        });
    }
    Ok(())
}

/// Map a raw submission into the normalized result shape.
fn normalize_result(raw: RawSubmission, base64_encoded: bool) -> ExecutionResult {
    let status = normalize_status(
        raw.status
            .as_ref()
            .map_or("", |status| status.description.as_str()),
    );
    let stdout = decode_field(base64_encoded, raw.stdout);
    let stderr = decode_field(base64_encoded, raw.stderr);
    let compile_output = decode_field(base64_encoded, raw.compile_output);

    // One field to inspect on failure: fall back to compiler diagnostics.
    let stderr = if stderr.is_empty() {
        compile_output.clone()
    } else {
        stderr
    };

    ExecutionResult {
        status,
        stdout,
        stderr,
        compile_output,
        time_ms: parse_time_ms(raw.time.as_deref()),
        memory_kb: raw.memory,
    }
}

/// Decode a possibly-base64 output field, empty when absent.
fn decode_field(base64_encoded: bool, value: Option<String>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    if !base64_encoded {
        return value;
    }
    // Judge0 wraps base64 bodies across lines.
    let stripped: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    match BASE64.decode(&stripped) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(error) => {
            warn!(%error, "output field was not valid base64, passing through");
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExecutionStatus, RawStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use parking_lot::Mutex;

    /// Scripted stand-in for the compute service.
    struct StubService {
        /// Fetch responses consumed in order; last entry repeats.
        script: Vec<RawSubmission>,
        submit_count: AtomicU32,
        fetch_count: AtomicU32,
        last_body: Mutex<Option<SubmissionBody>>,
        fail_submit: bool,
        fail_fetch: bool,
    }

    impl StubService {
        fn with_script(script: Vec<RawSubmission>) -> Self {
            Self {
                script,
                submit_count: AtomicU32::new(0),
                fetch_count: AtomicU32::new(0),
                last_body: Mutex::new(None),
                fail_submit: false,
                fail_fetch: false,
            }
        }

        fn fetches(&self) -> u32 {
            self.fetch_count.load(Ordering::Relaxed)
        }
    }

    fn raw(description: &str) -> RawSubmission {
        RawSubmission {
            status: Some(RawStatus {
                description: description.into(),
            }),
            ..RawSubmission::default()
        }
    }

    fn transport_error() -> ComputeError {
        ComputeError::Api {
            status: 500,
            message: "stub failure".into(),
        }
    }

    #[async_trait]
    impl ComputeService for StubService {
        async fn submit(
            &self,
            body: &SubmissionBody,
            _base64_encoded: bool,
        ) -> Result<String, ComputeError> {
            let _ = self.submit_count.fetch_add(1, Ordering::Relaxed);
            if self.fail_submit {
                return Err(transport_error());
            }
            *self.last_body.lock() = Some(body.clone());
            Ok("tok-stub".into())
        }

        async fn fetch(
            &self,
            _token: &str,
            _base64_encoded: bool,
        ) -> Result<RawSubmission, ComputeError> {
            let n = self.fetch_count.fetch_add(1, Ordering::Relaxed) as usize;
            if self.fail_fetch {
                return Err(transport_error());
            }
            let index = n.min(self.script.len() - 1);
            Ok(self.script[index].clone())
        }
    }

    fn orchestrator(stub: Arc<StubService>) -> JobOrchestrator {
        JobOrchestrator::new(stub).with_poll_config(PollConfig {
            max_attempts: 40,
            interval: Duration::ZERO,
        })
    }

    fn request(source: &str) -> ExecutionRequest {
        ExecutionRequest {
            language_id: 71,
            source_code: source.into(),
            stdin: String::new(),
            base64_encoded: false,
        }
    }

    #[tokio::test]
    async fn unrecognized_language_fails_without_network() {
        let stub = Arc::new(StubService::with_script(vec![raw("Accepted")]));
        let orch = orchestrator(stub.clone());

        let bad = ExecutionRequest {
            language_id: 9999,
            ..request("print(1)")
        };
        let err = orch.execute(&bad).await.unwrap_err();
        assert!(matches!(err, ExecError::InvalidRequest { .. }));
        assert_eq!(stub.submit_count.load(Ordering::Relaxed), 0);
        assert_eq!(stub.fetches(), 0);
    }

    #[tokio::test]
    async fn empty_source_fails_without_network() {
        let stub = Arc::new(StubService::with_script(vec![raw("Accepted")]));
        let orch = orchestrator(stub.clone());

        let err = orch.execute(&request("")).await.unwrap_err();
        assert!(matches!(err, ExecError::InvalidRequest { .. }));
        assert_eq!(stub.submit_count.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn processing_then_accepted_resolves_within_six_polls() {
        let mut script = vec![raw("Processing"); 5];
        script.push(raw("Accepted"));
        let stub = Arc::new(StubService::with_script(script));
        let orch = orchestrator(stub.clone());

        let result = orch.execute(&request("print(1)")).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Succeeded);
        assert!(stub.fetches() <= 6, "took {} polls", stub.fetches());
    }

    #[tokio::test]
    async fn never_terminal_times_out_after_exactly_forty_attempts() {
        let stub = Arc::new(StubService::with_script(vec![raw("Processing")]));
        let orch = orchestrator(stub.clone());

        let result = orch.execute(&request("while True: pass")).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert_eq!(result.stderr, "Timeout waiting for result");
        assert_eq!(stub.fetches(), 40);
    }

    #[tokio::test]
    async fn missing_status_keeps_polling() {
        let script = vec![RawSubmission::default(), raw("Accepted")];
        let stub = Arc::new(StubService::with_script(script));
        let orch = orchestrator(stub.clone());

        let result = orch.execute(&request("print(1)")).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Succeeded);
        assert_eq!(stub.fetches(), 2);
    }

    #[tokio::test]
    async fn submit_failure_is_service_unavailable() {
        let mut stub = StubService::with_script(vec![raw("Accepted")]);
        stub.fail_submit = true;
        let orch = orchestrator(Arc::new(stub));

        let err = orch.execute(&request("print(1)")).await.unwrap_err();
        assert!(matches!(err, ExecError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn poll_transport_failure_is_service_error() {
        let mut stub = StubService::with_script(vec![raw("Processing")]);
        stub.fail_fetch = true;
        let stub = Arc::new(stub);
        let orch = orchestrator(stub.clone());

        let err = orch.execute(&request("print(1)")).await.unwrap_err();
        assert!(matches!(err, ExecError::ServiceError(_)));
        // Fatal on the first failed attempt, no silent retries.
        assert_eq!(stub.fetches(), 1);
    }

    #[tokio::test]
    async fn base64_round_trip() {
        let echoed = RawSubmission {
            status: Some(RawStatus {
                description: "Accepted".into(),
            }),
            stdout: Some(BASE64.encode("1\n")),
            stderr: None,
            compile_output: None,
            time: Some("0.01".into()),
            memory: Some(3000),
        };
        let stub = Arc::new(StubService::with_script(vec![echoed]));
        let orch = orchestrator(stub.clone());

        let req = ExecutionRequest {
            base64_encoded: true,
            ..request("print(1)")
        };
        let result = orch.execute(&req).await.unwrap();

        // Submitted fields were encoded in transit...
        let body = stub.last_body.lock().clone().unwrap();
        assert_eq!(body.source_code, BASE64.encode("print(1)"));
        assert_eq!(body.stdin, BASE64.encode(""));
        assert_eq!(
            BASE64.decode(&body.source_code).unwrap(),
            b"print(1)".to_vec()
        );

        // ...and outputs decoded on the way out.
        assert_eq!(result.stdout, "1\n");
        assert_eq!(result.status, ExecutionStatus::Succeeded);
    }

    #[tokio::test]
    async fn stderr_falls_back_to_compile_output() {
        let compile_failed = RawSubmission {
            status: Some(RawStatus {
                description: "Compilation Error".into(),
            }),
            compile_output: Some("main.c:1: error: expected ';'".into()),
            ..RawSubmission::default()
        };
        let stub = Arc::new(StubService::with_script(vec![compile_failed]));
        let orch = orchestrator(stub);

        let result = orch.execute(&request("int main( {}")).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::CompileError);
        assert_eq!(result.stderr, "main.c:1: error: expected ';'");
        assert_eq!(result.compile_output, "main.c:1: error: expected ';'");
    }

    #[tokio::test]
    async fn explicit_stderr_wins_over_compile_output() {
        let failed = RawSubmission {
            status: Some(RawStatus {
                description: "Runtime Error (NZEC)".into(),
            }),
            stderr: Some("Traceback...".into()),
            compile_output: Some("unused".into()),
            ..RawSubmission::default()
        };
        let stub = Arc::new(StubService::with_script(vec![failed]));
        let orch = orchestrator(stub);

        let result = orch.execute(&request("raise")).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        assert_eq!(result.stderr, "Traceback...");
    }

    #[tokio::test]
    async fn time_and_memory_mapped() {
        let done = RawSubmission {
            status: Some(RawStatus {
                description: "Accepted".into(),
            }),
            stdout: Some("ok".into()),
            time: Some("0.25".into()),
            memory: Some(4096),
            ..RawSubmission::default()
        };
        let stub = Arc::new(StubService::with_script(vec![done]));
        let orch = orchestrator(stub);

        let result = orch.execute(&request("print('ok')")).await.unwrap();
        assert_eq!(result.time_ms, Some(250));
        assert_eq!(result.memory_kb, Some(4096));
    }

    #[tokio::test]
    async fn fetch_result_for_in_progress_job() {
        let stub = Arc::new(StubService::with_script(vec![raw("In Queue")]));
        let orch = orchestrator(stub.clone());

        let result = orch.fetch_result("tok-x", false).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Queued);
        assert_eq!(stub.fetches(), 1);
    }

    #[tokio::test]
    async fn fetch_result_transport_failure() {
        let mut stub = StubService::with_script(vec![raw("Accepted")]);
        stub.fail_fetch = true;
        let orch = orchestrator(Arc::new(stub));

        let err = orch.fetch_result("tok-x", false).await.unwrap_err();
        assert!(matches!(err, ExecError::ServiceError(_)));
    }

    #[test]
    fn default_poll_config_matches_bounds() {
        let poll = PollConfig::default();
        assert_eq!(poll.max_attempts, 40);
        assert_eq!(poll.interval, Duration::from_millis(350));
    }

    #[test]
    fn decode_field_plain_passthrough() {
        assert_eq!(decode_field(false, Some("hello".into())), "hello");
        assert_eq!(decode_field(false, None), "");
    }

    #[test]
    fn decode_field_handles_wrapped_base64() {
        let wrapped = format!("{}\n", BASE64.encode("line"));
        assert_eq!(decode_field(true, Some(wrapped)), "line");
    }

    #[test]
    fn decode_field_invalid_base64_passes_through() {
        assert_eq!(decode_field(true, Some("%%%".into())), "%%%");
    }
}
