//! Compute-service transport: the [`ComputeService`] trait and the
//! Judge0-compatible reqwest implementation.
//!
//! The trait covers exactly the two calls the orchestrator needs — submit
//! a job asynchronously and fetch its current state by token — so tests
//! can stand in a stub without any HTTP.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::RawSubmission;

/// CPU time limit forwarded with every submission, in seconds.
const CPU_TIME_LIMIT_SECS: u32 = 5;

/// Wall time limit forwarded with every submission, in seconds.
const WALL_TIME_LIMIT_SECS: u32 = 10;

/// Default RapidAPI host header when a credential is configured.
const DEFAULT_API_HOST: &str = "judge0-ce.p.rapidapi.com";

/// Transport-level failure talking to the compute service.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    /// HTTP request failed (connect, timeout, body).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Service answered with a non-success status.
    #[error("compute service returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        message: String,
    },
}

/// Wire body for a submission. Fields are pre-encoded by the caller when
/// base64 transport is requested.
#[derive(Clone, Debug, Serialize)]
pub struct SubmissionBody {
    /// Compute-service language id.
    pub language_id: u32,
    /// Source code, possibly base64.
    pub source_code: String,
    /// Standard input, possibly base64.
    pub stdin: String,
    /// CPU limit in seconds.
    pub cpu_time_limit: u32,
    /// Wall-clock limit in seconds.
    pub wall_time_limit: u32,
}

impl SubmissionBody {
    /// Build a body with the gateway's fixed execution limits.
    pub fn new(language_id: u32, source_code: String, stdin: String) -> Self {
        Self {
            language_id,
            source_code,
            stdin,
            cpu_time_limit: CPU_TIME_LIMIT_SECS,
            wall_time_limit: WALL_TIME_LIMIT_SECS,
        }
    }
}

/// `{ token }` returned by an asynchronous submission.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Asynchronous compute-service API at the boundary the orchestrator needs.
#[async_trait]
pub trait ComputeService: Send + Sync {
    /// Submit a job for asynchronous execution, returning its token.
    async fn submit(
        &self,
        body: &SubmissionBody,
        base64_encoded: bool,
    ) -> Result<String, ComputeError>;

    /// Fetch the current state of a previously submitted job.
    async fn fetch(&self, token: &str, base64_encoded: bool)
        -> Result<RawSubmission, ComputeError>;
}

/// Judge0-compatible HTTP client.
pub struct Judge0Client {
    base_url: String,
    headers: HeaderMap,
    client: reqwest::Client,
}

impl Judge0Client {
    /// Create a client for the service at `base_url`.
    ///
    /// When `api_key` is set the RapidAPI key/host headers are attached to
    /// every request; self-hosted deployments pass `None`.
    pub fn new(base_url: impl Into<String>, api_key: Option<&str>) -> Self {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            if let Ok(value) = HeaderValue::from_str(key) {
                let _ = headers.insert("x-rapidapi-key", value);
                let _ = headers.insert(
                    "x-rapidapi-host",
                    HeaderValue::from_static(DEFAULT_API_HOST),
                );
            }
        }
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            headers,
            client: reqwest::Client::new(),
        }
    }

    /// Probe the service's `/about` endpoint.
    ///
    /// Used at startup so a misconfigured compute URL fails fast instead
    /// of surfacing on the first execution request.
    pub async fn check_reachable(&self) -> Result<(), ComputeError> {
        let url = format!("{}/about", self.base_url);
        let response = self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .send()
            .await?;
        let _ = Self::check(response).await?;
        Ok(())
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ComputeError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        let truncated: String = message.chars().take(500).collect();
        Err(ComputeError::Api {
            status: status.as_u16(),
            message: truncated,
        })
    }
}

#[async_trait]
impl ComputeService for Judge0Client {
    async fn submit(
        &self,
        body: &SubmissionBody,
        base64_encoded: bool,
    ) -> Result<String, ComputeError> {
        let url = format!(
            "{}/submissions?base64_encoded={base64_encoded}&wait=false",
            self.base_url
        );
        let response = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await?;
        let token: TokenResponse = Self::check(response).await?.json().await?;
        debug!(token = %token.token, language_id = body.language_id, "submission accepted");
        Ok(token.token)
    }

    async fn fetch(
        &self,
        token: &str,
        base64_encoded: bool,
    ) -> Result<RawSubmission, ComputeError> {
        let url = format!(
            "{}/submissions/{token}?base64_encoded={base64_encoded}",
            self.base_url
        );
        let response = self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .send()
            .await?;
        let raw: RawSubmission = Self::check(response).await?.json().await?;
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn body(source: &str) -> SubmissionBody {
        SubmissionBody::new(71, source.into(), String::new())
    }

    #[tokio::test]
    async fn submit_returns_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submissions"))
            .and(query_param("base64_encoded", "false"))
            .and(query_param("wait", "false"))
            .and(body_partial_json(serde_json::json!({
                "language_id": 71,
                "source_code": "print(1)",
                "cpu_time_limit": 5,
                "wall_time_limit": 10,
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"token": "tok-abc"})),
            )
            .mount(&server)
            .await;

        let client = Judge0Client::new(server.uri(), None);
        let token = client.submit(&body("print(1)"), false).await.unwrap();
        assert_eq!(token, "tok-abc");
    }

    #[tokio::test]
    async fn submit_sends_api_key_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submissions"))
            .and(header("x-rapidapi-key", "secret"))
            .and(header("x-rapidapi-host", DEFAULT_API_HOST))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"token": "tok"})),
            )
            .mount(&server)
            .await;

        let client = Judge0Client::new(server.uri(), Some("secret"));
        let token = client.submit(&body("x"), false).await.unwrap();
        assert_eq!(token, "tok");
    }

    #[tokio::test]
    async fn submit_error_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = Judge0Client::new(server.uri(), None);
        let err = client.submit(&body("x"), false).await.unwrap_err();
        match err {
            ComputeError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn submit_unreachable_is_http_error() {
        // Nothing listening on this port.
        let client = Judge0Client::new("http://127.0.0.1:1", None);
        let err = client.submit(&body("x"), false).await.unwrap_err();
        assert!(matches!(err, ComputeError::Http(_)));
    }

    #[tokio::test]
    async fn fetch_parses_submission() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/submissions/tok-1"))
            .and(query_param("base64_encoded", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": {"id": 3, "description": "Accepted"},
                "stdout": "1\n",
                "time": "0.004",
                "memory": 3100,
            })))
            .mount(&server)
            .await;

        let client = Judge0Client::new(server.uri(), None);
        let raw = client.fetch("tok-1", false).await.unwrap();
        assert_eq!(raw.status.unwrap().description, "Accepted");
        assert_eq!(raw.stdout.as_deref(), Some("1\n"));
        assert_eq!(raw.memory, Some(3100));
    }

    #[tokio::test]
    async fn fetch_threads_base64_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/submissions/tok-2"))
            .and(query_param("base64_encoded", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = Judge0Client::new(server.uri(), None);
        let raw = client.fetch("tok-2", true).await.unwrap();
        assert!(raw.status.is_none());
    }

    #[tokio::test]
    async fn check_reachable_hits_about() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "version": "1.13.0"
            })))
            .mount(&server)
            .await;

        let client = Judge0Client::new(server.uri(), None);
        client.check_reachable().await.unwrap();
    }

    #[tokio::test]
    async fn check_reachable_fails_on_unreachable_host() {
        let client = Judge0Client::new("http://127.0.0.1:1", None);
        assert!(matches!(
            client.check_reachable().await,
            Err(ComputeError::Http(_))
        ));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = Judge0Client::new("http://example.com/", None);
        assert_eq!(client.base_url, "http://example.com");
    }
}
