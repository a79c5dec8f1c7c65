//! Client for the AWS Lambda Runtime API.
//!
//! The runtime hands out one invocation at a time from
//! `GET /runtime/invocation/next` and expects exactly one response or error
//! report per request id before the next poll.

use forwarder::Timestamp;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Runtime API version path segment.
pub const RUNTIME_API_VERSION: &str = "2018-06-01";

const REQUEST_ID_HEADER: &str = "Lambda-Runtime-Aws-Request-Id";
const DEADLINE_HEADER: &str = "Lambda-Runtime-Deadline-Ms";
const FUNCTION_ARN_HEADER: &str = "Lambda-Runtime-Invoked-Function-Arn";

/// Failures talking to the runtime itself (as opposed to failed invocations).
#[derive(Debug, Error)]
pub enum RuntimeApiError {
    #[error("runtime API request to {path} failed: {message}")]
    Transport { path: String, message: String },

    #[error("runtime API answered {status} on {path}")]
    UnexpectedStatus { path: String, status: u16 },

    #[error("invocation is missing header {0}")]
    MissingHeader(&'static str),

    #[error("invocation header {name} has invalid value '{value}'")]
    InvalidHeader { name: &'static str, value: String },

    #[error("AWS_LAMBDA_RUNTIME_API is not set")]
    NotConfigured,
}

/// One invocation handed out by the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub request_id: String,
    /// Wall-clock time after which the runtime freezes or kills the process.
    pub deadline: Timestamp,
    pub function_arn: Option<String>,
    /// The event as delivered; decoding is the handler's job.
    pub payload: serde_json::Value,
}

/// Body of an error report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    #[serde(rename = "errorMessage")]
    pub message: String,
    #[serde(rename = "errorType")]
    pub kind: String,
}

/// HTTP client bound to one runtime API endpoint.
#[derive(Debug, Clone)]
pub struct LambdaRuntimeClient {
    http: reqwest::Client,
    base: String,
}

impl LambdaRuntimeClient {
    /// Creates a client for `runtime_api` (`host:port`, or a full `http://` URL).
    pub fn new(runtime_api: &str) -> Self {
        let origin = if runtime_api.starts_with("http://") || runtime_api.starts_with("https://") {
            runtime_api.trim_end_matches('/').to_owned()
        } else {
            format!("http://{runtime_api}")
        };
        Self {
            // Polling `next` blocks until an event arrives, so no client timeout.
            http: reqwest::Client::new(),
            base: format!("{origin}/{RUNTIME_API_VERSION}"),
        }
    }

    /// Creates a client from `AWS_LAMBDA_RUNTIME_API`.
    pub fn from_env() -> Result<Self, RuntimeApiError> {
        let api = std::env::var("AWS_LAMBDA_RUNTIME_API")
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or(RuntimeApiError::NotConfigured)?;
        Ok(Self::new(&api))
    }

    /// Blocks until the runtime hands out the next invocation.
    pub async fn next_invocation(&self) -> Result<Invocation, RuntimeApiError> {
        let path = "/runtime/invocation/next";
        let response = self
            .http
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .map_err(|e| transport(path, e))?;
        if !response.status().is_success() {
            return Err(RuntimeApiError::UnexpectedStatus {
                path: path.into(),
                status: response.status().as_u16(),
            });
        }

        let headers = response.headers();
        let request_id = header(headers, REQUEST_ID_HEADER)?
            .ok_or(RuntimeApiError::MissingHeader(REQUEST_ID_HEADER))?;
        let deadline_raw = header(headers, DEADLINE_HEADER)?
            .ok_or(RuntimeApiError::MissingHeader(DEADLINE_HEADER))?;
        let deadline = deadline_raw
            .parse::<i64>()
            .ok()
            .and_then(Timestamp::from_epoch_millis)
            .ok_or_else(|| RuntimeApiError::InvalidHeader {
                name: DEADLINE_HEADER,
                value: deadline_raw.clone(),
            })?;
        let function_arn = header(headers, FUNCTION_ARN_HEADER)?;

        let body = response.bytes().await.map_err(|e| transport(path, e))?;
        // An undecodable body is still an invocation; the handler reports it
        // as an invalid trigger event.
        let payload = serde_json::from_slice(&body)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&body).into_owned()));

        debug!(request_id = %request_id, %deadline, "Received invocation");
        Ok(Invocation {
            request_id,
            deadline,
            function_arn,
            payload,
        })
    }

    /// Reports a successful invocation with a JSON response body.
    pub async fn report_success(
        &self,
        request_id: &str,
        body: &serde_json::Value,
    ) -> Result<(), RuntimeApiError> {
        let path = format!("/runtime/invocation/{request_id}/response");
        self.post(&path, body).await
    }

    /// Reports a failed invocation.
    pub async fn report_error(&self, request_id: &str, report: &ErrorReport) -> Result<(), RuntimeApiError> {
        let path = format!("/runtime/invocation/{request_id}/error");
        self.post(&path, report).await
    }

    /// Reports that the function could not initialise; the runtime then
    /// discards this execution environment.
    pub async fn report_init_error(&self, report: &ErrorReport) -> Result<(), RuntimeApiError> {
        self.post("/runtime/init/error", report).await
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), RuntimeApiError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base))
            .json(body)
            .send()
            .await
            .map_err(|e| transport(path, e))?;
        if !response.status().is_success() {
            return Err(RuntimeApiError::UnexpectedStatus {
                path: path.to_owned(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

fn header(
    headers: &reqwest::header::HeaderMap,
    name: &'static str,
) -> Result<Option<String>, RuntimeApiError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map(str::to_owned)
                .map_err(|_| RuntimeApiError::InvalidHeader {
                    name,
                    value: String::from_utf8_lossy(v.as_bytes()).into_owned(),
                })
        })
        .transpose()
}

fn transport(path: &str, e: reqwest::Error) -> RuntimeApiError {
    RuntimeApiError::Transport {
        path: path.to_owned(),
        message: e.to_string(),
    }
}
