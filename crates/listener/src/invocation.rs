//! Deadline-bounded invocation handling.

use std::sync::Arc;
use std::time::Duration;

use forwarder::{
    ForwardError, ForwardOutcome, Forwarder, RetryPolicy, SourceName, Timestamp, TriggerPayload,
};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::runtime::{ErrorReport, LambdaRuntimeClient, RuntimeApiError};

/// Why an invocation did not succeed.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error(transparent)]
    Forward(#[from] ForwardError),

    /// The handler was still running when the runtime deadline passed.
    #[error("Invocation did not finish before its deadline {deadline}")]
    DeadlineExceeded { deadline: Timestamp },
}

impl InvocationError {
    /// The `errorType` reported to the runtime.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Forward(e) => e.kind(),
            Self::DeadlineExceeded { .. } => "DeadlineExceeded",
        }
    }

    /// Whether redelivering the trigger could change the outcome.
    ///
    /// An abandoned invocation may already have written its dedup record, so
    /// a redelivery is not assumed to be evaluated afresh.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Forward(e) => e.retry_policy(),
            Self::DeadlineExceeded { .. } => RetryPolicy::NonRetryable,
        }
    }

    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            message: self.to_string(),
            kind: self.kind().to_owned(),
        }
    }
}

/// Time held back from the runtime deadline so the error report is posted
/// before the runtime freezes the process.
pub const REPORT_MARGIN: Duration = Duration::from_millis(200);

/// Decodes `payload` and runs it through `forwarder`, abandoning the work
/// [`REPORT_MARGIN`] before `deadline`.
///
/// With no deadline the forward runs to completion.
pub async fn handle_invocation(
    forwarder: &Forwarder,
    source: SourceName,
    payload: serde_json::Value,
    deadline: Option<Timestamp>,
) -> Result<ForwardOutcome, InvocationError> {
    let payload = TriggerPayload::from_json(payload)?;
    let work = forwarder.handle(payload, source);

    let Some(deadline) = deadline else {
        return Ok(work.await?);
    };
    let Some(budget) = deadline
        .remaining_from(Timestamp::now())
        .and_then(|left| left.checked_sub(REPORT_MARGIN))
        .filter(|budget| !budget.is_zero())
    else {
        return Err(InvocationError::DeadlineExceeded { deadline });
    };
    match tokio::time::timeout(budget, work).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(InvocationError::DeadlineExceeded { deadline }),
    }
}

/// What happened to one invocation pulled from the runtime.
#[derive(Debug)]
pub struct InvocationReport {
    pub request_id: String,
    pub result: Result<ForwardOutcome, InvocationError>,
}

/// Pulls invocations from the runtime one at a time and reports each result.
pub struct InvocationLoop {
    client: LambdaRuntimeClient,
    forwarder: Arc<Forwarder>,
    source: SourceName,
}

impl InvocationLoop {
    pub fn new(client: LambdaRuntimeClient, forwarder: Arc<Forwarder>, source: SourceName) -> Self {
        Self {
            client,
            forwarder,
            source,
        }
    }

    /// Handles exactly one invocation.
    ///
    /// Invocation failures are reported to the runtime and returned in the
    /// [`InvocationReport`]; only a failure to talk to the runtime is an `Err`.
    #[instrument(skip_all, fields(request_id))]
    pub async fn process_next(&self) -> Result<InvocationReport, RuntimeApiError> {
        let invocation = self.client.next_invocation().await?;
        tracing::Span::current().record("request_id", invocation.request_id.as_str());

        let result = handle_invocation(
            &self.forwarder,
            self.source.clone(),
            invocation.payload,
            Some(invocation.deadline),
        )
        .await;

        match &result {
            Ok(outcome) => {
                let body = serde_json::to_value(outcome).unwrap_or(serde_json::Value::Null);
                self.client
                    .report_success(&invocation.request_id, &body)
                    .await?;
                info!(?outcome, "Invocation succeeded");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    kind = e.kind(),
                    retry = ?e.retry_policy(),
                    "Invocation failed"
                );
                self.client
                    .report_error(&invocation.request_id, &e.to_report())
                    .await?;
            }
        }

        Ok(InvocationReport {
            request_id: invocation.request_id,
            result,
        })
    }

    /// Serves invocations until the runtime becomes unreachable.
    pub async fn run(&self) -> Result<(), RuntimeApiError> {
        info!(source = %self.source, "Waiting for invocations");
        loop {
            if let Err(e) = self.process_next().await {
                error!(error = %e, "Runtime API failure");
                return Err(e);
            }
        }
    }
}
