//! Outbound webhook transport.
//!
//! Implements the [`forwarder::WebhookClient`] trait with `reqwest`. The
//! forwarder decides what a status code means; this crate only delivers the
//! request and reports the status back.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP client construction, header names, and transport
//! error mapping live here. The [`forwarder`] crate sees only
//! [`forwarder::WebhookClient`].

use std::time::Duration;

use async_trait::async_trait;
use forwarder::{Credential, Endpoint, WebhookClient, WebhookError};
use tracing::debug;

/// Header carrying the shared secret.
pub const AUTH_HEADER: &str = "X-Cron-Auth";

/// Posts webhooks over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpWebhookClient {
    http: reqwest::Client,
}

impl HttpWebhookClient {
    /// Creates a client. With `timeout` set to `None` a request runs until the
    /// caller abandons it.
    pub fn new(timeout: Option<Duration>) -> Result<Self, WebhookError> {
        let mut builder =
            reqwest::Client::builder().user_agent(concat!("cron-forwarder/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|e| WebhookError {
            message: format!("failed to build HTTP client: {e}"),
        })?;
        Ok(Self { http })
    }
}

#[async_trait]
impl WebhookClient for HttpWebhookClient {
    async fn post(&self, endpoint: &Endpoint, credential: &Credential) -> Result<u16, WebhookError> {
        let response = self
            .http
            .post(endpoint.as_url().clone())
            .header(AUTH_HEADER, credential.token())
            .send()
            .await
            .map_err(|e| WebhookError {
                message: e.to_string(),
            })?;
        let status = response.status().as_u16();
        debug!(status, endpoint = %endpoint, "Webhook answered");
        Ok(status)
    }
}
