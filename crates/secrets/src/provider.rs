//! Credential providers.

use async_trait::async_trait;
use chrono::Utc;
use forwarder::{Credential, CredentialError, CredentialProvider, SecretRef};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::sigv4::{self, SignableRequest, SigningParams};

const SERVICE: &str = "secretsmanager";
const TARGET: &str = "secretsmanager.GetSecretValue";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

// ---------------------------------------------------------------------------
// AWS credentials
// ---------------------------------------------------------------------------

/// Signing credentials, normally injected by the function runtime.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    /// Reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, and the optional
    /// `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Result<Self, CredentialError> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let access_key_id = var("AWS_ACCESS_KEY_ID")
            .ok_or_else(|| CredentialError::Configuration("AWS_ACCESS_KEY_ID is not set".into()))?;
        let secret_access_key = var("AWS_SECRET_ACCESS_KEY").ok_or_else(|| {
            CredentialError::Configuration("AWS_SECRET_ACCESS_KEY is not set".into())
        })?;
        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token: var("AWS_SESSION_TOKEN"),
        })
    }
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Secrets Manager
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct GetSecretValueResponse {
    #[serde(rename = "SecretString")]
    secret_string: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(rename = "__type")]
    kind: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

/// Fetches `{"secret": ...}` documents from AWS Secrets Manager.
#[derive(Debug, Clone)]
pub struct SecretsManagerProvider {
    http: reqwest::Client,
    endpoint: reqwest::Url,
    host: String,
    region: String,
    credentials: AwsCredentials,
}

impl SecretsManagerProvider {
    /// Creates a provider for the regional public endpoint.
    pub fn new(region: impl Into<String>, credentials: AwsCredentials) -> Result<Self, CredentialError> {
        let region = region.into();
        let endpoint = format!("https://{SERVICE}.{region}.amazonaws.com/");
        Self::with_endpoint(region, credentials, &endpoint)
    }

    /// Creates a provider for an explicit endpoint (VPC endpoint, test server).
    pub fn with_endpoint(
        region: impl Into<String>,
        credentials: AwsCredentials,
        endpoint: &str,
    ) -> Result<Self, CredentialError> {
        let endpoint = reqwest::Url::parse(endpoint)
            .map_err(|e| CredentialError::Configuration(format!("invalid endpoint '{endpoint}': {e}")))?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_owned(),
            (None, _) => {
                return Err(CredentialError::Configuration(format!(
                    "endpoint '{endpoint}' has no host"
                )))
            }
        };
        let http = reqwest::Client::builder()
            .user_agent(concat!("cron-forwarder/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CredentialError::Configuration(e.to_string()))?;
        Ok(Self {
            http,
            endpoint,
            host,
            region: region.into(),
            credentials,
        })
    }
}

#[async_trait]
impl CredentialProvider for SecretsManagerProvider {
    #[instrument(skip_all, fields(secret_ref = %secret_ref))]
    async fn fetch(&self, secret_ref: &SecretRef) -> Result<Credential, CredentialError> {
        let body = serde_json::json!({ "SecretId": secret_ref.as_str() }).to_string();
        let params = SigningParams {
            access_key_id: &self.credentials.access_key_id,
            secret_access_key: &self.credentials.secret_access_key,
            region: &self.region,
            service: SERVICE,
            time: Utc::now(),
        };
        let amz_date = params.amz_date();

        let mut headers: Vec<(&str, &str)> = vec![
            ("content-type", CONTENT_TYPE),
            ("host", self.host.as_str()),
            ("x-amz-date", amz_date.as_str()),
            ("x-amz-target", TARGET),
        ];
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token", token.as_str()));
        }
        let authorization = sigv4::authorization(
            &SignableRequest {
                method: "POST",
                path: self.endpoint.path(),
                query: "",
                headers: &headers,
                payload: body.as_bytes(),
            },
            &params,
        )?;

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header("authorization", authorization)
            .body(body);
        for (name, value) in headers.iter().filter(|(name, _)| *name != "host") {
            request = request.header(*name, *value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CredentialError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CredentialError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .ok()
                .and_then(|e| match (e.kind, e.message) {
                    (Some(kind), Some(msg)) => Some(format!("{kind}: {msg}")),
                    (kind, msg) => kind.or(msg),
                })
                .unwrap_or(text);
            return Err(CredentialError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let secret = serde_json::from_str::<GetSecretValueResponse>(&text)
            .map_err(|e| CredentialError::Malformed(format!("unexpected response: {e}")))?
            .secret_string
            .ok_or_else(|| CredentialError::Malformed("secret has no SecretString".into()))?;
        debug!("Secret fetched");
        Credential::from_secret_json(&secret)
            .map_err(|e| CredentialError::Malformed(format!("secret is not a {{\"secret\": ...}} document: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Static
// ---------------------------------------------------------------------------

/// Returns the same token for every reference. For local runs only.
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credential: Credential,
}

impl StaticCredentialProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            credential: Credential::new(token),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn fetch(&self, _secret_ref: &SecretRef) -> Result<Credential, CredentialError> {
        Ok(self.credential.clone())
    }
}
