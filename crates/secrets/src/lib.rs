//! Credential provider adapters.
//!
//! Implements the [`forwarder::CredentialProvider`] trait. The deployed
//! forwarder reads its shared webhook secret from AWS Secrets Manager through
//! [`SecretsManagerProvider`]; [`StaticCredentialProvider`] serves local runs.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Request signing, HTTP transport, and response parsing
//! live here. The [`forwarder`] crate sees only [`forwarder::CredentialProvider`].

pub mod provider;
pub mod sigv4;

pub use provider::{AwsCredentials, SecretsManagerProvider, StaticCredentialProvider};
