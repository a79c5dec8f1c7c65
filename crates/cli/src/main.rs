//! `cron-forwarder` entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration** from flags and the environment ([`config`]).
//! 2. **Wire observability**: `tracing-subscriber` with a JSON or text layer,
//!    plus an OpenTelemetry OTLP exporter when one is configured ([`telemetry`]).
//! 3. **Construct infrastructure**: the memcached store, the credential
//!    provider, and the webhook client, injected into a [`Forwarder`].
//! 4. **Select the trigger mode**:
//!    - `serve` runs the Lambda Runtime API loop.
//!    - `invoke` forwards one event from a file or stdin.
//!    - `schedule` prints rule definitions and touches no infrastructure.

mod config;
mod telemetry;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use forwarder::{CredentialProvider, DedupStore, Forwarder, ScheduleItem};
use listener::{handle_invocation, ErrorReport, InvocationLoop, LambdaRuntimeClient};
use memcache::MemcachedStore;
use secrets::{AwsCredentials, SecretsManagerProvider, StaticCredentialProvider};
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use webhook::HttpWebhookClient;

use crate::config::{Cli, Command, CredentialSource, ForwarderArgs, ForwarderConfig, StoreSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _telemetry = telemetry::init(cli.log_format)?;

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Invoke { event, forwarder } => invoke(&event, forwarder).await,
        Command::Schedule {
            items,
            prefix,
            secret_ref,
        } => schedule(&items, &prefix, &secret_ref).await,
    }
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

async fn build_forwarder(config: &ForwarderConfig) -> anyhow::Result<Forwarder> {
    let store: Arc<dyn DedupStore> = match &config.store {
        StoreSource::Discover(endpoint) => {
            let store = MemcachedStore::discover(endpoint, config.cache.clone())
                .await
                .with_context(|| format!("cache discovery via {endpoint} failed"))?;
            info!(nodes = ?store.nodes(), "Discovered cache nodes");
            Arc::new(store)
        }
        StoreSource::Static(nodes) => Arc::new(MemcachedStore::new(nodes.clone(), config.cache.clone())?),
    };

    let credentials: Arc<dyn CredentialProvider> = match &config.credentials {
        CredentialSource::SecretsManager { region, endpoint } => {
            let aws = AwsCredentials::from_env()?;
            let provider = match endpoint {
                Some(endpoint) => SecretsManagerProvider::with_endpoint(region.clone(), aws, endpoint)?,
                None => SecretsManagerProvider::new(region.clone(), aws)?,
            };
            Arc::new(provider)
        }
        CredentialSource::Static(token) => Arc::new(StaticCredentialProvider::new(token.clone())),
    };

    let webhook = Arc::new(HttpWebhookClient::new(config.webhook_timeout)?);

    let mut forwarder = Forwarder::new(store, credentials, webhook).with_strategy(config.strategy);
    if let Some(prefix) = &config.key_prefix {
        forwarder = forwarder.with_key_prefix(prefix.clone());
    }
    Ok(forwarder)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn serve(args: ForwarderArgs) -> anyhow::Result<()> {
    let client = LambdaRuntimeClient::from_env()?;

    let setup = async {
        let config = args.validate()?;
        let forwarder = build_forwarder(&config).await?;
        anyhow::Ok((config, forwarder))
    };
    let (config, forwarder) = match setup.await {
        Ok(ready) => ready,
        Err(e) => {
            error!(error = %e, "Initialisation failed");
            let report = ErrorReport {
                message: format!("{e:#}"),
                kind: "InitializationError".into(),
            };
            if let Err(report_err) = client.report_init_error(&report).await {
                error!(error = %report_err, "Could not report initialisation failure");
            }
            return Err(e);
        }
    };

    info!(
        source = %config.source,
        strategy = ?forwarder.strategy(),
        "Forwarder ready"
    );
    InvocationLoop::new(client, Arc::new(forwarder), config.source)
        .run()
        .await?;
    Ok(())
}

async fn invoke(event: &Path, args: ForwarderArgs) -> anyhow::Result<()> {
    let raw = if event == Path::new("-") {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("failed to read event from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(event)
            .await
            .with_context(|| format!("failed to read event from {}", event.display()))?
    };
    let payload: serde_json::Value = serde_json::from_str(&raw).context("event is not valid JSON")?;

    let config = args.validate()?;
    let forwarder = build_forwarder(&config).await?;
    let outcome = handle_invocation(&forwarder, config.source, payload, None)
        .await
        .map_err(|e| anyhow::anyhow!("{}: {e}", e.kind()))?;

    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}

async fn schedule(items: &Path, prefix: &str, secret_ref: &str) -> anyhow::Result<()> {
    let secret_ref = config::parse_secret_ref(secret_ref)?;
    let raw = tokio::fs::read_to_string(items)
        .await
        .with_context(|| format!("failed to read schedule items from {}", items.display()))?;
    let items: Vec<ScheduleItem> =
        serde_json::from_str(&raw).context("schedule items are not a JSON array of items")?;

    let rules = items
        .iter()
        .map(|item| -> anyhow::Result<serde_json::Value> {
            let expression = item
                .expression()
                .with_context(|| format!("schedule item '{}'", item.name))?;
            Ok(serde_json::json!({
                "name": item.rule_name(prefix),
                "schedule_expression": expression,
                "input_transformer": item.target_input(&secret_ref),
            }))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    println!("{}", serde_json::to_string_pretty(&rules)?);
    Ok(())
}
