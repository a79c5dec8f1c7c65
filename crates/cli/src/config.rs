//! Command line and environment configuration.
//!
//! Every setting can come from a flag or its environment variable; the
//! function runtime only ever provides the environment. [`ForwarderArgs`] is
//! validated once into a [`ForwarderConfig`] before any infrastructure is
//! built.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use forwarder::{DedupStrategy, SecretRef, SourceName};
use memcache::MemcachedConfig;

/// Idempotent scheduled webhook forwarder.
#[derive(Parser, Debug)]
#[command(name = "cron-forwarder")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log output format
    #[arg(long, global = true, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve invocations from the Lambda Runtime API
    Serve(ForwarderArgs),

    /// Forward a single trigger event
    Invoke {
        /// JSON event file, or `-` for stdin
        #[arg(long, default_value = "-")]
        event: PathBuf,

        #[command(flatten)]
        forwarder: ForwarderArgs,
    },

    /// Print rule expressions and target inputs for schedule items
    Schedule {
        /// JSON array of schedule items
        #[arg(long)]
        items: PathBuf,

        /// Rule name prefix
        #[arg(long, env = "SCHEDULE_PREFIX", default_value = "cron_webhooks")]
        prefix: String,

        /// Secret reference every target input points at
        #[arg(long, env = "SHARED_SECRET_ARN")]
        secret_ref: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

/// Settings shared by `serve` and `invoke`.
#[derive(Args, Debug, Clone)]
pub struct ForwarderArgs {
    /// Source name the dedup record is keyed by
    #[arg(long, env = "AWS_LAMBDA_FUNCTION_NAME")]
    pub source_name: Option<String>,

    /// ElastiCache configuration endpoint (`host:port`) for node discovery
    #[arg(long, env = "ECACHE_ENDPOINT")]
    pub ecache_endpoint: Option<String>,

    /// Static memcached nodes, comma separated (`host:port,...`)
    #[arg(long, env = "CACHE_NODES", value_delimiter = ',')]
    pub cache_nodes: Vec<String>,

    /// Round-trip timeout for cache operations, in milliseconds
    #[arg(long, env = "CACHE_TIMEOUT_MS", default_value_t = 5000)]
    pub cache_timeout_ms: u64,

    /// Cache item expiry in seconds (0 = never)
    #[arg(long, env = "CACHE_EXPIRY_SECS", default_value_t = 0)]
    pub cache_expiry_secs: u32,

    /// How the dedup record is checked and written
    #[arg(long, env = "DEDUP_STRATEGY", default_value = "check-then-set")]
    pub dedup_strategy: DedupStrategy,

    /// Namespace prepended to every dedup key
    #[arg(long, env = "DEDUP_KEY_PREFIX")]
    pub key_prefix: Option<String>,

    /// AWS region for Secrets Manager
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Secrets Manager endpoint override
    #[arg(long, env = "SECRETS_ENDPOINT")]
    pub secrets_endpoint: Option<String>,

    /// Use this token for every event instead of Secrets Manager
    #[arg(long, env = "CRON_AUTH_TOKEN", hide_env_values = true)]
    pub static_token: Option<String>,

    /// Outbound webhook timeout in milliseconds (default: none)
    #[arg(long, env = "WEBHOOK_TIMEOUT_MS")]
    pub webhook_timeout_ms: Option<u64>,
}

/// Where the dedup store's nodes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSource {
    Discover(String),
    Static(Vec<String>),
}

/// Where shared secrets come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    SecretsManager {
        region: String,
        endpoint: Option<String>,
    },
    Static(String),
}

/// Validated forwarder settings.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub source: SourceName,
    pub store: StoreSource,
    pub cache: MemcachedConfig,
    pub strategy: DedupStrategy,
    pub key_prefix: Option<String>,
    pub credentials: CredentialSource,
    pub webhook_timeout: Option<Duration>,
}

impl ForwarderArgs {
    pub fn validate(self) -> anyhow::Result<ForwarderConfig> {
        let source_name = self
            .source_name
            .context("source name is not set (AWS_LAMBDA_FUNCTION_NAME or --source-name)")?;
        let source = SourceName::new(source_name.clone())
            .with_context(|| format!("invalid source name '{source_name}'"))?;

        let nodes: Vec<String> = self
            .cache_nodes
            .into_iter()
            .map(|n| n.trim().to_owned())
            .filter(|n| !n.is_empty())
            .collect();
        let store = match (self.ecache_endpoint.filter(|e| !e.is_empty()), nodes.is_empty()) {
            (Some(endpoint), _) => StoreSource::Discover(endpoint),
            (None, false) => StoreSource::Static(nodes),
            (None, true) => bail!("no dedup store configured (ECACHE_ENDPOINT or CACHE_NODES)"),
        };

        let credentials = match (self.static_token, self.region) {
            (Some(token), _) if !token.is_empty() => CredentialSource::Static(token),
            (_, Some(region)) if !region.is_empty() => CredentialSource::SecretsManager {
                region,
                endpoint: self.secrets_endpoint,
            },
            _ => bail!("no credential source configured (AWS_REGION or CRON_AUTH_TOKEN)"),
        };

        if self.cache_timeout_ms == 0 {
            bail!("cache timeout must be greater than zero");
        }

        Ok(ForwarderConfig {
            source,
            store,
            cache: MemcachedConfig {
                timeout: Duration::from_millis(self.cache_timeout_ms),
                expiry_secs: self.cache_expiry_secs,
                ..MemcachedConfig::default()
            },
            strategy: self.dedup_strategy,
            key_prefix: self.key_prefix.filter(|p| !p.is_empty()),
            credentials,
            webhook_timeout: self.webhook_timeout_ms.map(Duration::from_millis),
        })
    }
}

/// Parses the `--secret-ref` of the `schedule` command.
pub fn parse_secret_ref(raw: &str) -> anyhow::Result<SecretRef> {
    SecretRef::new(raw).with_context(|| format!("invalid secret reference '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("cron-forwarder").chain(args.iter().copied())).unwrap()
    }

    fn forwarder_args(cli: Cli) -> ForwarderArgs {
        match cli.command {
            Command::Serve(args) => args,
            Command::Invoke { forwarder, .. } => forwarder,
            Command::Schedule { .. } => panic!("schedule has no forwarder args"),
        }
    }

    #[test]
    fn serve_with_static_nodes_and_token() {
        let cli = parse(&[
            "serve",
            "--source-name",
            "prod_cron_webhooks",
            "--cache-nodes",
            "10.0.0.1:11211, 10.0.0.2:11211",
            "--static-token",
            "s3cr3t",
            "--dedup-strategy",
            "conditional-write",
        ]);
        let config = forwarder_args(cli).validate().unwrap();

        assert_eq!(config.source.as_str(), "prod_cron_webhooks");
        assert_eq!(
            config.store,
            StoreSource::Static(vec!["10.0.0.1:11211".into(), "10.0.0.2:11211".into()])
        );
        assert_eq!(config.credentials, CredentialSource::Static("s3cr3t".into()));
        assert_eq!(config.strategy, DedupStrategy::ConditionalWrite);
        assert_eq!(config.cache.timeout, Duration::from_secs(5));
        assert_eq!(config.webhook_timeout, None);
    }

    #[test]
    fn discovery_endpoint_wins_over_static_nodes() {
        let cli = parse(&[
            "serve",
            "--source-name",
            "prod_cron_webhooks",
            "--ecache-endpoint",
            "cfg.cache.amazonaws.com:11211",
            "--cache-nodes",
            "10.0.0.1:11211",
            "--region",
            "us-east-1",
        ]);
        let config = forwarder_args(cli).validate().unwrap();

        assert_eq!(
            config.store,
            StoreSource::Discover("cfg.cache.amazonaws.com:11211".into())
        );
        assert_eq!(
            config.credentials,
            CredentialSource::SecretsManager {
                region: "us-east-1".into(),
                endpoint: None
            }
        );
    }

    #[test]
    fn invoke_reads_event_path() {
        let cli = parse(&[
            "invoke",
            "--event",
            "event.json",
            "--source-name",
            "local",
            "--cache-nodes",
            "127.0.0.1:11211",
            "--static-token",
            "t",
            "--webhook-timeout-ms",
            "250",
        ]);
        let Command::Invoke { event, forwarder } = cli.command else {
            panic!("expected invoke");
        };
        assert_eq!(event, PathBuf::from("event.json"));
        let config = forwarder.validate().unwrap();
        assert_eq!(config.webhook_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn unknown_strategy_is_rejected_by_parser() {
        let result = Cli::try_parse_from([
            "cron-forwarder",
            "serve",
            "--dedup-strategy",
            "eventually",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn blank_source_name_is_rejected() {
        let cli = parse(&[
            "serve",
            "--source-name",
            "  ",
            "--cache-nodes",
            "127.0.0.1:11211",
            "--static-token",
            "t",
        ]);
        let err = forwarder_args(cli).validate().unwrap_err();
        assert!(err.to_string().contains("invalid source name"));
    }

    #[test]
    fn zero_cache_timeout_is_rejected() {
        let cli = parse(&[
            "serve",
            "--source-name",
            "local",
            "--cache-nodes",
            "127.0.0.1:11211",
            "--static-token",
            "t",
            "--cache-timeout-ms",
            "0",
        ]);
        assert!(forwarder_args(cli).validate().is_err());
    }

    #[test]
    fn schedule_takes_prefix_and_secret_ref() {
        let cli = parse(&[
            "schedule",
            "--items",
            "items.json",
            "--prefix",
            "prod",
            "--secret-ref",
            "arn:s1",
        ]);
        let Command::Schedule {
            items,
            prefix,
            secret_ref,
        } = cli.command
        else {
            panic!("expected schedule");
        };
        assert_eq!(items, PathBuf::from("items.json"));
        assert_eq!(prefix, "prod");
        assert_eq!(parse_secret_ref(&secret_ref).unwrap().as_str(), "arn:s1");
    }
}
