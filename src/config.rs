use crate::services::{
    local_store::DEFAULT_PAGE_SIZE, propagator::DEFAULT_GRANT_TTL, scanner::DEFAULT_CONCURRENCY,
};
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

const DEV_ACCOUNT_KEY: &str = "dev-account-key";

/// Longest read grant the scanner will sign.
pub const MAX_GRANT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub source_container: String,
    pub target_container: String,
    pub metadata_container: String,
    pub watermark_blob: String,
    pub table_name: String,
    pub storage_dir: String,
    pub database_url: String,
    pub account_key: String,
    pub interval: Duration,
    pub concurrency: usize,
    pub op_timeout: Duration,
    pub grant_ttl: Duration,
    pub page_size: usize,
    pub health_addr: Option<String>,
}

/// What the process should do after loading its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Schedule,
    Once,
    Migrate,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Incremental blob change scanner")]
pub struct Args {
    /// Container scanned for changes (overrides SOURCE_CONTAINER_NAME)
    #[arg(long)]
    pub source_container: Option<String>,

    /// Container changed objects are copied into (overrides TARGET_CONTAINER_NAME)
    #[arg(long)]
    pub target_container: Option<String>,

    /// Container holding the watermark blob (overrides METADATA_CONTAINER_NAME)
    #[arg(long)]
    pub metadata_container: Option<String>,

    /// Name of the watermark blob (overrides LAST_SCAN_TIMESTAMP_BLOB_NAME)
    #[arg(long)]
    pub watermark_blob: Option<String>,

    /// Metadata table name (overrides TABLE_NAME)
    #[arg(long)]
    pub table_name: Option<String>,

    /// Directory where object payloads are stored (overrides BLOB_SCANNER_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides BLOB_SCANNER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Seconds between scans (overrides BLOB_SCANNER_INTERVAL_SECS)
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Objects processed concurrently (overrides BLOB_SCANNER_CONCURRENCY)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Per-copy and per-upsert deadline in seconds (overrides BLOB_SCANNER_OP_TIMEOUT_SECS)
    #[arg(long)]
    pub op_timeout_secs: Option<u64>,

    /// Lifetime of each copy's read grant in seconds (overrides BLOB_SCANNER_GRANT_TTL_SECS)
    #[arg(long)]
    pub grant_ttl_secs: Option<u64>,

    /// Address for /healthz and /readyz, e.g. 0.0.0.0:8080 (overrides BLOB_SCANNER_HEALTH_ADDR)
    #[arg(long)]
    pub health_addr: Option<String>,

    /// Run a single scan and exit
    #[arg(long)]
    pub once: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read `name` and parse it, or fall back to `default` when unset.
fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.into())
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, RunMode)> {
        Self::from_args(Args::parse())
    }

    /// Merge already-parsed CLI args over the environment.
    pub fn from_args(args: Args) -> Result<(Self, RunMode)> {
        let interval_secs = match args.interval_secs {
            Some(secs) => secs,
            None => env_parse("BLOB_SCANNER_INTERVAL_SECS", 60u64)?,
        };
        if interval_secs == 0 {
            bail!("scan interval must be at least one second");
        }
        let concurrency = match args.concurrency {
            Some(n) => n,
            None => env_parse("BLOB_SCANNER_CONCURRENCY", DEFAULT_CONCURRENCY)?,
        };

        let op_timeout_secs = match args.op_timeout_secs {
            Some(secs) => secs,
            None => env_parse("BLOB_SCANNER_OP_TIMEOUT_SECS", 30u64)?,
        };
        let grant_ttl_secs = match args.grant_ttl_secs {
            Some(secs) => secs,
            None => env_parse("BLOB_SCANNER_GRANT_TTL_SECS", DEFAULT_GRANT_TTL.as_secs())?,
        };

        let account_key = env::var("BLOB_SCANNER_ACCOUNT_KEY").unwrap_or_else(|_| {
            tracing::warn!("BLOB_SCANNER_ACCOUNT_KEY not set; using the development key");
            DEV_ACCOUNT_KEY.into()
        });

        let cfg = Self {
            source_container: args
                .source_container
                .unwrap_or_else(|| env_or("SOURCE_CONTAINER_NAME", "input")),
            target_container: args
                .target_container
                .unwrap_or_else(|| env_or("TARGET_CONTAINER_NAME", "output")),
            metadata_container: args
                .metadata_container
                .unwrap_or_else(|| env_or("METADATA_CONTAINER_NAME", "function-metadata")),
            watermark_blob: args.watermark_blob.unwrap_or_else(|| {
                env_or("LAST_SCAN_TIMESTAMP_BLOB_NAME", "last_scan_timestamp.txt")
            }),
            table_name: args
                .table_name
                .unwrap_or_else(|| env_or("TABLE_NAME", "BlobMetadataTable")),
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| env_or("BLOB_SCANNER_STORAGE_DIR", "./data/blobs")),
            database_url: args.database_url.unwrap_or_else(|| {
                env_or(
                    "BLOB_SCANNER_DATABASE_URL",
                    "sqlite://./data/meta/blob_scanner.db",
                )
            }),
            account_key,
            interval: Duration::from_secs(interval_secs),
            concurrency: concurrency.max(1),
            op_timeout: Duration::from_secs(op_timeout_secs),
            grant_ttl: Duration::from_secs(grant_ttl_secs),
            page_size: env_parse("BLOB_SCANNER_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            health_addr: args
                .health_addr
                .or_else(|| env::var("BLOB_SCANNER_HEALTH_ADDR").ok()),
        };
        cfg.validate()?;

        let mode = if args.migrate {
            RunMode::Migrate
        } else if args.once {
            RunMode::Once
        } else {
            RunMode::Schedule
        };
        Ok((cfg, mode))
    }

    /// Reject settings that would make a scan loop on itself or hand out
    /// grants that die before the copy they authorise.
    fn validate(&self) -> Result<()> {
        if self.source_container == self.target_container {
            bail!(
                "source and target container are both `{}`",
                self.source_container
            );
        }
        if self.metadata_container == self.source_container {
            bail!(
                "watermark container `{}` is also the source container",
                self.metadata_container
            );
        }
        if self.op_timeout.is_zero() {
            bail!("operation timeout must be at least one second");
        }
        if self.grant_ttl > MAX_GRANT_TTL {
            bail!(
                "grant ttl of {}s exceeds the {}s maximum",
                self.grant_ttl.as_secs(),
                MAX_GRANT_TTL.as_secs()
            );
        }
        if self.grant_ttl <= self.op_timeout {
            bail!(
                "grant ttl ({}s) must outlast the operation timeout ({}s)",
                self.grant_ttl.as_secs(),
                self.op_timeout.as_secs()
            );
        }
        Ok(())
    }
}
