use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::constants::{DEFAULT_NDC_CACHE_PATH, DEFAULT_RULES_PATH, DEFAULT_RXNAV_API_URL};
use crate::rxnorm::RetryPolicy;

#[derive(Parser, Debug)]
#[command(name = "formulary-ingest")]
#[command(about = "Normalize CMS Part D formulary files into a plan rules table", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest a formulary PUF (.zip or .csv) into a rules CSV.
    Ingest(IngestArgs),
    /// Serve the admin ingestion endpoint.
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct LookupArgs {
    /// JSON cache of NDC -> RxCUI lookups, shared across runs.
    #[arg(long, env = "FORMULARY_NDC_CACHE", default_value = DEFAULT_NDC_CACHE_PATH)]
    pub cache_path: PathBuf,

    /// RxNav `rxcui.json` endpoint.
    #[arg(long, default_value = DEFAULT_RXNAV_API_URL)]
    pub rxnav_url: String,

    /// Attempts per uncached NDC before it is recorded as unmapped.
    #[arg(long, default_value_t = 3)]
    pub lookup_attempts: u32,

    /// Pause between failed attempts, in milliseconds.
    #[arg(long, default_value_t = 500)]
    pub lookup_backoff_ms: u64,

    /// Per-attempt request timeout, in seconds.
    #[arg(long, default_value_t = 10)]
    pub lookup_timeout_secs: u64,
}

impl LookupArgs {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.lookup_attempts.max(1),
            delay: Duration::from_millis(self.lookup_backoff_ms),
            timeout: Duration::from_secs(self.lookup_timeout_secs),
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct IngestArgs {
    /// CMS formulary PUF archive (.zip) or formulary CSV.
    pub input_path: PathBuf,

    /// Rules CSV destination.
    pub output_path: PathBuf,

    #[command(flatten)]
    pub lookup: LookupArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8787)]
    pub port: u16,

    /// Shared secret expected in the `X-Admin-Key` header.
    #[arg(long, env = "FORMULARY_ADMIN_KEY", default_value = "dev", hide_env_values = true)]
    pub admin_key: String,

    /// Rules CSV rewritten by each ingestion.
    #[arg(long, env = "FORMULARY_RULES_PATH", default_value = DEFAULT_RULES_PATH)]
    pub rules_path: PathBuf,

    /// Endpoint POSTed after a successful ingestion. Skipped when unset.
    #[arg(long, env = "FORMULARY_REINDEX_URL")]
    pub reindex_url: Option<String>,

    #[command(flatten)]
    pub lookup: LookupArgs,
}
