use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the artifact-console binary.
#[derive(Debug, Parser)]
#[command(
    name = "artifact-console",
    version,
    about = "Query-key invalidation tooling for the artifact repository admin console"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "ARTIFACT_CONSOLE_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub cache: CacheOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Consume change events from stdin until EOF.
    Watch,
    /// Show the group and keys a change-event type invalidates.
    Explain(ExplainArgs),
    /// Print the invalidation group table.
    Groups,
    /// Verify the key, group and event tables.
    Check,
    /// Replay a file of change events against a seeded query store.
    Replay(ReplayArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ExplainArgs {
    /// Wire event type, e.g. `repository.deleted`.
    pub event_type: String,
}

#[derive(Debug, Args, Clone)]
pub struct ReplayArgs {
    /// Newline-delimited JSON change events.
    #[arg(value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Consume after every event instead of once at the end.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub eager: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit JSON formatted logs.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheOverrides {
    /// Enable or disable event-driven invalidation.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the query store entry limit.
    #[arg(long = "cache-query-store-limit", value_name = "COUNT")]
    pub cache_query_store_limit: Option<usize>,

    /// Override the cache consume batch limit.
    #[arg(long = "cache-consume-batch-limit", value_name = "COUNT")]
    pub cache_consume_batch_limit: Option<usize>,

    /// Override the maximum change-event queue length.
    #[arg(long = "cache-max-event-queue-len", value_name = "COUNT")]
    pub cache_max_event_queue_len: Option<usize>,

    /// Override the cache auto-consume interval in milliseconds.
    #[arg(long = "cache-auto-consume-interval-ms", value_name = "MS")]
    pub cache_auto_consume_interval_ms: Option<u64>,
}
