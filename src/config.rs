//! Gateway configuration module
//!
//! Layers built-in defaults, an optional JSON file and `SYNC_*` environment
//! variables (in that order of precedence, last wins).

use crate::error::SyncError;
use crate::registry::ShardAssignment;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default shard count for the connection registry
pub const DEFAULT_SHARDS: usize = 10;

/// Config file used when neither an explicit path nor `SYNC_CONFIG` is given
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Environment variable prefix (`SYNC_THRESHOLD`, `SYNC_PORT`, ...)
pub const ENV_PREFIX: &str = "SYNC";

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Wait before the first scheduler tick
    pub delay: Duration,

    /// Time between scheduler ticks
    pub interval: Duration,

    /// Minimum simultaneous connections before a tick broadcasts
    pub threshold: usize,

    /// WebSocket listener port
    pub port: u16,

    /// Accept and hold connections only; never start the scheduler
    pub only_test_connect: bool,

    /// Health/metrics HTTP port
    pub http_port: u16,

    /// Number of registry shards
    pub shards: usize,

    /// How new connections are spread over shards
    pub shard_assignment: ShardAssignment,

    /// Upper bound on a single client write during a broadcast
    pub send_timeout: Duration,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Shape of the merged config sources before durations are parsed
///
/// Keys are matched case-sensitively, so the PascalCase and camelCase
/// spellings of existing `config.json` files are listed as aliases.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawConfig {
    #[serde(alias = "Delay")]
    delay: String,
    #[serde(alias = "Interval")]
    interval: String,
    #[serde(
        alias = "total_size",
        alias = "totalsize",
        alias = "TotalSize",
        alias = "totalSize"
    )]
    threshold: usize,
    #[serde(alias = "Port")]
    port: u16,
    #[serde(
        alias = "onlytestconnect",
        alias = "OnlyTestConnect",
        alias = "onlyTestConnect"
    )]
    only_test_connect: bool,
    http_port: u16,
    shards: usize,
    shard_assignment: ShardAssignment,
    send_timeout: String,
    log_level: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            delay: "10m".to_string(),
            interval: "1m".to_string(),
            threshold: 1_000_000,
            port: 8088,
            only_test_connect: false,
            http_port: 9090,
            shards: DEFAULT_SHARDS,
            shard_assignment: ShardAssignment::Random,
            send_timeout: "5s".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(10 * 60),
            interval: Duration::from_secs(60),
            threshold: 1_000_000,
            port: 8088,
            only_test_connect: false,
            http_port: 9090,
            shards: DEFAULT_SHARDS,
            shard_assignment: ShardAssignment::Random,
            send_timeout: Duration::from_secs(5),
            log_level: "info".to_string(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from defaults, a JSON file and the environment.
    ///
    /// The file is `path` if given, else `$SYNC_CONFIG`, else `config.json`.
    /// A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self, SyncError> {
        dotenvy::dotenv().ok();

        let file: PathBuf = match path {
            Some(p) => p.to_path_buf(),
            None => env::var(format!("{ENV_PREFIX}_CONFIG"))
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE)),
        };

        let raw: RawConfig = config::Config::builder()
            .add_source(
                config::File::from(file.as_path())
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(SyncError::ConfigLoad)?;

        let config = Self::from_raw(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, SyncError> {
        Ok(Self {
            delay: parse_duration("delay", &raw.delay)?,
            interval: parse_duration("interval", &raw.interval)?,
            threshold: raw.threshold,
            port: raw.port,
            only_test_connect: raw.only_test_connect,
            http_port: raw.http_port,
            shards: raw.shards,
            shard_assignment: raw.shard_assignment,
            send_timeout: parse_duration("send_timeout", &raw.send_timeout)?,
            log_level: raw.log_level,
        })
    }

    /// Reject values the scheduler or registry cannot run with
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.interval.is_zero() {
            return Err(SyncError::Config(
                "interval must be greater than zero".to_string(),
            ));
        }
        if self.shards == 0 {
            return Err(SyncError::Config("shards must be at least 1".to_string()));
        }
        if self.send_timeout.is_zero() {
            return Err(SyncError::Config(
                "send_timeout must be greater than zero".to_string(),
            ));
        }
        if self.port != 0 && self.port == self.http_port {
            return Err(SyncError::Config(format!(
                "port and http_port must differ (both {})",
                self.port
            )));
        }
        Ok(())
    }
}

/// Parse a human duration such as "500ms", "10m" or "1h 30m"
pub fn parse_duration(field: &'static str, value: &str) -> Result<Duration, SyncError> {
    humantime::parse_duration(value.trim()).map_err(|source| SyncError::InvalidDuration {
        field,
        value: value.to_string(),
        source,
    })
}
