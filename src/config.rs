//! Configuration types for bahador

use crate::error::{Error, Result};
use crate::types::{PartSize, SizeUnit};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Size limits and spool location
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Largest file accepted at all (default: 4 GiB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Files at or below this size are streamed, larger ones spooled (default: 200 MiB)
    #[serde(default = "default_part_threshold")]
    pub part_threshold: u64,

    /// Maximum size of each split part (default: "200m")
    #[serde(default = "default_part_size")]
    pub part_size: PartSize,

    /// Root directory for spooled jobs (default: "./spool")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Chunks buffered between download and upload when streaming (default: 16)
    #[serde(default = "default_pipe_capacity")]
    pub pipe_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            part_threshold: default_part_threshold(),
            part_size: default_part_size(),
            temp_dir: default_temp_dir(),
            pipe_capacity: default_pipe_capacity(),
        }
    }
}

/// Worker pool sizing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of jobs executed concurrently (default: 5)
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Jobs that may wait in the queue (default: same as `worker_count`)
    #[serde(default)]
    pub queue_capacity: Option<usize>,

    /// How long shutdown waits for running jobs before cancelling them (default: 30s)
    #[serde(default = "default_shutdown_timeout", with = "duration_secs")]
    pub shutdown_timeout: Duration,
}

impl WorkerConfig {
    /// Effective queue capacity
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.worker_count).max(1)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            queue_capacity: None,
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Per-phase time limits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Metadata (HEAD) request (default: 30s)
    #[serde(default = "default_metadata_timeout", with = "duration_secs")]
    pub metadata: Duration,

    /// Whole streaming relay (default: 30 min)
    #[serde(default = "default_streaming_timeout", with = "duration_secs")]
    pub streaming: Duration,

    /// Download to spool directory (default: 60 min)
    #[serde(default = "default_spool_download_timeout", with = "duration_secs")]
    pub spool_download: Duration,

    /// Archiver process (default: 15 min)
    #[serde(default = "default_split_timeout", with = "duration_secs")]
    pub split: Duration,

    /// Upload of a single part (default: 30 min)
    #[serde(default = "default_part_upload_timeout", with = "duration_secs")]
    pub part_upload: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            metadata: default_metadata_timeout(),
            streaming: default_streaming_timeout(),
            spool_download: default_spool_download_timeout(),
            split: default_split_timeout(),
            part_upload: default_part_upload_timeout(),
        }
    }
}

/// External archiver location
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to 7-Zip executable (auto-detected if None)
    #[serde(default)]
    pub sevenzip_path: Option<PathBuf>,

    /// Whether to search PATH for the archiver if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            sevenzip_path: None,
            search_path: true,
        }
    }
}

/// Disk space checking before spooling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskSpaceConfig {
    /// Enable disk space checking (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum free space to leave behind (default: 512 MiB)
    #[serde(default = "default_min_free_space")]
    pub min_free_space: u64,

    /// Multiplier for the declared size; the download and its parts coexist briefly (default: 2.0)
    #[serde(default = "default_size_multiplier")]
    pub size_multiplier: f64,
}

impl Default for DiskSpaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_free_space: default_min_free_space(),
            size_multiplier: default_size_multiplier(),
        }
    }
}

/// Telegram Bot API connection used by [`TelegramSink`](crate::sink::TelegramSink)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token
    #[serde(default)]
    pub token: String,

    /// API host (default: "api.telegram.org"); may include a scheme for self-hosted servers
    #[serde(default = "default_api_host")]
    pub api_host: String,

    /// Chat that receives uploaded documents
    #[serde(default)]
    pub storage_chat_id: i64,
}

/// Data storage for the user table
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "./bahador.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for the relay pool
///
/// Fields are organized into logical sub-configs:
/// - [`relay`](RelayConfig) — size limits, part size, spool directory
/// - [`workers`](WorkerConfig) — pool size and queue depth
/// - [`timeouts`](TimeoutConfig) — per-phase time limits
/// - [`tools`](ToolsConfig) — archiver binary
/// - [`disk_space`](DiskSpaceConfig) — free-space guard for spooled jobs
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Size limits and spool location
    #[serde(flatten)]
    pub relay: RelayConfig,

    /// Worker pool sizing
    #[serde(flatten)]
    pub workers: WorkerConfig,

    /// Per-phase time limits
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// External archiver location
    #[serde(flatten)]
    pub tools: ToolsConfig,

    /// Disk space checking
    #[serde(default)]
    pub disk_space: DiskSpaceConfig,

    /// Telegram Bot API settings
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// User database
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Check the configuration for values the pool cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.workers.worker_count == 0 {
            return Err(config_error("worker_count must be at least 1", "worker_count"));
        }
        if self.relay.part_size.bytes() == 0 {
            return Err(config_error("part_size must be greater than zero", "part_size"));
        }
        if self.relay.part_size.bytes() > self.relay.max_file_size {
            return Err(config_error(
                "part_size must not exceed max_file_size",
                "part_size",
            ));
        }
        if self.relay.part_threshold > self.relay.max_file_size {
            return Err(config_error(
                "part_threshold must not exceed max_file_size",
                "part_threshold",
            ));
        }
        if self.relay.pipe_capacity == 0 {
            return Err(config_error(
                "pipe_capacity must be at least 1",
                "pipe_capacity",
            ));
        }
        if self.disk_space.size_multiplier < 1.0 {
            return Err(config_error(
                "size_multiplier must be at least 1.0",
                "size_multiplier",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

/// Durations are written as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

fn default_max_file_size() -> u64 {
    4 * 1024 * 1024 * 1024 // 4 GiB
}

fn default_part_threshold() -> u64 {
    200 * 1024 * 1024 // 200 MiB
}

fn default_part_size() -> PartSize {
    PartSize::new(200, SizeUnit::Mega)
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./spool")
}

fn default_pipe_capacity() -> usize {
    16
}

fn default_worker_count() -> usize {
    5
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_metadata_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_streaming_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_spool_download_timeout() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_split_timeout() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_part_upload_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_true() -> bool {
    true
}

fn default_min_free_space() -> u64 {
    512 * 1024 * 1024 // 512 MiB
}

fn default_size_multiplier() -> f64 {
    2.0
}

fn default_api_host() -> String {
    "api.telegram.org".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./bahador.db")
}
