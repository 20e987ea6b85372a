//! Configuration types for study-results

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Export tuning (pagination and keep-alive)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Maximum number of entities fetched per database page (default: 100)
    ///
    /// Peak memory of an export is bounded by one page of fully loaded
    /// entities plus the streaming buffers.
    #[serde(default = "default_max_db_query_size")]
    pub max_db_query_size: usize,

    /// Interval after which a filler chunk is sent if no data was ready (default: 30s)
    #[serde(default = "default_keep_alive_interval", with = "duration_serde")]
    pub keep_alive_interval: Duration,

    /// Capacity of the channel between the page producer and the response body (default: 16)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Most IDs an explicit selector may expand to (default: 100000)
    #[serde(default = "default_max_selector_ids")]
    pub max_selector_ids: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_db_query_size: default_max_db_query_size(),
            keep_alive_interval: default_keep_alive_interval(),
            channel_capacity: default_channel_capacity(),
            max_selector_ids: default_max_selector_ids(),
        }
    }
}

/// File-system locations for result uploads and archive assembly
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the per-result upload directories (default: "./result_uploads")
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,

    /// Directory where zip archives are assembled before being served
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            temp_dir: default_temp_dir(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./study-results.db")
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

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:9000)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// Main configuration
///
/// Fields are organized into logical sub-configs:
/// - [`export`](ExportConfig) - page size and keep-alive
/// - [`storage`](StorageConfig) - upload and temp directories
/// - [`persistence`](PersistenceConfig) - database location
/// - [`api`](ApiConfig) - HTTP adapter
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Export settings
    #[serde(default)]
    pub export: ExportConfig,

    /// File-system settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Database settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// HTTP settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Check settings that would make the engine misbehave at runtime
    pub fn validate(&self) -> Result<()> {
        if self.export.max_db_query_size == 0 {
            return Err(Error::Config {
                message: "max_db_query_size must be at least 1".to_string(),
                key: Some("max_db_query_size".to_string()),
            });
        }
        if self.export.keep_alive_interval.is_zero() {
            return Err(Error::Config {
                message: "keep_alive_interval must be greater than zero".to_string(),
                key: Some("keep_alive_interval".to_string()),
            });
        }
        if self.export.channel_capacity == 0 {
            return Err(Error::Config {
                message: "channel_capacity must be at least 1".to_string(),
                key: Some("channel_capacity".to_string()),
            });
        }
        if self.export.max_selector_ids == 0 {
            return Err(Error::Config {
                message: "max_selector_ids must be at least 1".to_string(),
                key: Some("max_selector_ids".to_string()),
            });
        }
        Ok(())
    }

    /// Page size used by the streamer
    pub fn page_size(&self) -> usize {
        self.export.max_db_query_size
    }
}

fn default_max_db_query_size() -> usize {
    100
}

fn default_keep_alive_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_channel_capacity() -> usize {
    16
}

fn default_max_selector_ids() -> usize {
    100_000
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./result_uploads")
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("study-results")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./study-results.db")
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

// Duration serialization helper
mod duration_serde {
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
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
