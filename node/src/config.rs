//! Node configuration with TOML file support.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use escrow_types::{BlockHeight, WalletAddress};
use escrow_utils::{LogFormat, RetrySchedule};

use crate::feed::FeedConfig;
use crate::sync::SyncConfig;
use crate::NodeError;

/// Configuration for an escrow sync node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Blocks a header must be buried under before its height is emitted.
    #[serde(default = "default_required_confirmations")]
    pub required_confirmations: u64,

    /// Resubscribe when no header arrives for this long.
    #[serde(default = "default_block_idle_timeout_secs")]
    pub block_idle_timeout_secs: u64,

    /// Widest block range fetched in one backfill request.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Capacity of the header and confirmed-height channels.
    #[serde(default = "default_header_buffer_size")]
    pub header_buffer_size: usize,

    /// Pause between consecutive confirmed-height emissions.
    #[serde(default = "default_emit_interval_ms")]
    pub emit_interval_ms: u64,

    /// Delays between resubscribe attempts, in seconds.
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: Vec<u64>,

    /// First height to sync when no cursor has been persisted yet.
    #[serde(default)]
    pub start_height: BlockHeight,

    /// Address of the escrow contract whose logs are reconciled.
    #[serde(default)]
    pub escrow_address: String,

    /// Data directory for the LMDB environment.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in bytes.
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    /// Interval between ledger cache compactions; 0 disables them.
    #[serde(default = "default_gc_interval_secs")]
    pub gc_interval_secs: u64,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter, e.g. "info" or "info,escrow_node=debug".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_required_confirmations() -> u64 {
    12
}

fn default_block_idle_timeout_secs() -> u64 {
    30
}

fn default_chunk_size() -> u64 {
    10_000
}

fn default_header_buffer_size() -> usize {
    100
}

fn default_emit_interval_ms() -> u64 {
    50
}

fn default_reconnect_backoff_secs() -> Vec<u64> {
    vec![0, 1, 5, 10]
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./escrow_data")
}

fn default_map_size() -> usize {
    1024 * 1024 * 1024
}

fn default_gc_interval_secs() -> u64 {
    3_600
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Reject settings the node cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.escrow_address.trim().is_empty() {
            return Err(NodeError::Config("escrow_address must be set".into()));
        }
        if self.chunk_size == 0 {
            return Err(NodeError::Config("chunk_size must be positive".into()));
        }
        if self.block_idle_timeout_secs == 0 {
            return Err(NodeError::Config(
                "block_idle_timeout_secs must be positive".into(),
            ));
        }
        if self.header_buffer_size == 0 {
            return Err(NodeError::Config("header_buffer_size must be positive".into()));
        }
        if self.reconnect_backoff_secs.is_empty() {
            return Err(NodeError::Config(
                "reconnect_backoff_secs needs at least one entry".into(),
            ));
        }
        Ok(())
    }

    /// Install the global subscriber from `log_format` and `log_level`.
    pub fn init_logging(&self) -> bool {
        escrow_utils::init_logging(self.log_format, &self.log_level)
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            required_confirmations: self.required_confirmations,
            idle_timeout: Duration::from_secs(self.block_idle_timeout_secs),
            header_buffer: self.header_buffer_size,
            emit_interval: Duration::from_millis(self.emit_interval_ms),
            retry: RetrySchedule::from_secs(&self.reconnect_backoff_secs),
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            chunk_size: self.chunk_size,
            start_height: self.start_height,
            escrow_address: WalletAddress::new(self.escrow_address.trim()),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            required_confirmations: default_required_confirmations(),
            block_idle_timeout_secs: default_block_idle_timeout_secs(),
            chunk_size: default_chunk_size(),
            header_buffer_size: default_header_buffer_size(),
            emit_interval_ms: default_emit_interval_ms(),
            reconnect_backoff_secs: default_reconnect_backoff_secs(),
            start_height: 0,
            escrow_address: String::new(),
            data_dir: default_data_dir(),
            map_size: default_map_size(),
            gc_interval_secs: default_gc_interval_secs(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_survives_toml() {
        let config = NodeConfig {
            escrow_address: "0xescrow".into(),
            ..NodeConfig::default()
        };
        let toml_str = config.to_toml_string().unwrap();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.required_confirmations, 12);
        assert_eq!(config.block_idle_timeout_secs, 30);
        assert_eq!(config.chunk_size, 10_000);
        assert_eq!(config.header_buffer_size, 100);
        assert_eq!(config.emit_interval_ms, 50);
        assert_eq!(config.start_height, 0);
        assert_eq!(config.log_format, LogFormat::Human);
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            escrow_address = "0xescrow"
            required_confirmations = 3
            log_format = "json"
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.required_confirmations, 3);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.chunk_size, 10_000); // default
        assert!(config.validate().is_ok());
    }

    #[test]
    fn derived_configs_carry_settings() {
        let config = NodeConfig {
            escrow_address: " 0xescrow ".into(),
            emit_interval_ms: 0,
            ..NodeConfig::default()
        };
        let feed = config.feed_config();
        assert_eq!(feed.required_confirmations, 12);
        assert_eq!(feed.idle_timeout, Duration::from_secs(30));
        assert_eq!(feed.emit_interval, Duration::ZERO);
        assert_eq!(feed.retry, RetrySchedule::default());

        let sync = config.sync_config();
        assert_eq!(sync.chunk_size, 10_000);
        assert_eq!(sync.escrow_address, WalletAddress::new("0xescrow"));
    }

    #[test]
    fn missing_escrow_address_is_invalid() {
        let err = NodeConfig::default().validate().unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }

    #[test]
    fn zero_chunk_size_is_invalid() {
        let config = NodeConfig {
            escrow_address: "0xescrow".into(),
            chunk_size: 0,
            ..NodeConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, NodeError::Config(msg) if msg.contains("chunk_size")));
    }

    #[test]
    fn zero_idle_timeout_is_invalid() {
        let config = NodeConfig {
            escrow_address: "0xescrow".into(),
            block_idle_timeout_secs: 0,
            ..NodeConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, NodeError::Config(msg) if msg.contains("block_idle_timeout_secs")));
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/escrow.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
