//! Relay configuration with TOML file support.

use std::path::Path;
use std::time::Duration;

use relay_network::PeerManagerConfig;
use relay_types::NetworkId;
use serde::{Deserialize, Serialize};

use crate::logging::LogFormat;
use crate::NodeError;

/// Configuration for the peer network.
///
/// Can be loaded from a TOML file via [`NetworkConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Every field has a default, so an
/// empty file is a valid configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Which network to join. Peers on another network are rejected.
    #[serde(default = "default_network")]
    pub network_id: NetworkId,

    /// Agent string sent in our `Identify`.
    #[serde(default = "default_agent")]
    pub agent: String,

    /// Port to listen on for P2P connections.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Ceiling on registered connections; inbound connections beyond it are
    /// turned away with `Congested`.
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,

    /// Connected peers needed before the node reports ready.
    #[serde(default = "default_min_peers")]
    pub min_peers: usize,

    /// Whether blocks and transactions from peers are processed at all.
    #[serde(default = "default_true")]
    pub enable_syncing: bool,

    /// Outbound queue length per peer.
    #[serde(default = "default_peer_channel_capacity")]
    pub peer_channel_capacity: usize,

    /// Hashes remembered per peer and kind.
    #[serde(default = "default_known_hashes_capacity")]
    pub known_hashes_capacity: usize,

    /// Transaction hashes remembered by the seen ledger.
    #[serde(default = "default_seen_ledger_capacity")]
    pub seen_ledger_capacity: usize,

    /// How long a verified transaction hash stays in the seen ledger.
    #[serde(default = "default_seen_ledger_ttl_secs")]
    pub seen_ledger_ttl_secs: u64,

    /// Deepest block (below head) served as a compact block.
    #[serde(default = "default_compact_block_max_depth")]
    pub compact_block_max_depth: u64,

    /// Deepest block (below head) whose transactions are served.
    #[serde(default = "default_block_transactions_max_depth")]
    pub block_transactions_max_depth: u64,

    /// Outstanding requests to peers are forgotten after this long.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Peer messages handled concurrently. Further messages wait in the
    /// inbound queue, and readers stall once it is full.
    #[serde(default = "default_max_concurrent_handlers")]
    pub max_concurrent_handlers: usize,

    /// Time all connection writers get, together, to flush on stop.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_network() -> NetworkId {
    NetworkId::Dev
}

fn default_agent() -> String {
    format!("relay/{}", env!("CARGO_PKG_VERSION"))
}

fn default_listen_port() -> u16 {
    NetworkId::Dev.default_port()
}

fn default_max_peers() -> usize {
    50
}

fn default_min_peers() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_peer_channel_capacity() -> usize {
    256
}

fn default_known_hashes_capacity() -> usize {
    relay_network::known::DEFAULT_KNOWN_CAPACITY
}

fn default_seen_ledger_capacity() -> usize {
    50_000
}

fn default_seen_ledger_ttl_secs() -> u64 {
    600
}

fn default_compact_block_max_depth() -> u64 {
    5
}

fn default_block_transactions_max_depth() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_handlers() -> usize {
    256
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

fn default_log_format() -> LogFormat {
    LogFormat::Human
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NetworkConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("NetworkConfig is always serializable to TOML")
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.max_peers == 0 {
            return Err(NodeError::Config("max_peers must be at least 1".into()));
        }
        if self.min_peers > self.max_peers {
            return Err(NodeError::Config(format!(
                "min_peers ({}) exceeds max_peers ({})",
                self.min_peers, self.max_peers
            )));
        }
        if self.peer_channel_capacity == 0
            || self.known_hashes_capacity == 0
            || self.seen_ledger_capacity == 0
            || self.max_concurrent_handlers == 0
        {
            return Err(NodeError::Config("capacities must be non-zero".into()));
        }
        Ok(())
    }

    pub fn peer_manager_config(&self) -> PeerManagerConfig {
        PeerManagerConfig {
            max_peers: self.max_peers,
            min_peers: self.min_peers,
            channel_capacity: self.peer_channel_capacity,
            known_hashes_capacity: self.known_hashes_capacity,
            writer_shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
            ..PeerManagerConfig::default()
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            network_id: default_network(),
            agent: default_agent(),
            listen_port: default_listen_port(),
            max_peers: default_max_peers(),
            min_peers: default_min_peers(),
            enable_syncing: default_true(),
            peer_channel_capacity: default_peer_channel_capacity(),
            known_hashes_capacity: default_known_hashes_capacity(),
            seen_ledger_capacity: default_seen_ledger_capacity(),
            seen_ledger_ttl_secs: default_seen_ledger_ttl_secs(),
            compact_block_max_depth: default_compact_block_max_depth(),
            block_transactions_max_depth: default_block_transactions_max_depth(),
            request_timeout_secs: default_request_timeout_secs(),
            max_concurrent_handlers: default_max_concurrent_handlers(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}
