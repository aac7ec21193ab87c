//! Configuration management for veilmesh.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    pub mesh: MeshConfig,
    pub sync: SyncConfig,
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub alias: String,
    pub data_dir: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Initial hop budget stamped on locally originated gossip packets.
    pub hop_budget: u8,
    /// Maximum peers selected per propagation step.
    pub gossip_fanout: usize,
    /// Inactivity window before an online peer is demoted to offline (seconds).
    pub peer_stale_secs: u64,
    /// Period of the stale-peer sweep tick (seconds).
    pub peer_sweep_secs: u64,
    /// Period of the presence heartbeat tick (seconds).
    pub presence_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Period of the full inventory reconciliation tick (seconds).
    pub interval_secs: u64,
    /// Number of recent content items included in a digest.
    pub digest_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Fixed chunk size for new transfer sessions (bytes).
    pub chunk_size: usize,
    /// Period of the transfer maintenance tick (seconds).
    pub maintenance_secs: u64,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            node: NodeConfig {
                alias: "anonymous".to_string(),
                data_dir: "./veilmesh-data".to_string(),
                log_level: "info".to_string(),
            },
            mesh: MeshConfig {
                hop_budget: 6,
                gossip_fanout: 3,
                peer_stale_secs: 15 * 60,
                peer_sweep_secs: 2 * 60,
                presence_secs: 10 * 60,
            },
            sync: SyncConfig {
                interval_secs: 60 * 60,
                digest_window: 64,
            },
            transfer: TransferConfig {
                chunk_size: 256 * 1024,
                maintenance_secs: 1,
            },
        }
    }
}
