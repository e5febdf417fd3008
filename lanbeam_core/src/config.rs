//! Per-call settings with sensible defaults.
//!
//! Nothing here is read from disk or the environment. Front-ends that want
//! to remember user choices can serialize these structs themselves.

use crate::discovery::{DISCOVERY_PORT, DISCOVERY_WINDOW_MS};
use crate::transfer::constants::{
    CHUNK_SIZE, CONNECT_TIMEOUT_SECS, HEADER_TIMEOUT_SECS, TRANSFER_PORT,
};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

const DOWNLOAD_DIR_NAME: &str = "lanbeam";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Port the discovery responders listen on
    pub port: u16,
    /// How long to wait for replies after probing
    pub window: Duration,
    /// Unicast probe targets. Empty means broadcast on every IPv4 interface.
    pub targets: Vec<Ipv4Addr>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: DISCOVERY_PORT,
            window: Duration::from_millis(DISCOVERY_WINDOW_MS),
            targets: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_targets(mut self, targets: Vec<Ipv4Addr>) -> Self {
        self.targets = targets;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderConfig {
    pub chunk_size: usize,
    pub connect_timeout: Duration,
    /// Used only when the host is `"auto"`
    pub discovery: DiscoveryConfig,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            discovery: DiscoveryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    pub port: u16,
    pub discovery_port: u16,
    pub download_dir: PathBuf,
    /// Name announced to discovering senders
    pub name: String,
    /// Idle connections are dropped if no header arrives within this
    pub header_timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            port: TRANSFER_PORT,
            discovery_port: DISCOVERY_PORT,
            download_dir: get_download_dir(),
            name: local_name(),
            header_timeout: Duration::from_secs(HEADER_TIMEOUT_SECS),
        }
    }
}

/// `~/lanbeam`, or `./lanbeam` when the home directory is unknown
pub fn get_download_dir() -> PathBuf {
    UserDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DOWNLOAD_DIR_NAME)
}

/// Hostname of this machine, used as the announced receiver name
pub fn local_name() -> String {
    hostname::get()
        .ok()
        .and_then(|s| s.into_string().ok())
        .unwrap_or_else(|| "Unknown-PC".to_string())
}
