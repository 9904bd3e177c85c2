//! Listener and session configuration
//!
//! Defines the `[server]` section and the top-level [`Config`].

use super::route::{RulesConfig, TunnelConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Listener and session settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Encrypted tunnels available to rules
    #[serde(default)]
    pub tunnels: Vec<TunnelConfig>,

    /// Routing rules
    #[serde(default)]
    pub rules: RulesConfig,
}

/// Default listen address
fn default_listen_addr() -> String {
    "127.0.0.1:1080".to_string()
}

/// Default backend connect timeout in seconds
fn default_connect_timeout() -> u64 {
    10
}

/// Default relay idle timeout in seconds
fn default_idle_timeout() -> u64 {
    300
}

/// Default pending buffer bound
fn default_max_pending_bytes() -> usize {
    64 * 1024
}

/// Default sniff window
fn default_max_sniff_bytes() -> usize {
    crate::sniff::DEFAULT_MAX_SNIFF_BYTES
}

/// `[server]` section
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// SOCKS5 listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Backend connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Relay idle timeout in seconds (0 disables)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,

    /// Bytes a client may send before its backend is attached
    #[serde(default = "default_max_pending_bytes")]
    pub max_pending_bytes: usize,

    /// Bytes inspected before protocol classification gives up
    #[serde(default = "default_max_sniff_bytes")]
    pub max_sniff_bytes: usize,

    /// Public suffix list file replacing the embedded one
    #[serde(default)]
    pub public_suffix_list: Option<PathBuf>,

    /// Socket options for outbound TCP
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: default_listen_addr(),
            connect_timeout: default_connect_timeout(),
            idle_timeout: default_idle_timeout(),
            max_pending_bytes: default_max_pending_bytes(),
            max_sniff_bytes: default_max_sniff_bytes(),
            public_suffix_list: None,
            tcp: TcpConfig::default(),
        }
    }
}

/// Default keepalive seconds
fn default_keepalive_secs() -> u64 {
    20
}

/// Default keepalive interval
fn default_keepalive_interval() -> u64 {
    8
}

fn default_nodelay() -> bool {
    true
}

/// TCP socket configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TcpConfig {
    /// Enable TCP_NODELAY
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,

    /// TCP keepalive timeout in seconds (0 disables)
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// TCP keepalive interval in seconds
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            nodelay: default_nodelay(),
            keepalive_secs: default_keepalive_secs(),
            keepalive_interval: default_keepalive_interval(),
        }
    }
}
