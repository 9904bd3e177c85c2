//! Configuration module for Sockroute
//!
//! TOML configuration for the listener, the tunnels and the routing rules.

mod route;
mod server;

pub use route::{NoiseConfig, RuleConfig, RulesConfig, TunnelConfig, DIRECT_ROUTE};
pub use server::{Config, ServerConfig, TcpConfig};

use crate::socks::TargetAddr;
use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config =
        toml::from_str(content).with_context(|| "Failed to parse configuration")?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Check addresses and rule references
    pub fn validate(&self) -> Result<()> {
        self.server
            .listen_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid listen_addr: {}", self.server.listen_addr))?;

        if self.server.max_pending_bytes == 0 {
            bail!("max_pending_bytes must be greater than zero");
        }

        let mut names = HashSet::new();
        for tunnel in &self.tunnels {
            if tunnel.name.eq_ignore_ascii_case(DIRECT_ROUTE) {
                bail!("Tunnel name '{}' is reserved", tunnel.name);
            }
            if !names.insert(tunnel.name.as_str()) {
                bail!("Duplicate tunnel name: {}", tunnel.name);
            }
            tunnel
                .server_addr
                .parse::<TargetAddr>()
                .map_err(|e| anyhow!(e))
                .with_context(|| format!("Invalid server_addr for tunnel {}", tunnel.name))?;
        }

        for name in self.rules.referenced_tunnels() {
            if !names.contains(name) {
                bail!("Rule references unknown tunnel: {}", name);
            }
        }

        Ok(())
    }
}
