//! Tunnel and rule configuration
//!
//! ```toml
//! [[tunnels]]
//! name = "edge"
//! server_addr = "tunnel.example.com:9000"
//!
//! [tunnels.noise]
//! remote_public_key = "base64..."
//!
//! [rules]
//! final = "direct"
//!
//! [[rules.rule]]
//! domain_suffix = ["example.org"]
//! via = "edge"
//! ```

use serde::{Deserialize, Serialize};

/// Route name meaning "no tunnel"
pub const DIRECT_ROUTE: &str = "direct";

/// Named encrypted tunnel
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TunnelConfig {
    /// Name referenced by rules
    pub name: String,

    /// Tunnel server address (`host:port`)
    pub server_addr: String,

    /// Noise handshake settings
    pub noise: NoiseConfig,
}

/// Noise protocol configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NoiseConfig {
    /// Noise protocol pattern
    #[serde(default = "default_noise_pattern")]
    pub pattern: String,

    /// Local private key (base64 encoded)
    #[serde(default)]
    pub local_private_key: Option<String>,

    /// Remote public key (base64 encoded)
    pub remote_public_key: String,
}

fn default_noise_pattern() -> String {
    "Noise_NK_25519_ChaChaPoly_BLAKE2s".to_string()
}

fn default_final_route() -> String {
    DIRECT_ROUTE.to_string()
}

/// `[rules]` section
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RulesConfig {
    /// Route for hosts no rule matches
    #[serde(rename = "final", default = "default_final_route")]
    pub fallback: String,

    /// Ordered rules, first match wins
    #[serde(default)]
    pub rule: Vec<RuleConfig>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        RulesConfig {
            fallback: default_final_route(),
            rule: Vec::new(),
        }
    }
}

/// Single routing rule
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RuleConfig {
    /// Exact domain names
    #[serde(default)]
    pub domain: Vec<String>,

    /// Domain suffixes, matched on label boundaries
    #[serde(default)]
    pub domain_suffix: Vec<String>,

    /// Substrings of the domain name
    #[serde(default)]
    pub domain_keyword: Vec<String>,

    /// IP networks in CIDR notation
    #[serde(default)]
    pub ip_cidr: Vec<String>,

    /// `direct` or a tunnel name
    pub via: String,
}

impl RuleConfig {
    /// Route this rule points at, if it is a tunnel
    pub fn tunnel(&self) -> Option<&str> {
        tunnel_name(&self.via)
    }
}

impl RulesConfig {
    /// Every tunnel name referenced by a rule or the fallback
    pub fn referenced_tunnels(&self) -> impl Iterator<Item = &str> {
        self.rule
            .iter()
            .filter_map(RuleConfig::tunnel)
            .chain(tunnel_name(&self.fallback))
    }
}

fn tunnel_name(via: &str) -> Option<&str> {
    if via.eq_ignore_ascii_case(DIRECT_ROUTE) {
        None
    } else {
        Some(via)
    }
}
