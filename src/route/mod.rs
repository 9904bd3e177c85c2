//! Backend selection
//!
//! The [`BackendSelector`] asks a [`RuleLookup`] where a target should go and
//! dials the matching transport. It only sees transports through
//! [`TransportDyn`], never their concrete types.

mod rules;

pub use rules::RuleSet;

use crate::error::DialError;
use crate::socks::TargetAddr;
use crate::transport::{StreamDyn, TransportDyn};
use std::collections::HashMap;
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// Routing decision for a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Connect straight to the target
    Direct,
    /// Connect through the named encrypted tunnel
    ProxyVia(String),
}

/// Maps a domain or textual IP to a route
///
/// Shared read-only by every session, so implementations must be safe for
/// concurrent lookups.
pub trait RuleLookup: Debug + Send + Sync {
    /// Decide the route for `host`
    fn resolve(&self, host: &str) -> RouteDecision;
}

/// Transport strategy picked for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStrategy {
    /// Plain TCP to the target
    Direct,
    /// Encrypted tunnel identified by name
    EncryptedTunnel(String),
}

impl fmt::Display for BackendStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendStrategy::Direct => write!(f, "direct"),
            BackendStrategy::EncryptedTunnel(name) => write!(f, "tunnel:{}", name),
        }
    }
}

/// Established backend connection
pub struct Backend {
    /// Strategy the connection was made with
    pub strategy: BackendStrategy,
    /// Byte stream to the target
    pub stream: Box<dyn StreamDyn>,
}

impl Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

/// Chooses and dials the backend transport for a target
#[derive(Debug, Clone)]
pub struct BackendSelector {
    rules: Arc<dyn RuleLookup>,
    direct: Arc<dyn TransportDyn>,
    tunnels: HashMap<String, Arc<dyn TransportDyn>>,
}

impl BackendSelector {
    /// Create a selector with only the direct transport
    pub fn new(rules: Arc<dyn RuleLookup>, direct: Arc<dyn TransportDyn>) -> Self {
        BackendSelector {
            rules,
            direct,
            tunnels: HashMap::new(),
        }
    }

    /// Register a named tunnel transport
    pub fn with_tunnel(mut self, name: impl Into<String>, transport: Arc<dyn TransportDyn>) -> Self {
        self.tunnels.insert(name.into(), transport);
        self
    }

    /// Names of the registered tunnels
    pub fn tunnel_names(&self) -> Vec<&str> {
        self.tunnels.keys().map(|s| s.as_str()).collect()
    }

    /// Decide the strategy for a target
    pub fn select(&self, target: &TargetAddr) -> BackendStrategy {
        match self.rules.resolve(&target.host()) {
            RouteDecision::Direct => BackendStrategy::Direct,
            RouteDecision::ProxyVia(name) => BackendStrategy::EncryptedTunnel(name),
        }
    }

    /// Dial a target with an already selected strategy
    pub async fn dial(
        &self,
        strategy: &BackendStrategy,
        target: &TargetAddr,
    ) -> Result<Box<dyn StreamDyn>, DialError> {
        let transport = match strategy {
            BackendStrategy::Direct => &self.direct,
            BackendStrategy::EncryptedTunnel(name) => self
                .tunnels
                .get(name)
                .ok_or_else(|| DialError::NoTransport(name.clone()))?,
        };
        transport.dial_dyn(target).await
    }

    /// Select a strategy and dial it; the rule set is consulted exactly once
    pub async fn connect(&self, target: &TargetAddr) -> Result<Backend, DialError> {
        let strategy = self.select(target);
        debug!("Route for {} is {}", target, strategy);
        let stream = self.dial(&strategy, target).await?;
        Ok(Backend { strategy, stream })
    }
}
