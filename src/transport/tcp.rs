//! Direct TCP transport
//!
//! Connects straight to the requested target.

use super::{connect_tcp, SocketOpts, StreamDyn, Transport, TransportDyn};
use crate::config::ServerConfig;
use crate::error::DialError;
use crate::socks::TargetAddr;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// Plain TCP dialer
#[derive(Debug, Clone)]
pub struct DirectTransport {
    /// Socket options to apply to connections
    socket_opts: SocketOpts,
    /// Connection timeout
    connect_timeout: Duration,
}

impl DirectTransport {
    /// Create a new direct transport with default options
    pub fn with_defaults() -> Self {
        DirectTransport {
            socket_opts: SocketOpts::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Create a direct transport from the server section
    pub fn from_config(config: &ServerConfig) -> Self {
        DirectTransport {
            socket_opts: SocketOpts::from_tcp_config(&config.tcp),
            connect_timeout: Duration::from_secs(config.connect_timeout),
        }
    }

    /// Set socket options
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Transport for DirectTransport {
    type Stream = TcpStream;

    async fn dial(&self, target: &TargetAddr) -> Result<Self::Stream, DialError> {
        let stream = connect_tcp(target, self.connect_timeout, &self.socket_opts).await?;
        tracing::debug!("Direct connection established to {}", target);
        Ok(stream)
    }
}

#[async_trait]
impl TransportDyn for DirectTransport {
    async fn dial_dyn(&self, target: &TargetAddr) -> Result<Box<dyn StreamDyn>, DialError> {
        let stream = self.dial(target).await?;
        Ok(Box::new(stream))
    }
}
