//! Backend transports for Sockroute
//!
//! Every backend is reached through the [`Transport`] trait and erased to
//! [`TransportDyn`] for the selector. Two implementations ship: a direct TCP
//! dialer and a Noise-encrypted tunnel.

#[cfg(feature = "noise")]
mod noise;
mod tcp;

#[cfg(feature = "noise")]
pub use noise::TunnelTransport;
pub use tcp::DirectTransport;

use crate::config::TcpConfig;
use crate::error::DialError;
use crate::socks::TargetAddr;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Socket options applied to outbound connections
#[derive(Debug, Clone)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(20),
            keepalive_interval: Some(8),
        }
    }
}

impl SocketOpts {
    /// Create socket options from TCP config
    pub fn from_tcp_config(config: &TcpConfig) -> Self {
        SocketOpts {
            nodelay: config.nodelay,
            keepalive_secs: Some(config.keepalive_secs).filter(|s| *s > 0),
            keepalive_interval: Some(config.keepalive_interval).filter(|s| *s > 0),
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}

/// Dial capability shared by all backends
#[async_trait]
pub trait Transport: Debug + Send + Sync + 'static {
    /// The stream type produced by this transport
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync + Debug + 'static;

    /// Open a byte stream that ends at `target`
    async fn dial(&self, target: &TargetAddr) -> Result<Self::Stream, DialError>;
}

/// Object-safe form of [`Transport`]
#[async_trait]
pub trait TransportDyn: Debug + Send + Sync {
    /// Dial a target and return a boxed stream
    async fn dial_dyn(&self, target: &TargetAddr) -> Result<Box<dyn StreamDyn>, DialError>;
}

/// Dynamic stream trait for boxed streams
pub trait StreamDyn: AsyncRead + AsyncWrite + Unpin + Send + Sync + Debug {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync + Debug> StreamDyn for T {}

/// Connect a TCP socket with a timeout and apply socket options
pub(crate) async fn connect_tcp(
    target: &TargetAddr,
    connect_timeout: Duration,
    opts: &SocketOpts,
) -> Result<TcpStream, DialError> {
    let resolved = target.resolve().await?;

    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(resolved))
        .await
        .map_err(|_| DialError::Timeout(target.to_string()))?
        .map_err(|e| DialError::connect(target.to_string(), e))?;

    if let Err(e) = opts.apply(&stream) {
        tracing::warn!("Failed to apply socket options to {}: {}", resolved, e);
    }

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_opts_default() {
        let opts = SocketOpts::default();
        assert!(opts.nodelay);
        assert_eq!(opts.keepalive_secs, Some(20));
        assert_eq!(opts.keepalive_interval, Some(8));
    }

    #[test]
    fn test_socket_opts_from_tcp_config() {
        let config = TcpConfig {
            nodelay: false,
            keepalive_secs: 60,
            keepalive_interval: 15,
        };
        let opts = SocketOpts::from_tcp_config(&config);
        assert!(!opts.nodelay);
        assert_eq!(opts.keepalive_secs, Some(60));
        assert_eq!(opts.keepalive_interval, Some(15));
    }

    #[test]
    fn test_socket_opts_zero_disables_keepalive() {
        let config = TcpConfig {
            nodelay: true,
            keepalive_secs: 0,
            keepalive_interval: 8,
        };
        let opts = SocketOpts::from_tcp_config(&config);
        assert_eq!(opts.keepalive_secs, None);
    }

    #[tokio::test]
    async fn test_connect_tcp_applies_options() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = connect_tcp(
            &TargetAddr::from(addr),
            Duration::from_secs(1),
            &SocketOpts::default(),
        )
        .await
        .unwrap();
        assert!(stream.nodelay().unwrap());
    }
}
