//! Noise tunnel transport
//!
//! Dials a tunnel server, runs the Noise handshake and then sends the real
//! target as a SOCKS5 address header (`ATYP | ADDR | PORT`). Whatever follows
//! on the stream belongs to the session.

use super::{connect_tcp, SocketOpts, StreamDyn, Transport, TransportDyn};
use crate::config::{NoiseConfig, TunnelConfig};
use crate::error::DialError;
use crate::socks::{encode_address, TargetAddr};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::BytesMut;
use snowstorm::NoiseStream;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Encrypted tunnel to a remote relay
#[derive(Debug)]
pub struct TunnelTransport {
    /// Tunnel name used in rules
    name: String,
    /// Tunnel server address
    server: TargetAddr,
    /// Noise pattern (e.g., "Noise_NK_25519_ChaChaPoly_BLAKE2s")
    pattern: String,
    /// Local private key (optional for some patterns)
    local_private_key: Option<Vec<u8>>,
    /// Remote public key
    remote_public_key: Vec<u8>,
    /// Socket options to apply to the TCP leg
    socket_opts: SocketOpts,
    /// Connection timeout for the TCP leg
    connect_timeout: Duration,
}

impl TunnelTransport {
    /// Create a tunnel transport from its config section
    pub fn from_config(config: &TunnelConfig, socket_opts: SocketOpts) -> Result<Self> {
        let server = config
            .server_addr
            .parse::<TargetAddr>()
            .map_err(|e| anyhow!(e))
            .with_context(|| format!("Invalid server_addr for tunnel {}", config.name))?;

        let (local_private_key, remote_public_key) = decode_keys(&config.noise)
            .with_context(|| format!("Invalid Noise keys for tunnel {}", config.name))?;

        // Reject unknown patterns at startup rather than on first dial
        snowstorm::Builder::new(
            config
                .noise
                .pattern
                .parse()
                .with_context(|| format!("Invalid Noise pattern: {}", config.noise.pattern))?,
        );

        Ok(TunnelTransport {
            name: config.name.clone(),
            server,
            pattern: config.noise.pattern.clone(),
            local_private_key,
            remote_public_key,
            socket_opts,
            connect_timeout: Duration::from_secs(10),
        })
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Tunnel name
    pub fn name(&self) -> &str {
        &self.name
    }

    fn handshake_error(&self, reason: impl ToString) -> DialError {
        DialError::Handshake {
            server: self.server.to_string(),
            reason: reason.to_string(),
        }
    }
}

fn decode_keys(config: &NoiseConfig) -> Result<(Option<Vec<u8>>, Vec<u8>)> {
    let remote_public_key = BASE64
        .decode(&config.remote_public_key)
        .with_context(|| "Failed to decode remote public key from base64")?;

    let local_private_key = match config.local_private_key {
        Some(ref key) => Some(
            BASE64
                .decode(key)
                .with_context(|| "Failed to decode local private key from base64")?,
        ),
        None => None,
    };

    Ok((local_private_key, remote_public_key))
}

#[async_trait]
impl Transport for TunnelTransport {
    type Stream = NoiseStream<TcpStream>;

    async fn dial(&self, target: &TargetAddr) -> Result<Self::Stream, DialError> {
        let tcp_stream = connect_tcp(&self.server, self.connect_timeout, &self.socket_opts).await?;

        let mut builder = snowstorm::Builder::new(
            self.pattern
                .parse()
                .map_err(|e| self.handshake_error(e))?,
        )
        .remote_public_key(&self.remote_public_key);
        if let Some(ref key) = self.local_private_key {
            builder = builder.local_private_key(key);
        }
        let handshake_state = builder
            .build_initiator()
            .map_err(|e| self.handshake_error(e))?;

        let mut noise_stream = NoiseStream::handshake(tcp_stream, handshake_state)
            .await
            .map_err(|e| self.handshake_error(e))?;

        let mut header = BytesMut::new();
        encode_address(target, &mut header).map_err(|e| self.handshake_error(e))?;
        noise_stream
            .write_all(&header)
            .await
            .map_err(|e| DialError::connect(self.server.to_string(), e))?;
        noise_stream
            .flush()
            .await
            .map_err(|e| DialError::connect(self.server.to_string(), e))?;

        tracing::debug!(
            "Tunnel {} to {} established via {}",
            self.name,
            target,
            self.server
        );

        Ok(noise_stream)
    }
}

#[async_trait]
impl TransportDyn for TunnelTransport {
    async fn dial_dyn(&self, target: &TargetAddr) -> Result<Box<dyn StreamDyn>, DialError> {
        let stream = self.dial(target).await?;
        Ok(Box::new(stream))
    }
}
