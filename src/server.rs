//! SOCKS5 listener
//!
//! Accepts client connections and runs each one as its own task until the
//! shutdown signal arrives.

use crate::config::Config;
use crate::observe::{ConnectionCounter, ConnectionGuard, ConnectionObserver};
use crate::route::{BackendSelector, RuleSet};
use crate::socks::{handle_client, DomainValidator, SessionContext, SessionOptions};
#[cfg(feature = "noise")]
use crate::transport::{SocketOpts, TunnelTransport};
use crate::transport::DirectTransport;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, info_span, warn, Instrument};

/// Pause after a failed accept, e.g. when out of file descriptors
const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(100);

/// Build the shared session context from configuration
pub fn build_context(config: &Config) -> Result<SessionContext> {
    let server = &config.server;

    let validator = DomainValidator::from_optional_file(server.public_suffix_list.as_ref())?;
    let rules = RuleSet::from_config(&config.rules).with_context(|| "Invalid routing rules")?;
    info!("Loaded {} routing rules", rules.len());

    #[allow(unused_mut)]
    let mut selector =
        BackendSelector::new(Arc::new(rules), Arc::new(DirectTransport::from_config(server)));

    #[cfg(feature = "noise")]
    for tunnel in &config.tunnels {
        let transport =
            TunnelTransport::from_config(tunnel, SocketOpts::from_tcp_config(&server.tcp))?
                .with_connect_timeout(Duration::from_secs(server.connect_timeout));
        info!("Tunnel {} via {}", tunnel.name, tunnel.server_addr);
        selector = selector.with_tunnel(tunnel.name.clone(), Arc::new(transport));
    }

    #[cfg(not(feature = "noise"))]
    if !config.tunnels.is_empty() {
        anyhow::bail!("Tunnels are configured but the noise feature is disabled");
    }

    Ok(SessionContext {
        selector,
        options: SessionOptions {
            validator: Arc::new(validator),
            max_pending_bytes: server.max_pending_bytes,
            max_sniff_bytes: server.max_sniff_bytes,
        },
        idle_timeout: Some(Duration::from_secs(server.idle_timeout)).filter(|d| !d.is_zero()),
    })
}

/// Bound SOCKS5 listener
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    ctx: Arc<SessionContext>,
    observer: Arc<dyn ConnectionObserver>,
}

impl Server {
    /// Bind the configured address with a [`ConnectionCounter`] observer
    pub async fn bind(config: &Config) -> Result<Self> {
        let ctx = build_context(config)?;
        Self::bind_with(&config.server.listen_addr, ctx, Arc::new(ConnectionCounter::new())).await
    }

    /// Bind `listen_addr` with an explicit context and observer
    pub async fn bind_with(
        listen_addr: &str,
        ctx: SessionContext,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", listen_addr))?;

        Ok(Server {
            listener,
            ctx: Arc::new(ctx),
            observer,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until shutdown
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        info!("Listening for SOCKS5 clients on {}", self.local_addr()?);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_session(stream, peer),
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_DELAY).await;
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        Ok(())
    }

    fn spawn_session(&self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        let ctx = self.ctx.clone();
        let guard = ConnectionGuard::open(self.observer.clone(), peer);

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        tokio::spawn(
            async move {
                let _guard = guard;
                match handle_client(stream, peer, &ctx).await {
                    Ok(stats) => debug!(
                        "Session finished ({} bytes up, {} bytes down)",
                        stats.client_to_backend, stats.backend_to_client
                    ),
                    Err(e) => debug!("Session ended: {}", e),
                }
            }
            .instrument(info_span!("session", peer = %peer)),
        );
    }
}
