//! Async driver for one client connection
//!
//! Owns the client stream and the backend, feeds socket events into a
//! [`Session`] and carries out the actions it returns. Client reads keep
//! going while the backend is being dialed, so bytes sent right after the
//! CONNECT reply are buffered rather than stalled.

use super::session::{CloseReason, Session, SessionAction, SessionOptions};
use super::DEFAULT_BUFFER_SIZE;
use crate::error::{DialError, FrontError, RelayError};
use crate::relay::{bridge, RelayStats};
use crate::route::{Backend, BackendSelector};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info};

/// Everything a session needs besides its client stream
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Backend selection and dialing
    pub selector: BackendSelector,
    /// Session limits and domain validation
    pub options: SessionOptions,
    /// Relay idle timeout, `None` to disable
    pub idle_timeout: Option<Duration>,
}

type DialFuture<'a> = BoxFuture<'a, Result<Backend, DialError>>;

enum Event {
    Client(io::Result<usize>),
    Dialed(Result<Backend, DialError>),
    Backend(io::Result<usize>),
}

/// Serve one SOCKS5 client until the session ends
///
/// Returns the bytes relayed in each direction. Protocol errors end the
/// session before or instead of the success reply; dial and relay errors
/// happen after it, so the client only sees the connection close.
pub async fn handle_client<S>(
    mut client: S,
    peer: SocketAddr,
    ctx: &SessionContext,
) -> Result<RelayStats, FrontError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut session = Session::new(peer, ctx.options.clone());
    let mut client_buf = vec![0u8; DEFAULT_BUFFER_SIZE];
    let mut backend_buf = vec![0u8; DEFAULT_BUFFER_SIZE];
    let mut dial: Option<DialFuture<'_>> = None;
    let mut backend: Option<Backend> = None;
    let mut early = RelayStats::default();
    let mut flush = Bytes::new();

    let backend = loop {
        if session.is_streaming() {
            if let Some(backend) = backend.take() {
                break backend;
            }
        }

        let event = tokio::select! {
            read = client.read(&mut client_buf), if !session.client_eof() => Event::Client(read),
            result = wait_dial(&mut dial) => Event::Dialed(result),
            read = read_backend(&mut backend, &mut backend_buf) => Event::Backend(read),
        };

        let actions = match event {
            Event::Client(Ok(0)) => {
                let actions = session.on_client_closed();
                if session.client_eof() && !session.is_streaming() {
                    debug!("Client finished sending, holding its bytes for the backend");
                }
                actions
            }
            Event::Client(Ok(n)) => session.on_bytes_received(&client_buf[..n]),
            Event::Client(Err(e)) => {
                debug!("Client read failed in {} stage: {}", session.stage(), e);
                session.on_client_closed();
                return Err(FrontError::Io(e));
            }
            Event::Dialed(Ok(connected)) => {
                dial = None;
                if let Some(target) = session.target() {
                    info!("Connected to {} ({})", target, connected.strategy);
                }
                backend = Some(connected);
                session.on_backend_attached()
            }
            Event::Dialed(Err(e)) => {
                error!("Backend dial failed: {}", e);
                session.on_backend_closed();
                return Err(e.into());
            }
            Event::Backend(Ok(0)) => {
                debug!("Backend closed before the client sent anything");
                session.on_backend_closed()
            }
            Event::Backend(Ok(n)) => {
                // Server-first protocols talk before the client's first bytes
                client.write_all(&backend_buf[..n]).await?;
                early.backend_to_client += n as u64;
                Vec::new()
            }
            Event::Backend(Err(e)) => {
                session.on_backend_closed();
                return Err(RelayError::Backend(e).into());
            }
        };

        for action in actions {
            match action {
                SessionAction::Reply(bytes) => client.write_all(&bytes).await?,
                SessionAction::Dial(target) => {
                    let selector = &ctx.selector;
                    dial = Some(Box::pin(async move { selector.connect(&target).await }));
                }
                SessionAction::Forward(bytes) => flush = bytes,
                SessionAction::Close(reason) => {
                    return match reason {
                        CloseReason::Protocol(e) => Err(e.into()),
                        CloseReason::ClientClosed | CloseReason::BackendClosed => {
                            debug!("Session closed in {} stage: {:?}", session.stage(), reason);
                            Ok(early)
                        }
                    };
                }
            }
        }
    };

    if let (Some(target), Some(class)) = (session.target(), session.classification()) {
        info!("Relaying {} traffic to {}", class, target);
    }

    let stats = bridge(client, backend.stream, &flush, ctx.idle_timeout).await?;
    let stats = RelayStats {
        client_to_backend: stats.client_to_backend,
        backend_to_client: stats.backend_to_client + early.backend_to_client,
    };
    debug!(
        "Relay finished: {} bytes up, {} bytes down",
        stats.client_to_backend, stats.backend_to_client
    );
    Ok(stats)
}

async fn wait_dial(dial: &mut Option<DialFuture<'_>>) -> Result<Backend, DialError> {
    match dial {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn read_backend(backend: &mut Option<Backend>, buf: &mut [u8]) -> io::Result<usize> {
    match backend {
        Some(backend) => backend.stream.read(buf).await,
        None => std::future::pending().await,
    }
}
