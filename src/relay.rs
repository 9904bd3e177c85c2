//! Bidirectional relay between a client and its backend
//!
//! Bytes buffered before the backend existed are written first, then both
//! directions are pumped verbatim. When one direction reaches EOF the peer's
//! write side is shut down and the other direction gets [`DRAIN_TIMEOUT`] to
//! finish. An I/O error on either side ends the relay at once.

use crate::error::RelayError;
use crate::socks::DEFAULT_BUFFER_SIZE;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Time the remaining direction may keep running after the other hit EOF
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Bytes moved by a finished relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Client to backend, pending bytes included
    pub client_to_backend: u64,
    /// Backend to client
    pub backend_to_client: u64,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    ClientToBackend,
    BackendToClient,
}

impl Direction {
    fn read_error(self, e: std::io::Error) -> RelayError {
        match self {
            Direction::ClientToBackend => RelayError::Client(e),
            Direction::BackendToClient => RelayError::Backend(e),
        }
    }

    fn write_error(self, e: std::io::Error) -> RelayError {
        match self {
            Direction::ClientToBackend => RelayError::Backend(e),
            Direction::BackendToClient => RelayError::Client(e),
        }
    }
}

/// Last time a byte moved in either direction
#[derive(Debug)]
struct Activity {
    start: Instant,
    last_millis: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Activity {
            start: Instant::now(),
            last_millis: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.start.elapsed().as_millis() as u64;
        self.last_millis.store(now, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_millis.load(Ordering::Relaxed));
        self.start.elapsed().saturating_sub(last)
    }
}

/// Relay between `client` and `backend` until both directions are done
///
/// `pending` is written to the backend before anything else. An
/// `idle_timeout` of `None` disables the idle check.
pub async fn bridge<C, B>(
    client: C,
    mut backend: B,
    pending: &[u8],
    idle_timeout: Option<Duration>,
) -> Result<RelayStats, RelayError>
where
    C: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let up = AtomicU64::new(0);
    let down = AtomicU64::new(0);
    let activity = Activity::new();

    if !pending.is_empty() {
        backend
            .write_all(pending)
            .await
            .map_err(RelayError::Backend)?;
        up.fetch_add(pending.len() as u64, Ordering::Relaxed);
        debug!("Flushed {} pending bytes to backend", pending.len());
    }

    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut backend_read, mut backend_write) = tokio::io::split(backend);

    let client_to_backend = pump(
        &mut client_read,
        &mut backend_write,
        &up,
        &activity,
        Direction::ClientToBackend,
    );
    let backend_to_client = pump(
        &mut backend_read,
        &mut client_write,
        &down,
        &activity,
        Direction::BackendToClient,
    );
    tokio::pin!(client_to_backend);
    tokio::pin!(backend_to_client);

    let idle = watch_idle(&activity, idle_timeout);
    tokio::pin!(idle);

    let client_done = tokio::select! {
        result = &mut client_to_backend => {
            result?;
            debug!("Client closed its side");
            true
        }
        result = &mut backend_to_client => {
            result?;
            debug!("Backend closed its side");
            false
        }
        timeout = &mut idle => return Err(RelayError::IdleTimeout(timeout)),
    };

    let remaining = async {
        if client_done {
            backend_to_client.await
        } else {
            client_to_backend.await
        }
    };

    tokio::select! {
        result = tokio::time::timeout(DRAIN_TIMEOUT, remaining) => match result {
            Ok(result) => result?,
            Err(_) => debug!("Relay drain timed out"),
        },
        timeout = &mut idle => return Err(RelayError::IdleTimeout(timeout)),
    }

    Ok(RelayStats {
        client_to_backend: up.load(Ordering::Relaxed),
        backend_to_client: down.load(Ordering::Relaxed),
    })
}

/// Copy until EOF, then shut down the writer
async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    counter: &AtomicU64,
    activity: &Activity,
    direction: Direction,
) -> Result<(), RelayError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; DEFAULT_BUFFER_SIZE];
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| direction.read_error(e))?;
        if n == 0 {
            // The peer may already be gone; a failed shutdown changes nothing
            let _ = writer.shutdown().await;
            return Ok(());
        }
        activity.touch();
        writer
            .write_all(&buf[..n])
            .await
            .map_err(|e| direction.write_error(e))?;
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Resolve once nothing has moved for `limit`; never resolves without one
async fn watch_idle(activity: &Activity, limit: Option<Duration>) -> Duration {
    let Some(limit) = limit else {
        return std::future::pending().await;
    };
    loop {
        let idle = activity.idle_for();
        if idle >= limit {
            return limit;
        }
        tokio::time::sleep(limit - idle).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_pending_bytes_flushed_first() {
        let (mut client_app, client_side) = duplex(1024);
        let (backend_side, mut backend_app) = duplex(1024);

        let relay = tokio::spawn(async move {
            bridge(client_side, backend_side, b"hello ", None).await
        });

        client_app.write_all(b"world").await.unwrap();
        let mut buf = [0u8; 11];
        backend_app.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello world");

        backend_app.write_all(b"reply").await.unwrap();
        let mut buf = [0u8; 5];
        client_app.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"reply");

        drop(client_app);
        drop(backend_app);
        let stats = relay.await.unwrap().unwrap();
        assert_eq!(
            stats,
            RelayStats {
                client_to_backend: 11,
                backend_to_client: 5,
            }
        );
    }

    #[tokio::test]
    async fn test_client_close_closes_backend() {
        let (client_app, client_side) = duplex(1024);
        let (backend_side, mut backend_app) = duplex(1024);

        let relay = tokio::spawn(async move { bridge(client_side, backend_side, b"", None).await });

        drop(client_app);
        let mut buf = Vec::new();
        let n = backend_app.read_to_end(&mut buf).await.unwrap();
        assert_eq!(n, 0);

        drop(backend_app);
        assert!(relay.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_backend_close_closes_client() {
        let (mut client_app, client_side) = duplex(1024);
        let (backend_side, mut backend_app) = duplex(1024);

        let relay = tokio::spawn(async move { bridge(client_side, backend_side, b"", None).await });

        backend_app.write_all(b"bye").await.unwrap();
        drop(backend_app);

        let mut buf = Vec::new();
        client_app.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"bye");

        drop(client_app);
        let stats = relay.await.unwrap().unwrap();
        assert_eq!(stats.backend_to_client, 3);
    }

    #[tokio::test]
    async fn test_half_close_still_delivers_response() {
        let (mut client_app, client_side) = duplex(1024);
        let (backend_side, mut backend_app) = duplex(1024);

        let relay = tokio::spawn(async move { bridge(client_side, backend_side, b"", None).await });

        client_app.write_all(b"request").await.unwrap();
        client_app.shutdown().await.unwrap();

        let mut request = Vec::new();
        backend_app.read_to_end(&mut request).await.unwrap();
        assert_eq!(request, b"request");
        backend_app.write_all(b"response").await.unwrap();
        drop(backend_app);

        let mut response = Vec::new();
        client_app.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"response");
        assert!(relay.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_idle_timeout() {
        let (_client_app, client_side) = duplex(1024);
        let (backend_side, _backend_app) = duplex(1024);

        let started = Instant::now();
        let result = bridge(
            client_side,
            backend_side,
            b"",
            Some(Duration::from_millis(100)),
        )
        .await;
        assert!(matches!(result, Err(RelayError::IdleTimeout(_))));
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_backend_write_failure_is_backend_error() {
        let (_client_app, client_side) = duplex(1024);
        let (backend_side, backend_app) = duplex(1024);
        drop(backend_app);

        let result = bridge(client_side, backend_side, b"early", None).await;
        assert!(matches!(result, Err(RelayError::Backend(_))));
    }
}
