//! Test utilities for Sockroute integration tests

#![allow(dead_code)]

use sockroute::config::{parse_config, Config};
use sockroute::observe::ConnectionCounter;
use sockroute::server::{build_context, Server};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

pub const SOCKS5_VERSION: u8 = 0x05;
pub const CMD_CONNECT: u8 = 0x01;
pub const CMD_BIND: u8 = 0x02;
pub const CMD_UDP_ASSOCIATE: u8 = 0x03;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Echo server that serves any number of connections
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Running front-end under test
pub struct TestFront {
    pub addr: SocketAddr,
    pub counter: Arc<ConnectionCounter>,
    shutdown_tx: broadcast::Sender<bool>,
}

impl TestFront {
    /// Start a front-end from a TOML snippet on an ephemeral port
    pub async fn start(toml: &str) -> Self {
        Self::start_with(parse_config(toml).unwrap()).await
    }

    /// Start a front-end from a prepared config
    pub async fn start_with(config: Config) -> Self {
        let ctx = build_context(&config).unwrap();
        let counter = Arc::new(ConnectionCounter::new());
        let server = Server::bind_with("127.0.0.1:0", ctx, counter.clone())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(server.run(shutdown_rx));

        TestFront {
            addr,
            counter,
            shutdown_tx,
        }
    }

    /// Wait until no connection is open
    pub async fn wait_idle(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.counter.active() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connections did not close");
    }
}

impl Drop for TestFront {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Request bytes for an IPv4 target
pub fn request_ipv4(cmd: u8, addr: SocketAddr) -> Vec<u8> {
    let SocketAddr::V4(v4) = addr else {
        panic!("IPv4 address expected");
    };
    let mut request = vec![SOCKS5_VERSION, cmd, 0x00, 0x01];
    request.extend_from_slice(&v4.ip().octets());
    request.extend_from_slice(&v4.port().to_be_bytes());
    request
}

/// Request bytes for a domain target
pub fn request_domain(cmd: u8, domain: &str, port: u16) -> Vec<u8> {
    let mut request = vec![SOCKS5_VERSION, cmd, 0x00, 0x03, domain.len() as u8];
    request.extend_from_slice(domain.as_bytes());
    request.extend_from_slice(&port.to_be_bytes());
    request
}

/// Greet, send `request` and check both replies; returns the connected stream
pub async fn socks_connect(front: SocketAddr, request: &[u8]) -> TcpStream {
    let mut stream = TcpStream::connect(front).await.unwrap();
    stream
        .write_all(&[SOCKS5_VERSION, 0x01, 0x00])
        .await
        .unwrap();
    let mut selection = [0u8; 2];
    stream.read_exact(&mut selection).await.unwrap();
    assert_eq!(selection, [0x05, 0x00]);

    stream.write_all(request).await.unwrap();
    let mut reply = [0u8; 10];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[..8], [0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0]);
    assert_eq!(reply[8..], request[request.len() - 2..]);
    stream
}

/// Read until EOF with a deadline
pub async fn read_to_close(stream: &mut TcpStream) -> Vec<u8> {
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut received))
        .await
        .expect("connection was not closed")
        .unwrap_or_default();
    received
}
