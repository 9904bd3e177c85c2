//! # Sockroute - rule-routed SOCKS5 front-end
//!
//! Sockroute accepts SOCKS5 clients, decodes their CONNECT requests, looks at
//! the first bytes they send to tell HTTP and WebSocket traffic from opaque
//! streams, and relays each connection either directly or through a
//! Noise-encrypted tunnel chosen by routing rules.
//!
//! ## Features
//!
//! - **Incremental parsing**: handshake frames may arrive in any split
//! - **Optimistic replies**: the CONNECT success reply goes out before the dial
//! - **Domain validation**: domain targets must sit under an ICANN public suffix
//! - **Traffic sniffing**: HTTP / WebSocket / opaque classification per session
//! - **Rule routing**: exact, suffix, keyword and CIDR matchers
//! - **Idle timeout**: established relays close after a quiet period
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sockroute::config::load_config;
//! use sockroute::server::Server;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     Server::bind(&config).await?.run(shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SOCKS5 Client -> Session -> BackendSelector -> Direct | Tunnel -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod observe;
pub mod relay;
pub mod route;
pub mod server;
pub mod sniff;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{DialError, FrontError, ProtocolError, RelayError};
pub use server::Server;

/// Version of the Sockroute library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
