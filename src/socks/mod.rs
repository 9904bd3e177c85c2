//! SOCKS5 front-end
//!
//! Wire parsing ([`codec`], [`handshake`]), the per-connection state machine
//! ([`session`]) and the async driver that runs it on a client stream
//! ([`handler`]).

pub mod codec;
mod consts;
pub mod domain;
pub mod handler;
pub mod handshake;
pub mod session;
mod types;

pub use codec::{decode_address, encode_address, encoded_len, Decode};
pub use consts::*;
pub use domain::DomainValidator;
pub use handler::{handle_client, SessionContext};
pub use handshake::{method_selection_reply, parse_greeting, parse_request, success_reply};
pub use session::{CloseReason, Session, SessionAction, SessionOptions, Stage};
pub use types::{AddressType, SocksCommand, TargetAddr};
