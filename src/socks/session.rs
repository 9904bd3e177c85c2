//! Per-connection SOCKS5 state machine
//!
//! [`Session`] never touches a socket. The driver feeds it events (client
//! bytes, backend attached, either side closed) and performs the
//! [`SessionAction`]s it returns, in order.
//!
//! ```text
//! Greeting --05 xx ..--> Negotiating --CONNECT--> Relaying --> Closed
//!     |                      |                        |
//!     +---- bad input -------+------------------------+--> Closed
//! ```
//!
//! In `Relaying`, client bytes are held in a pending buffer until the backend
//! is attached and the sniffer has classified them. They are then handed out
//! once as a single [`SessionAction::Forward`] and the session is streaming.

use super::codec::Decode;
use super::domain::DomainValidator;
use super::handshake::{method_selection_reply, parse_greeting, parse_request, success_reply};
use super::types::TargetAddr;
use crate::error::ProtocolError;
use crate::sniff::{Classification, SniffOutcome, Sniffer, DEFAULT_MAX_SNIFF_BYTES};
use bytes::{Buf, Bytes, BytesMut};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default bound on bytes buffered before the backend is attached
pub const DEFAULT_MAX_PENDING_BYTES: usize = 64 * 1024;

/// Session lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Waiting for the method negotiation message
    Greeting,
    /// Waiting for the request
    Negotiating,
    /// Target known; buffering or forwarding client bytes
    Relaying,
    /// Terminal
    Closed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Greeting => write!(f, "greeting"),
            Stage::Negotiating => write!(f, "negotiating"),
            Stage::Relaying => write!(f, "relaying"),
            Stage::Closed => write!(f, "closed"),
        }
    }
}

/// Why a session closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Client input was rejected
    Protocol(ProtocolError),
    /// Client went away
    ClientClosed,
    /// Backend went away or could not be dialed
    BackendClosed,
}

/// Work the driver must perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Write these bytes to the client
    Reply(Bytes),
    /// Start dialing a backend for this target
    Dial(TargetAddr),
    /// Write these bytes to the backend
    Forward(Bytes),
    /// Close both sides
    Close(CloseReason),
}

/// Limits and shared state every session needs
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Domain validator for domain targets
    pub validator: Arc<DomainValidator>,
    /// Bound on bytes buffered before the backend is attached
    pub max_pending_bytes: usize,
    /// Bytes inspected before classification gives up
    pub max_sniff_bytes: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            validator: Arc::new(DomainValidator::default()),
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
            max_sniff_bytes: DEFAULT_MAX_SNIFF_BYTES,
        }
    }
}

/// State of one client connection
#[derive(Debug)]
pub struct Session {
    stage: Stage,
    client_addr: SocketAddr,
    target: Option<TargetAddr>,
    /// Handshake bytes not yet parsed
    inbound: BytesMut,
    /// Post-handshake bytes waiting for the backend
    pending: BytesMut,
    backend_attached: bool,
    streaming: bool,
    client_eof: bool,
    sniffer: Sniffer,
    options: SessionOptions,
}

impl Session {
    /// Create a session for a freshly accepted client
    pub fn new(client_addr: SocketAddr, options: SessionOptions) -> Self {
        Session {
            stage: Stage::Greeting,
            client_addr,
            target: None,
            inbound: BytesMut::new(),
            pending: BytesMut::new(),
            backend_attached: false,
            streaming: false,
            client_eof: false,
            sniffer: Sniffer::new(options.max_sniff_bytes),
            options,
        }
    }

    /// Current stage
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Peer address of the client
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// Requested target, once the request was decoded
    pub fn target(&self) -> Option<&TargetAddr> {
        self.target.as_ref()
    }

    /// Traffic classification, once decided
    pub fn classification(&self) -> Option<Classification> {
        self.sniffer.classification()
    }

    /// Whether a backend is attached
    pub fn backend_attached(&self) -> bool {
        self.backend_attached
    }

    /// Bytes buffered for the backend
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the pending buffer was flushed and bytes now pass straight through
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Whether the client finished sending while its bytes are still held
    pub fn client_eof(&self) -> bool {
        self.client_eof
    }

    /// Handle bytes read from the client
    pub fn on_bytes_received(&mut self, bytes: &[u8]) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        match self.stage {
            Stage::Closed => {}
            Stage::Relaying => self.relay_bytes(bytes, &mut actions),
            Stage::Greeting | Stage::Negotiating => {
                self.inbound.extend_from_slice(bytes);
                self.advance_handshake(&mut actions);
            }
        }
        actions
    }

    /// The backend dial succeeded
    pub fn on_backend_attached(&mut self) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        if self.stage != Stage::Relaying || self.backend_attached {
            return actions;
        }
        self.backend_attached = true;
        self.try_flush(&mut actions);
        actions
    }

    /// The backend closed, or could not be dialed
    pub fn on_backend_closed(&mut self) -> Vec<SessionAction> {
        self.close(CloseReason::BackendClosed)
    }

    /// The client closed its side
    ///
    /// Bytes already held for the backend are still delivered: the sniffer
    /// decides on what it has, and the held bytes go out as soon as the
    /// backend is attached (at once if it already is). The driver must stop
    /// reading the client afterwards, see [`Session::client_eof`].
    pub fn on_client_closed(&mut self) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        if self.client_eof {
            return actions;
        }
        if self.stage == Stage::Relaying && !self.streaming && !self.pending.is_empty() {
            self.client_eof = true;
            let class = self.sniffer.finish(&self.pending);
            debug!("Classified traffic as {} at client close", class);
            self.try_flush(&mut actions);
            return actions;
        }
        self.close(CloseReason::ClientClosed)
    }

    fn advance_handshake(&mut self, actions: &mut Vec<SessionAction>) {
        if self.stage == Stage::Greeting {
            match parse_greeting(&self.inbound) {
                Ok(Decode::Incomplete { .. }) => return,
                Ok(Decode::Complete { value, consumed }) => {
                    debug!("Greeting offers methods {:?}", value.methods);
                    self.inbound.advance(consumed);
                    actions.push(SessionAction::Reply(Bytes::copy_from_slice(
                        &method_selection_reply(),
                    )));
                    self.stage = Stage::Negotiating;
                }
                Err(e) => {
                    actions.extend(self.reject(e));
                    return;
                }
            }
        }

        if self.stage == Stage::Negotiating {
            match parse_request(&self.inbound, &self.options.validator) {
                Ok(Decode::Incomplete { .. }) => {}
                Ok(Decode::Complete { value, consumed }) => {
                    self.inbound.advance(consumed);
                    info!("CONNECT {} from {}", value.target, self.client_addr);
                    actions.push(SessionAction::Reply(Bytes::copy_from_slice(
                        &success_reply(value.target.port()),
                    )));
                    actions.push(SessionAction::Dial(value.target.clone()));
                    self.target = Some(value.target);
                    self.stage = Stage::Relaying;

                    let rest = self.inbound.split();
                    if !rest.is_empty() {
                        self.relay_bytes(&rest, actions);
                    }
                }
                Err(e) => actions.extend(self.reject(e)),
            }
        }
    }

    fn relay_bytes(&mut self, bytes: &[u8], actions: &mut Vec<SessionAction>) {
        if bytes.is_empty() {
            return;
        }
        if self.streaming {
            actions.push(SessionAction::Forward(Bytes::copy_from_slice(bytes)));
            return;
        }

        self.pending.extend_from_slice(bytes);
        if self.pending.len() > self.options.max_pending_bytes {
            let len = self.pending.len();
            actions.extend(self.reject(ProtocolError::PendingOverflow(len)));
            return;
        }

        if self.sniffer.classification().is_none() {
            if let SniffOutcome::Decided(class) = self.sniffer.feed(&self.pending) {
                debug!("Classified traffic as {}", class);
            }
        }
        self.try_flush(actions);
    }

    fn try_flush(&mut self, actions: &mut Vec<SessionAction>) {
        if self.streaming || !self.backend_attached || self.sniffer.classification().is_none() {
            return;
        }
        self.streaming = true;
        let pending = self.pending.split().freeze();
        if !pending.is_empty() {
            actions.push(SessionAction::Forward(pending));
        }
    }

    fn reject(&mut self, error: ProtocolError) -> Vec<SessionAction> {
        warn!("Rejecting {} in {} stage: {}", self.client_addr, self.stage, error);
        self.close(CloseReason::Protocol(error))
    }

    fn close(&mut self, reason: CloseReason) -> Vec<SessionAction> {
        if self.stage == Stage::Closed {
            return Vec::new();
        }
        self.stage = Stage::Closed;
        self.backend_attached = false;
        self.pending.clear();
        self.inbound.clear();
        vec![SessionAction::Close(reason)]
    }
}
