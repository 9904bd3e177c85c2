//! Protocol sniffing for relayed traffic
//!
//! Looks at the first bytes a client sends after the SOCKS5 handshake and
//! classifies them as a plain HTTP/1.1 request, a WebSocket upgrade request,
//! or opaque bytes (TLS, anything else). The result is advisory: it is logged
//! and kept on the session, the relayed bytes are never changed.

use std::fmt;

/// Header slots handed to `httparse`
const MAX_HEADERS: usize = 64;

/// Default number of bytes inspected before giving up on a complete header block
pub const DEFAULT_MAX_SNIFF_BYTES: usize = 8192;

/// Traffic class of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// HTTP/1.1 request without a WebSocket upgrade
    HttpLike,
    /// HTTP/1.1 WebSocket upgrade request
    WebSocketLike,
    /// Anything else, relayed as opaque bytes
    Unknown,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::HttpLike => write!(f, "http"),
            Classification::WebSocketLike => write!(f, "websocket"),
            Classification::Unknown => write!(f, "opaque"),
        }
    }
}

/// Request head recovered while sniffing
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpHead {
    /// Request method
    pub method: String,
    /// Request target
    pub path: String,
    /// Header name/value pairs in arrival order
    pub headers: Vec<(String, String)>,
}

impl HttpHead {
    /// First header value with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the header set describes a WebSocket upgrade
    pub fn is_websocket_upgrade(&self) -> bool {
        let upgrade = self
            .header("Upgrade")
            .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
            .unwrap_or(false);
        let connection = self
            .header("Connection")
            .map(|v| {
                v.split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
            })
            .unwrap_or(false);

        upgrade
            && connection
            && self.header("Sec-WebSocket-Version").is_some()
            && self.header("Sec-WebSocket-Key").is_some()
    }
}

/// Result of feeding bytes to a [`Sniffer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SniffOutcome {
    /// More bytes are needed before deciding
    Pending,
    /// Classification is final
    Decided(Classification),
}

/// Incremental classifier, one per session
///
/// Feed it the whole accumulated buffer each time; once a decision is made
/// it sticks and later calls return the same answer without looking at the
/// input again.
#[derive(Debug, Clone)]
pub struct Sniffer {
    max_bytes: usize,
    decided: Option<Classification>,
    head: Option<HttpHead>,
}

impl Default for Sniffer {
    fn default() -> Self {
        Sniffer::new(DEFAULT_MAX_SNIFF_BYTES)
    }
}

impl Sniffer {
    /// Create a sniffer that decides after at most `max_bytes` bytes
    pub fn new(max_bytes: usize) -> Self {
        Sniffer {
            max_bytes: max_bytes.max(1),
            decided: None,
            head: None,
        }
    }

    /// Inspect the accumulated buffer
    pub fn feed(&mut self, buf: &[u8]) -> SniffOutcome {
        if let Some(class) = self.decided {
            return SniffOutcome::Decided(class);
        }

        let exhausted = buf.len() >= self.max_bytes;
        match inspect(buf, exhausted) {
            Inspection::Pending => SniffOutcome::Pending,
            Inspection::Decided(class, head) => {
                self.decided = Some(class);
                self.head = head;
                SniffOutcome::Decided(class)
            }
        }
    }

    /// Force a decision with whatever has been seen, e.g. when the client
    /// half-closes before a full header block arrived
    pub fn finish(&mut self, buf: &[u8]) -> Classification {
        if let Some(class) = self.decided {
            return class;
        }
        let class = match inspect(buf, true) {
            Inspection::Decided(class, head) => {
                self.head = head;
                class
            }
            Inspection::Pending => Classification::Unknown,
        };
        self.decided = Some(class);
        class
    }

    /// Classification, once decided
    pub fn classification(&self) -> Option<Classification> {
        self.decided
    }

    /// Parsed request head, when the traffic was HTTP with a complete header block
    pub fn head(&self) -> Option<&HttpHead> {
        self.head.as_ref()
    }
}

/// One-shot classification of a buffer
///
/// An HTTP/1.1 request line followed by an incomplete header block counts as
/// [`Classification::HttpLike`].
pub fn classify(buf: &[u8]) -> Classification {
    match inspect(buf, true) {
        Inspection::Decided(class, _) => class,
        Inspection::Pending => Classification::Unknown,
    }
}

enum Inspection {
    Pending,
    Decided(Classification, Option<HttpHead>),
}

enum RequestLine {
    Incomplete,
    Http11,
    NotHttp,
}

fn inspect(buf: &[u8], exhausted: bool) -> Inspection {
    match request_line(buf) {
        RequestLine::NotHttp => Inspection::Decided(Classification::Unknown, None),
        RequestLine::Incomplete if exhausted => {
            Inspection::Decided(Classification::Unknown, None)
        }
        RequestLine::Incomplete => Inspection::Pending,
        RequestLine::Http11 => {
            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut req = httparse::Request::new(&mut headers);
            match req.parse(buf) {
                Ok(httparse::Status::Complete(_)) => {
                    let head = HttpHead {
                        method: req.method.unwrap_or_default().to_string(),
                        path: req.path.unwrap_or_default().to_string(),
                        headers: req
                            .headers
                            .iter()
                            .map(|h| {
                                (
                                    h.name.to_string(),
                                    String::from_utf8_lossy(h.value).into_owned(),
                                )
                            })
                            .collect(),
                    };
                    let class = if head.is_websocket_upgrade() {
                        Classification::WebSocketLike
                    } else {
                        Classification::HttpLike
                    };
                    Inspection::Decided(class, Some(head))
                }
                Ok(httparse::Status::Partial) if !exhausted => Inspection::Pending,
                Ok(httparse::Status::Partial) | Err(_) => {
                    Inspection::Decided(Classification::HttpLike, None)
                }
            }
        }
    }
}

/// Check for `<METHOD> <path> HTTP/1.1` at the start of the buffer
fn request_line(buf: &[u8]) -> RequestLine {
    let line_end = buf.iter().position(|&b| b == b'\n');
    let line = match line_end {
        Some(pos) => &buf[..pos],
        None => buf,
    };
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    if !line.iter().all(|b| (0x20..0x7F).contains(b)) {
        return RequestLine::NotHttp;
    }
    if line.first().map_or(false, |b| !b.is_ascii_uppercase()) {
        return RequestLine::NotHttp;
    }

    if line_end.is_none() {
        // Still could turn into a request line, unless the method is already broken
        let method_end = line.iter().position(|&b| b == b' ').unwrap_or(line.len());
        if !line[..method_end].iter().all(u8::is_ascii_uppercase) {
            return RequestLine::NotHttp;
        }
        return RequestLine::Incomplete;
    }

    let mut parts = line.split(|&b| b == b' ');
    let (Some(method), Some(path), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return RequestLine::NotHttp;
    };

    if method.is_empty() || !method.iter().all(u8::is_ascii_uppercase) || path.is_empty() {
        return RequestLine::NotHttp;
    }
    if version != b"HTTP/1.1" {
        return RequestLine::NotHttp;
    }
    RequestLine::Http11
}

#[cfg(test)]
mod tests {
    use super::*;

    const WS_REQUEST: &[u8] = b"GET / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: abc\r\nSec-WebSocket-Version: 13\r\n\r\n";
    const HTTP_REQUEST: &[u8] = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

    fn tls_client_hello() -> Vec<u8> {
        let mut hello = vec![0x16, 0x03, 0x01, 0x00, 0x2e, 0x01, 0x00, 0x00, 0x2a, 0x03, 0x03];
        hello.extend_from_slice(&[0xAB; 32]);
        hello.extend_from_slice(&[0x00, 0x00, 0x02, 0x13, 0x01, 0x01, 0x00]);
        hello
    }

    #[test]
    fn test_classify_websocket() {
        assert_eq!(classify(WS_REQUEST), Classification::WebSocketLike);
    }

    #[test]
    fn test_classify_http() {
        assert_eq!(classify(HTTP_REQUEST), Classification::HttpLike);
    }

    #[test]
    fn test_classify_tls_client_hello() {
        assert_eq!(classify(&tls_client_hello()), Classification::Unknown);
    }

    #[test]
    fn test_classify_connection_keep_alive_upgrade() {
        let req = b"GET /chat HTTP/1.1\r\nHost: example.com\r\nUpgrade: WebSocket\r\nConnection: keep-alive, Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";
        assert_eq!(classify(req), Classification::WebSocketLike);
    }

    #[test]
    fn test_classify_websocket_needs_all_headers() {
        let missing_key = b"GET / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Version: 13\r\n\r\n";
        assert_eq!(classify(missing_key), Classification::HttpLike);

        let no_connection = b"GET / HTTP/1.1\r\nUpgrade: websocket\r\nSec-WebSocket-Key: abc\r\nSec-WebSocket-Version: 13\r\n\r\n";
        assert_eq!(classify(no_connection), Classification::HttpLike);
    }

    #[test]
    fn test_classify_other_http_versions_are_opaque() {
        assert_eq!(
            classify(b"GET / HTTP/1.0\r\nHost: a.com\r\n\r\n"),
            Classification::Unknown
        );
        assert_eq!(classify(b"hello world\r\n"), Classification::Unknown);
    }

    #[test]
    fn test_classify_incomplete_headers_is_http() {
        assert_eq!(
            classify(b"POST /submit HTTP/1.1\r\nHost: exa"),
            Classification::HttpLike
        );
    }

    #[test]
    fn test_sniffer_waits_for_header_block() {
        let mut sniffer = Sniffer::default();
        assert_eq!(sniffer.feed(b"GE"), SniffOutcome::Pending);
        assert_eq!(sniffer.feed(b"GET / HTTP/1.1\r\nUpgrade: websocket\r\n"), SniffOutcome::Pending);
        assert_eq!(
            sniffer.feed(WS_REQUEST),
            SniffOutcome::Decided(Classification::WebSocketLike)
        );
        assert_eq!(sniffer.head().unwrap().method, "GET");
        assert_eq!(sniffer.head().unwrap().header("sec-websocket-key"), Some("abc"));
    }

    #[test]
    fn test_sniffer_decides_binary_immediately() {
        let mut sniffer = Sniffer::default();
        assert_eq!(
            sniffer.feed(&tls_client_hello()[..3]),
            SniffOutcome::Decided(Classification::Unknown)
        );
    }

    #[test]
    fn test_sniffer_decision_is_sticky() {
        let mut sniffer = Sniffer::default();
        assert_eq!(
            sniffer.feed(HTTP_REQUEST),
            SniffOutcome::Decided(Classification::HttpLike)
        );
        assert_eq!(
            sniffer.feed(WS_REQUEST),
            SniffOutcome::Decided(Classification::HttpLike)
        );
        assert_eq!(sniffer.finish(&tls_client_hello()), Classification::HttpLike);
        assert_eq!(sniffer.classification(), Some(Classification::HttpLike));
    }

    #[test]
    fn test_sniffer_gives_up_after_limit() {
        let mut sniffer = Sniffer::new(32);
        let mut req = b"GET / HTTP/1.1\r\nX-Pad: ".to_vec();
        req.extend_from_slice(&[b'a'; 40]);
        assert_eq!(
            sniffer.feed(&req),
            SniffOutcome::Decided(Classification::HttpLike)
        );

        let mut sniffer = Sniffer::new(8);
        assert_eq!(
            sniffer.feed(b"GETXXXXXXXXXXX"),
            SniffOutcome::Decided(Classification::Unknown)
        );
    }

    #[test]
    fn test_sniffer_finish_without_decision() {
        let mut sniffer = Sniffer::default();
        assert_eq!(sniffer.feed(b"GET /"), SniffOutcome::Pending);
        assert_eq!(sniffer.finish(b"GET /"), Classification::Unknown);
    }
}
