//! SOCKS5 greeting and request parsing
//!
//! Both parsers work on an accumulating buffer and report
//! [`Decode::Incomplete`] until the whole frame is present. Nothing is
//! consumed here; the caller advances its buffer by `consumed`.

use super::codec::{decode_address, Decode};
use super::consts::*;
use super::domain::DomainValidator;
use super::types::{SocksCommand, TargetAddr};
use crate::error::ProtocolError;

/// Method negotiation message
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    /// Methods offered by the client
    pub methods: Vec<u8>,
}

/// CONNECT-style request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Requested command
    pub command: SocksCommand,
    /// Requested destination
    pub target: TargetAddr,
}

/// Parse a method negotiation message
pub fn parse_greeting(buf: &[u8]) -> Result<Decode<Greeting>, ProtocolError> {
    let Some(&version) = buf.first() else {
        return Ok(Decode::Incomplete {
            needed: GREETING_HEADER_LEN,
        });
    };
    if version != SOCKS5_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let Some(&nmethods) = buf.get(1) else {
        return Ok(Decode::Incomplete { needed: 1 });
    };

    let total = GREETING_HEADER_LEN + nmethods as usize;
    if buf.len() < total {
        return Ok(Decode::Incomplete {
            needed: total - buf.len(),
        });
    }

    Ok(Decode::Complete {
        value: Greeting {
            methods: buf[GREETING_HEADER_LEN..total].to_vec(),
        },
        consumed: total,
    })
}

/// Parse a SOCKS5 request
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// Only CONNECT is accepted. The command byte is checked as soon as it
/// arrives so BIND and UDP ASSOCIATE are refused without waiting for the
/// address.
/// A non-zero RSV byte is a malformed request.
pub fn parse_request(
    buf: &[u8],
    validator: &DomainValidator,
) -> Result<Decode<Request>, ProtocolError> {
    let Some(&version) = buf.first() else {
        return Ok(Decode::Incomplete {
            needed: REQUEST_HEADER_LEN,
        });
    };
    if version != SOCKS5_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let Some(&cmd_byte) = buf.get(1) else {
        return Ok(Decode::Incomplete {
            needed: REQUEST_HEADER_LEN - 1,
        });
    };
    let command = match SocksCommand::from_byte(cmd_byte) {
        Some(SocksCommand::Connect) => SocksCommand::Connect,
        _ => return Err(ProtocolError::UnsupportedCommand(cmd_byte)),
    };

    match buf.get(2) {
        None => {
            return Ok(Decode::Incomplete {
                needed: REQUEST_HEADER_LEN - buf.len(),
            })
        }
        Some(&SOCKS5_RESERVED) => {}
        Some(&rsv) => {
            return Err(ProtocolError::Malformed(format!(
                "reserved byte is {:#04x}",
                rsv
            )))
        }
    }
    if buf.len() < REQUEST_HEADER_LEN {
        return Ok(Decode::Incomplete {
            needed: REQUEST_HEADER_LEN - buf.len(),
        });
    }

    let decoded = decode_address(&buf[REQUEST_HEADER_LEN - 1..], validator)?;
    Ok(match decoded {
        Decode::Complete { value, consumed } => Decode::Complete {
            value: Request {
                command,
                target: value,
            },
            consumed: REQUEST_HEADER_LEN - 1 + consumed,
        },
        Decode::Incomplete { needed } => Decode::Incomplete { needed },
    })
}

/// Method selection reply: version 5, no authentication
pub fn method_selection_reply() -> [u8; 2] {
    [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE]
}

/// Fixed success reply sent right after a CONNECT request is decoded
///
/// The bound address is always `0.0.0.0`; the requested port is echoed.
/// The reply goes out before the backend dial, so a failed dial shows up
/// to the client as a reset rather than a SOCKS error code.
pub fn success_reply(port: u16) -> [u8; SUCCESS_REPLY_LEN] {
    let [hi, lo] = port.to_be_bytes();
    [
        SOCKS5_VERSION,
        SOCKS5_REPLY_SUCCEEDED,
        SOCKS5_RESERVED,
        SOCKS5_ADDR_TYPE_IPV4,
        0,
        0,
        0,
        0,
        hi,
        lo,
    ]
}
