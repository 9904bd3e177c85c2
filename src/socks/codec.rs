//! SOCKS5 address codec
//!
//! Decodes and encodes the `ATYP | ADDR | PORT` part shared by requests,
//! replies and the tunnel target header:
//!
//! ```text
//! +------+----------+----------+
//! | ATYP | DST.ADDR | DST.PORT |
//! +------+----------+----------+
//! |  1   | Variable |    2     |
//! +------+----------+----------+
//! ```
//!
//! Decoding works on a borrowed slice and never consumes anything itself.
//! A slice that is too short yields [`Decode::Incomplete`] with the number of
//! additional bytes known to be required, which is distinct from an error.

use super::consts::*;
use super::domain::DomainValidator;
use super::types::{AddressType, TargetAddr};
use crate::error::ProtocolError;
use bytes::{BufMut, BytesMut};
use std::net::{Ipv4Addr, Ipv6Addr};

const PORT_LEN: usize = 2;

/// Outcome of an incremental decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decode<T> {
    /// A full frame was decoded from the first `consumed` bytes
    Complete {
        /// Decoded value
        value: T,
        /// Number of input bytes the frame occupies
        consumed: usize,
    },
    /// At least `needed` more bytes must arrive before decoding can finish
    Incomplete {
        /// Minimum number of missing bytes
        needed: usize,
    },
}

impl<T> Decode<T> {
    /// Whether more input is required
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Decode::Incomplete { .. })
    }
}

/// Decode an address starting at the ATYP byte
pub fn decode_address(
    buf: &[u8],
    validator: &DomainValidator,
) -> Result<Decode<TargetAddr>, ProtocolError> {
    let Some(&atyp) = buf.first() else {
        return Ok(Decode::Incomplete { needed: 1 });
    };

    let addr_type =
        AddressType::from_byte(atyp).ok_or(ProtocolError::UnsupportedAddressType(atyp))?;

    match addr_type {
        AddressType::Ipv4 => {
            let total = 1 + 4 + PORT_LEN;
            if buf.len() < total {
                return Ok(Decode::Incomplete {
                    needed: total - buf.len(),
                });
            }
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&buf[1..5]);
            let port = read_port(&buf[5..total]);
            Ok(Decode::Complete {
                value: TargetAddr::ipv4(Ipv4Addr::from(octets), port),
                consumed: total,
            })
        }

        AddressType::Domain => {
            let Some(&len) = buf.get(1) else {
                return Ok(Decode::Incomplete { needed: 1 });
            };
            let domain_len = len as usize;
            if domain_len == 0 {
                return Err(ProtocolError::InvalidTarget(
                    "empty domain name".to_string(),
                ));
            }

            let total = 2 + domain_len + PORT_LEN;
            if buf.len() < total {
                return Ok(Decode::Incomplete {
                    needed: total - buf.len(),
                });
            }

            let domain = std::str::from_utf8(&buf[2..2 + domain_len])
                .map_err(|_| ProtocolError::InvalidTarget("domain is not UTF-8".to_string()))?;
            if !validator.is_valid(domain) {
                return Err(ProtocolError::InvalidTarget(domain.to_string()));
            }

            let port = read_port(&buf[2 + domain_len..total]);
            Ok(Decode::Complete {
                value: TargetAddr::domain(domain, port),
                consumed: total,
            })
        }

        AddressType::Ipv6 => {
            let total = 1 + 16 + PORT_LEN;
            if buf.len() < total {
                return Ok(Decode::Incomplete {
                    needed: total - buf.len(),
                });
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[1..17]);
            let port = read_port(&buf[17..total]);
            Ok(Decode::Complete {
                value: TargetAddr::ipv6(Ipv6Addr::from(octets), port),
                consumed: total,
            })
        }
    }
}

/// Encode an address as `ATYP | ADDR | PORT`
pub fn encode_address(addr: &TargetAddr, out: &mut BytesMut) -> Result<(), ProtocolError> {
    match addr {
        TargetAddr::Ip(std::net::SocketAddr::V4(v4)) => {
            out.put_u8(SOCKS5_ADDR_TYPE_IPV4);
            out.put_slice(&v4.ip().octets());
            out.put_u16(v4.port());
        }
        TargetAddr::Ip(std::net::SocketAddr::V6(v6)) => {
            out.put_u8(SOCKS5_ADDR_TYPE_IPV6);
            out.put_slice(&v6.ip().octets());
            out.put_u16(v6.port());
        }
        TargetAddr::Domain(domain, port) => {
            if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
                return Err(ProtocolError::InvalidTarget(domain.clone()));
            }
            out.put_u8(SOCKS5_ADDR_TYPE_DOMAIN);
            out.put_u8(domain.len() as u8);
            out.put_slice(domain.as_bytes());
            out.put_u16(*port);
        }
    }
    Ok(())
}

/// Encoded length of an address
pub fn encoded_len(addr: &TargetAddr) -> usize {
    match addr {
        TargetAddr::Ip(std::net::SocketAddr::V4(_)) => 1 + 4 + PORT_LEN,
        TargetAddr::Ip(std::net::SocketAddr::V6(_)) => 1 + 16 + PORT_LEN,
        TargetAddr::Domain(domain, _) => 2 + domain.len() + PORT_LEN,
    }
}

fn read_port(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(buf: &[u8]) -> Result<Decode<TargetAddr>, ProtocolError> {
        decode_address(buf, &DomainValidator::default())
    }

    fn encode(addr: &TargetAddr) -> Vec<u8> {
        let mut out = BytesMut::new();
        encode_address(addr, &mut out).unwrap();
        out.to_vec()
    }

    #[test]
    fn test_decode_ipv4() {
        let buf = [SOCKS5_ADDR_TYPE_IPV4, 192, 168, 1, 1, 0x1F, 0x90];
        let decoded = decode(&buf).unwrap();
        assert_eq!(
            decoded,
            Decode::Complete {
                value: TargetAddr::ipv4(Ipv4Addr::new(192, 168, 1, 1), 8080),
                consumed: 7,
            }
        );
    }

    #[test]
    fn test_decode_domain() {
        let mut buf = vec![SOCKS5_ADDR_TYPE_DOMAIN, 11];
        buf.extend_from_slice(b"example.com");
        buf.extend_from_slice(&443u16.to_be_bytes());

        match decode(&buf).unwrap() {
            Decode::Complete { value, consumed } => {
                assert_eq!(value, TargetAddr::domain("example.com", 443));
                assert_eq!(value.addr_type(), AddressType::Domain);
                assert_eq!(consumed, buf.len());
            }
            other => panic!("Expected complete decode, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_ipv6() {
        let mut buf = vec![SOCKS5_ADDR_TYPE_IPV6];
        buf.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        buf.extend_from_slice(&80u16.to_be_bytes());

        match decode(&buf).unwrap() {
            Decode::Complete { value, consumed } => {
                assert_eq!(value, TargetAddr::ipv6(Ipv6Addr::LOCALHOST, 80));
                assert_eq!(consumed, 19);
            }
            other => panic!("Expected complete decode, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let buf = [SOCKS5_ADDR_TYPE_IPV4, 10, 0, 0, 1, 0, 80, 0xAA, 0xBB];
        match decode(&buf).unwrap() {
            Decode::Complete { consumed, .. } => assert_eq!(consumed, 7),
            other => panic!("Expected complete decode, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_incomplete_reports_needed() {
        assert_eq!(decode(&[]).unwrap(), Decode::Incomplete { needed: 1 });
        assert_eq!(
            decode(&[SOCKS5_ADDR_TYPE_IPV4, 10, 0]).unwrap(),
            Decode::Incomplete { needed: 4 }
        );
        assert_eq!(
            decode(&[SOCKS5_ADDR_TYPE_DOMAIN]).unwrap(),
            Decode::Incomplete { needed: 1 }
        );
        assert_eq!(
            decode(&[SOCKS5_ADDR_TYPE_DOMAIN, 11, b'e', b'x']).unwrap(),
            Decode::Incomplete { needed: 11 }
        );
        assert_eq!(
            decode(&[SOCKS5_ADDR_TYPE_IPV6, 0, 0]).unwrap(),
            Decode::Incomplete { needed: 16 }
        );
    }

    #[test]
    fn test_decode_unsupported_type() {
        assert_eq!(
            decode(&[0x02, 1, 2, 3, 4, 0, 80]),
            Err(ProtocolError::UnsupportedAddressType(0x02))
        );
        assert_eq!(
            decode(&[0xFF]),
            Err(ProtocolError::UnsupportedAddressType(0xFF))
        );
    }

    #[test]
    fn test_decode_invalid_domain() {
        for name in ["bad domain.com", "com", "-x.example.com"] {
            let mut buf = vec![SOCKS5_ADDR_TYPE_DOMAIN, name.len() as u8];
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(&80u16.to_be_bytes());
            assert!(matches!(
                decode(&buf),
                Err(ProtocolError::InvalidTarget(_))
            ));
        }
    }

    #[test]
    fn test_decode_empty_and_non_utf8_domain() {
        assert!(matches!(
            decode(&[SOCKS5_ADDR_TYPE_DOMAIN, 0, 0, 80]),
            Err(ProtocolError::InvalidTarget(_))
        ));
        assert!(matches!(
            decode(&[SOCKS5_ADDR_TYPE_DOMAIN, 2, 0xC3, 0x28, 0, 80]),
            Err(ProtocolError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_encode_matches_wire_bytes() {
        let mut wire = vec![SOCKS5_ADDR_TYPE_DOMAIN, 11];
        wire.extend_from_slice(b"example.com");
        wire.extend_from_slice(&[0x01, 0xBB]);

        let addr = match decode(&wire).unwrap() {
            Decode::Complete { value, .. } => value,
            other => panic!("Expected complete decode, got {:?}", other),
        };
        assert_eq!(encode(&addr), wire);
        assert_eq!(encoded_len(&addr), wire.len());

        let wire = [SOCKS5_ADDR_TYPE_IPV4, 1, 2, 3, 4, 0x00, 0x50];
        let addr = TargetAddr::ipv4(Ipv4Addr::new(1, 2, 3, 4), 80);
        assert_eq!(encode(&addr), wire);
    }

    #[test]
    fn test_encode_rejects_oversized_domain() {
        let addr = TargetAddr::domain("a".repeat(256), 80);
        let mut out = BytesMut::new();
        assert!(encode_address(&addr, &mut out).is_err());
    }
}
