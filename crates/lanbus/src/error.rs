// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-level error type.
//!
//! Synchronous setup failures (configuration, address resolution, interface
//! enumeration) surface through this enum; errors inside spawned sender and
//! receiver threads are logged and never propagated.

use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Errors returned by the public bus API.
#[derive(Debug)]
pub enum Error {
    /// No handlers registered before starting receivers.
    EmptyHandlerTable,
    /// Multicast group address did not resolve to an IPv4 endpoint.
    AddrResolve(String),
    /// Resolved group address is not an IPv4 multicast address.
    NotMulticast(SocketAddr),
    /// MTU too small to carry a fragment header plus any payload.
    InvalidMtu(usize),
    /// Network interface enumeration failed.
    Interfaces(io::Error),
    /// I/O error with underlying cause.
    Io(io::Error),
    /// Wire record encoding or decoding failed.
    Serialization(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyHandlerTable => write!(
                f,
                "handler table is empty - did you forget to call lanbus::init()?"
            ),
            Error::AddrResolve(addr) => {
                write!(f, "failed to resolve multicast address '{}'", addr)
            }
            Error::NotMulticast(addr) => {
                write!(f, "'{}' is not an IPv4 multicast address", addr)
            }
            Error::InvalidMtu(mtu) => write!(
                f,
                "MTU {} leaves no room for fragment payload (overhead is {})",
                mtu,
                crate::config::FRAGMENT_OVERHEAD
            ),
            Error::Interfaces(e) => write!(f, "failed to list network interfaces: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Serialization(e) => write!(f, "serialization failed: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Interfaces(e) | Error::Io(e) => Some(e),
            Error::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e)
    }
}

/// Convenient alias for API results using the public `Error` type.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mentions_init_hint() {
        let msg = Error::EmptyHandlerTable.to_string();
        assert!(msg.contains("lanbus::init"), "got: {}", msg);
    }

    #[test]
    fn test_io_error_source_preserved() {
        let inner = io::Error::new(io::ErrorKind::ConnectionRefused, "boom");
        let err = Error::from(inner);
        let source = std::error::Error::source(&err).expect("io error should carry a source");
        assert!(source.to_string().contains("boom"));
    }

    #[test]
    fn test_invalid_mtu_names_overhead() {
        let msg = Error::InvalidMtu(64).to_string();
        assert!(msg.contains("64"));
        assert!(msg.contains("100"));
    }
}
