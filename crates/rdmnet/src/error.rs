// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Errors returned by RDMnet operations.
//!
//! One crate-level [`Error`] enum covers the local API surface; wire parse
//! failures use the value-typed [`ParseError`](crate::protocol::ParseError)
//! instead, because a malformed peer message is data, not a fault in the
//! caller's request.

use std::io;

/// Errors returned by RDMnet operations.
///
/// # Example
///
/// ```rust,no_run
/// use rdmnet::{Error, conn::ConnectionTable, runtime::Runtime};
///
/// let rt = Runtime::new().unwrap();
/// let conns = ConnectionTable::new(rt.handle(), None);
/// match conns.send(9999, b"...") {
///     Err(Error::NotFound) => println!("no such connection"),
///     other => println!("{:?}", other),
/// }
/// ```
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Caller Errors
    // ========================================================================
    /// An argument was out of range, empty where required, or the entity is
    /// in the wrong state for the operation.
    Invalid,
    /// The handle does not exist or has already been destroyed.
    NotFound,
    /// A CID or UID is already present in the registry.
    AlreadyExists,

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// A capacity limit was reached (static-limits mode) or allocation failed.
    NoMem,
    /// The send queue is full in non-blocking mode; retry later.
    WouldBlock,

    // ========================================================================
    // Protocol and Transport Errors
    // ========================================================================
    /// Malformed wire data or a failed RDM checksum.
    Proto,
    /// The peer closed the connection.
    ConnClosed,
    /// An OS socket error.
    Sys(io::Error),
    /// A handshake or heartbeat timer expired.
    Timeout,

    // ========================================================================
    // Other
    // ========================================================================
    /// The feature is compiled out or not yet available.
    NotImplemented,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Invalid => write!(f, "Invalid argument or state"),
            Error::NotFound => write!(f, "Handle not found"),
            Error::AlreadyExists => write!(f, "Entry already exists"),
            Error::NoMem => write!(f, "Out of memory or capacity limit reached"),
            Error::WouldBlock => write!(f, "Operation would block"),
            Error::Proto => write!(f, "Protocol error"),
            Error::ConnClosed => write!(f, "Connection closed by peer"),
            Error::Sys(e) => write!(f, "System error: {}", e),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::NotImplemented => write!(f, "Not implemented"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Sys(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock => Error::WouldBlock,
            io::ErrorKind::TimedOut => Error::Timeout,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => Error::ConnClosed,
            _ => Error::Sys(e),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let e: Error = io::Error::new(io::ErrorKind::WouldBlock, "wb").into();
        assert!(matches!(e, Error::WouldBlock));

        let e: Error = io::Error::new(io::ErrorKind::ConnectionReset, "rst").into();
        assert!(matches!(e, Error::ConnClosed));

        let e: Error = io::Error::new(io::ErrorKind::AddrInUse, "addr").into();
        assert!(matches!(e, Error::Sys(_)));
    }

    #[test]
    fn test_display_is_stable() {
        assert_eq!(Error::NotFound.to_string(), "Handle not found");
        assert_eq!(Error::Proto.to_string(), "Protocol error");
    }
}
