//! Error taxonomy.
//!
//! Transient I/O (`WouldBlock`) never shows up here: the client loops absorb
//! it. Everything that does reach an [`Error`] is fatal for the current run.

use crate::address::AddressError;
use crate::config::ConfigError;
use crate::protocol::{MessageType, Sizes};
use std::io;
use thiserror::Error;

/// Violations of the wire protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("truncated header: got {got} bytes, need {need}")]
    Truncated { got: usize, need: usize },

    #[error("bad magic 0x{0:08x}")]
    BadMagic(u32),

    #[error("unknown message type {0}")]
    UnknownType(u8),

    #[error("unexpected message type: expected {expected:?}, got {got:?}")]
    UnexpectedType {
        expected: MessageType,
        got: MessageType,
    },

    #[error("short message: got {got} bytes, expected {expected}")]
    ShortMessage { got: usize, expected: usize },

    #[error("response dlen {got} does not match negotiated size {expected}")]
    LengthMismatch { got: u16, expected: u16 },

    #[error("server acknowledged {echoed:?}, requested {requested:?}")]
    SizeMismatch { requested: Sizes, echoed: Sizes },

    #[error("response for request {0} that is not in flight")]
    UnknownRequest(u32),
}

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("usage: {0}")]
    Usage(String),

    #[error("{op}: {source}")]
    Protocol {
        op: &'static str,
        #[source]
        source: ProtocolError,
    },

    #[error("{op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// Failure of the server's listening socket rather than of a session.
    #[error("{op}: {source}")]
    Listener {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("checksum failed: sent {sent} =/= received {received}")]
    Integrity { sent: u32, received: u32 },

    #[error("run finished with {completed} of {expected} samples")]
    Incomplete { expected: u32, completed: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Address(#[from] AddressError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn protocol(op: &'static str, source: ProtocolError) -> Self {
        Error::Protocol { op, source }
    }

    pub fn io(op: &'static str, source: io::Error) -> Self {
        Error::Io { op, source }
    }

    pub fn listener(op: &'static str, source: io::Error) -> Self {
        Error::Listener { op, source }
    }

    /// The protocol violation behind this error, if any.
    pub fn as_protocol(&self) -> Option<&ProtocolError> {
        match self {
            Error::Protocol { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Attach an operation name to an I/O result.
pub trait IoContext<T> {
    fn during(self, op: &'static str) -> Result<T>;

    /// Like `during`, for operations on a server's listening socket.
    fn on_listener(self, op: &'static str) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn during(self, op: &'static str) -> Result<T> {
        self.map_err(|e| Error::io(op, e))
    }

    fn on_listener(self, op: &'static str) -> Result<T> {
        self.map_err(|e| Error::listener(op, e))
    }
}

/// Returns true for errors that only mean "try again later".
pub fn is_transient(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
}
