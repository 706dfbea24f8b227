//! # Error Types
//!
//! Error handling for the remote-invocation stack.
//!
//! Every failure the codec, dispatcher, transports and client can produce is a
//! variant of [`ProtocolError`]. The variants fall into a small number of
//! categories that callers treat differently:
//!
//! ## Error Categories
//! - **Protocol errors**: malformed bytes or an exceeded codec ceiling
//! - **Configuration errors**: missing or duplicate handlers, privileged
//!   request types bound to ordinary handlers, unknown remote services
//! - **Remote execution errors**: the server-side handler ran and failed
//! - **Communication errors**: the request never reached the server or the
//!   answer never came back
//!
//! Authorization outcomes are *not* errors on the wire. They travel as
//! ordinary response values and only become [`ProtocolError::NotAuthorized`]
//! or [`ProtocolError::NotAuthenticated`] when a client-side
//! not-authorized handler decides so.
//!
//! ## Example Usage
//! ```rust
//! use wirecall::error::{ProtocolError, Result};
//! use tracing::error;
//!
//! fn lookup(name: &str) -> Result<u32> {
//!     Err(ProtocolError::HandlerNotFound(name.to_string()))
//! }
//!
//! if let Err(e) = lookup("com.example.Missing") {
//!     assert!(e.is_configuration());
//!     error!(error = %e, "dispatch failed");
//! }
//! ```

use std::fmt;
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Prefix shown to callers when a request could not be posted or executed
    pub const ERR_POST_FAILED: &str = "unable to post request to server";

    /// Protocol validation errors
    pub const ERR_TRAILING_BYTES: &str = "Trailing bytes after message";
    pub const ERR_UNEXPECTED_EOF: &str = "Unexpected end of message";

    /// Dispatch errors
    pub const ERR_UNTAGGED_REQUEST: &str = "Request is not a tagged object";
}

/// The codec ceiling that a payload exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ceiling {
    /// Total encoded size of one message
    MessageSize,
    /// Size of any single length-prefixed item or network frame
    FrameSize,
    /// Container nesting depth
    RecursionDepth,
}

impl fmt::Display for Ceiling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Ceiling::MessageSize => "max message size",
            Ceiling::FrameSize => "max frame size",
            Ceiling::RecursionDepth => "recursion depth",
        };
        f.write_str(name)
    }
}

// ProtocolError is the primary error type for all operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{ceiling} exceeded: {actual} > {limit}")]
    LimitExceeded {
        ceiling: Ceiling,
        limit: usize,
        actual: usize,
    },

    #[error("Invalid frame header")]
    InvalidHeader,

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("Compression failed")]
    CompressionFailure,

    #[error("Decompression failed")]
    DecompressionFailure,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No handler registered for request type {0}")]
    HandlerNotFound(String),

    #[error("Multiple handlers registered for request type {0}")]
    DuplicateHandler(String),

    #[error("No remote service registered for interface {0}")]
    UnknownService(String),

    #[error("{}: {message}", constants::ERR_POST_FAILED)]
    RemoteExecution { error_type: String, message: String },

    #[error("{}: {0}", constants::ERR_POST_FAILED)]
    Communication(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("{0}")]
    NotAuthorized(String),

    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Malformed bytes or an exceeded ceiling. Never retried.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            ProtocolError::Serialization(_)
                | ProtocolError::LimitExceeded { .. }
                | ProtocolError::InvalidHeader
                | ProtocolError::UnsupportedVersion(_)
                | ProtocolError::CompressionFailure
                | ProtocolError::DecompressionFailure
        )
    }

    /// Deployment or programming mistakes.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ProtocolError::ConfigError(_)
                | ProtocolError::HandlerNotFound(_)
                | ProtocolError::DuplicateHandler(_)
                | ProtocolError::UnknownService(_)
        )
    }

    /// The request never reached the server or the answer never came back.
    pub fn is_communication(&self) -> bool {
        matches!(
            self,
            ProtocolError::Communication(_) | ProtocolError::Io(_) | ProtocolError::Timeout
        )
    }

    /// Short stable name carried in server error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::Io(_) => "Io",
            ProtocolError::Serialization(_) => "Serialization",
            ProtocolError::LimitExceeded { .. } => "LimitExceeded",
            ProtocolError::InvalidHeader => "InvalidHeader",
            ProtocolError::UnsupportedVersion(_) => "UnsupportedVersion",
            ProtocolError::CompressionFailure => "CompressionFailure",
            ProtocolError::DecompressionFailure => "DecompressionFailure",
            ProtocolError::ConfigError(_) => "ConfigError",
            ProtocolError::HandlerNotFound(_) => "HandlerNotFound",
            ProtocolError::DuplicateHandler(_) => "DuplicateHandler",
            ProtocolError::UnknownService(_) => "UnknownService",
            ProtocolError::RemoteExecution { .. } => "RemoteExecution",
            ProtocolError::Communication(_) => "Communication",
            ProtocolError::Timeout => "Timeout",
            ProtocolError::NotAuthorized(_) => "NotAuthorized",
            ProtocolError::NotAuthenticated(_) => "NotAuthenticated",
            ProtocolError::Custom(_) => "Custom",
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
