//! Error types

use std::io;
use thiserror::Error;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying I/O failure while dialing
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// TLS setup failure (certificates, server name)
    #[error("tls error: {0}")]
    Tls(String),

    /// The connection can no longer be used.
    ///
    /// Returned for every read or write failure on an established connection,
    /// whatever the underlying cause. The connection has already been closed.
    /// `transferred` is the number of bytes moved by the failing call before
    /// the failure.
    #[error("bad connection")]
    BadConn {
        /// Bytes copied or sent before the failure
        transferred: usize,
    },
}

impl Error {
    /// Whether this is the canonical unusable-connection signal
    pub fn is_bad_conn(&self) -> bool {
        matches!(self, Error::BadConn { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
