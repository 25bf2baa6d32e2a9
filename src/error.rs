//! Error types for the handshake stack.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for stack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing, building or exchanging frames.
#[derive(Debug, Error)]
pub enum Error {
    /// An address string did not split into the expected number of parts.
    #[error("failed to parse address {input:?}: expected {expected} parts, found {found}")]
    DelimiterCount {
        input: String,
        expected: usize,
        found: usize,
    },

    /// One part of an address string is not an octet in the format's radix.
    #[error("failed to parse address part {part:?}: not an octet")]
    InvalidOctet { part: String },

    /// A buffer is too short for the structure being decoded.
    #[error("invalid data size: {actual} (need {needed})")]
    Truncated { needed: usize, actual: usize },

    /// The operating system rejected a socket or ioctl call.
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    /// A bounded receive elapsed without a frame.
    #[error("no frame received within {0:?}")]
    Timeout(Duration),

    /// The receive was cancelled through its token.
    #[error("receive cancelled")]
    Cancelled,

    /// A packet would not fit the 16-bit IPv4 total length.
    #[error("packet body of {len} bytes exceeds the limit of {max}")]
    Oversized { len: usize, max: usize },

    /// Command line or session configuration is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Capture `errno` of the last failed libc call.
    pub(crate) fn last_os(context: &'static str) -> Self {
        Error::Io {
            context,
            source: io::Error::last_os_error(),
        }
    }

    pub(crate) fn io(context: &'static str, source: io::Error) -> Self {
        Error::Io { context, source }
    }

    /// Check a buffer holds at least `needed` bytes.
    pub(crate) fn check_len(data: &[u8], needed: usize) -> Result<()> {
        if data.len() < needed {
            return Err(Error::Truncated {
                needed,
                actual: data.len(),
            });
        }
        Ok(())
    }
}
