//! Error types for the spool pipeline.
//!
//! The taxonomy follows where an error can be recovered:
//! - per-buffer failures ([`Error::CodecProcess`]) are recovered in place by
//!   discarding the buffer and continuing the stream;
//! - negotiation failures ([`Error::FormatMismatch`],
//!   [`Error::MissingRequiredKey`]) are local and let the caller try another
//!   provider;
//! - topology and lifecycle failures ([`Error::UnsupportedFormat`],
//!   [`Error::Container`], [`Error::Lifecycle`]) are terminal and surfaced.

use thiserror::Error;

/// Main error type for the spool pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Two descriptors could not be negotiated.
    #[error("Format mismatch: {0}")]
    FormatMismatch(String),

    /// A descriptor lacks keys the caller requires.
    #[error("Missing required format keys: {}", keys.join(", "))]
    MissingRequiredKey {
        /// Every absent key, in the order requested.
        keys: Vec<String>,
    },

    /// No provider implements the requested transition.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A single buffer could not be processed.
    #[error("Codec error: {0}")]
    CodecProcess(#[from] CodecError),

    /// Container storage or structure failure.
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    /// A lifecycle hook failed; the owning session is closed.
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// Invalid parameter provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Container errors.
#[derive(Error, Debug)]
pub enum ContainerError {
    /// Underlying storage failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or corrupted container structure.
    #[error("Invalid container structure: {0}")]
    InvalidStructure(String),

    /// Missing required chunk/atom.
    #[error("Missing required element: {0}")]
    MissingElement(String),

    /// Track index out of range.
    #[error("Track {index} not found")]
    TrackNotFound {
        /// Requested track index.
        index: usize,
    },

    /// The container has been closed.
    #[error("Container is closed")]
    Closed,

    /// Seek operation failed or is unsupported.
    #[error("Seek failed: {0}")]
    SeekFailed(String),

    /// A write arrived for a track in a state that cannot accept it.
    #[error("Track configuration error: {0}")]
    TrackConfig(String),
}

/// Per-buffer codec errors.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The encoded data is malformed.
    #[error("Corrupt data at offset {offset}: {message}")]
    Corrupt {
        /// Byte offset into the payload.
        offset: usize,
        /// What was wrong.
        message: String,
    },

    /// A delta frame arrived without its reference frame.
    #[error("Missing reference frame before sequence {sequence}")]
    MissingReference {
        /// Sequence number of the orphaned delta.
        sequence: u64,
    },

    /// The codec was used before negotiation completed.
    #[error("Codec not configured")]
    NotConfigured,

    /// Generic codec error message.
    #[error("{0}")]
    Other(String),
}

impl From<&str> for CodecError {
    fn from(s: &str) -> Self {
        CodecError::Other(s.to_string())
    }
}

impl From<String> for CodecError {
    fn from(s: String) -> Self {
        CodecError::Other(s)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Container(ContainerError::Io(e))
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a format mismatch error.
    pub fn mismatch(msg: impl Into<String>) -> Self {
        Error::FormatMismatch(msg.into())
    }

    /// Create an unsupported format error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::UnsupportedFormat(msg.into())
    }

    /// Create an invalid parameter error.
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    /// Create a structural container error.
    pub fn invalid_structure(msg: impl Into<String>) -> Self {
        Error::Container(ContainerError::InvalidStructure(msg.into()))
    }

    /// Check if this error only affects one buffer and the stream may continue.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::CodecProcess(_))
    }

    /// Check if another provider may succeed where this one failed.
    #[must_use]
    pub fn is_negotiation(&self) -> bool {
        matches!(
            self,
            Error::FormatMismatch(_) | Error::MissingRequiredKey { .. }
        )
    }
}
