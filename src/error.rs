//! Error types for the ULog codec.
//!
//! All fallible APIs in this crate return [`UlogError`] through the crate's
//! [`Result`] alias. The variants map the three error classes of the stream
//! model plus lookup failures:
//!
//! - `Parse` — a recoverable stream error. The reader discards the offending
//!   message, reports once through the handler and resynchronizes.
//! - `Fatal` — an unrecoverable stream error (bad magic, unknown incompat
//!   flag, unresolvable format registry). The reader stops consuming input.
//! - `Usage` — an API precondition was violated (wrong call order, invalid
//!   names, padding gaps). Raised synchronously by the writers.
//! - `Access` — a field, subscription or index does not exist, or a value
//!   cannot be converted to the requested type.

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, UlogError>;

/// Unified error type for reading, writing and accessing ULog data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UlogError {
    /// Recoverable stream corruption: a message that cannot be decoded or
    /// indexed. The streaming reader skips it and scans for the next
    /// plausible message boundary.
    #[error("parse error: {message}")]
    Parse {
        /// What failed to decode.
        message: String,
    },

    /// Unrecoverable stream error; no further input will be consumed.
    #[error("fatal stream error: {message}")]
    Fatal {
        /// What made the stream unreadable.
        message: String,
    },

    /// An API was used in the wrong way or with invalid arguments.
    #[error("usage error: {message}")]
    Usage {
        /// Which precondition was violated.
        message: String,
    },

    /// A lookup or typed access failed.
    #[error("access error: {message}")]
    Access {
        /// What was not found or not convertible.
        message: String,
    },
}

impl UlogError {
    /// Recoverable stream corruption.
    pub fn parse(message: impl Into<String>) -> Self {
        UlogError::Parse {
            message: message.into(),
        }
    }

    /// Unrecoverable stream error.
    pub fn fatal(message: impl Into<String>) -> Self {
        UlogError::Fatal {
            message: message.into(),
        }
    }

    /// API misuse.
    pub fn usage(message: impl Into<String>) -> Self {
        UlogError::Usage {
            message: message.into(),
        }
    }

    /// Failed lookup or conversion.
    pub fn access(message: impl Into<String>) -> Self {
        UlogError::Access {
            message: message.into(),
        }
    }

    /// True for errors the streaming reader cannot recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, UlogError::Fatal { .. })
    }

    /// The error message without the class prefix.
    pub fn message(&self) -> &str {
        match self {
            UlogError::Parse { message }
            | UlogError::Fatal { message }
            | UlogError::Usage { message }
            | UlogError::Access { message } => message,
        }
    }
}
