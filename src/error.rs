//! Error taxonomy for cache operations.
//!
//! Three failure classes with distinct policies:
//!
//! - **Transport / Timeout**: the backing store is unreachable or slow.
//!   Read paths fall through to the store of record; write-path evictions
//!   log and continue.
//! - **Decode**: a stored payload no longer parses. Read paths treat it as
//!   a miss.
//! - **Misuse**: malformed keys or patterns. Rejected before any I/O.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing store could not be reached or answered with a
    /// protocol-level error.
    #[error("cache transport failure: {message}")]
    Transport { message: String },

    /// An operation exceeded the configured per-operation bound.
    #[error("cache operation `{op}` timed out after {waited_ms} ms")]
    Timeout { op: &'static str, waited_ms: u64 },

    /// A stored payload failed to parse as the expected shape.
    #[error("cache payload at `{key}` failed to decode: {message}")]
    Decode { key: String, message: String },

    /// The caller passed a key or pattern the codec refuses to encode.
    #[error("cache misuse: {message}")]
    Misuse { message: String },
}

impl CacheError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn timeout(op: &'static str, waited_ms: u64) -> Self {
        Self::Timeout { op, waited_ms }
    }

    pub fn decode(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn misuse(message: impl Into<String>) -> Self {
        Self::Misuse {
            message: message.into(),
        }
    }

    /// Whether the degrade path applies: the store itself failed, as
    /// opposed to a payload or caller problem.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }

    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::Misuse { .. })
    }
}
