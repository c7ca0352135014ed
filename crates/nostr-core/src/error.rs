//! Error types for relay access and document decoding.

use std::time::Duration;
use thiserror::Error;

/// Failures talking to relays.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("failed to connect to {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("relay transport error: {0}")]
    Transport(String),

    #[error("no usable relay endpoints (bootstrap list is empty too)")]
    EmptyEndpointSet,
}

/// A fetched event whose structured fields don't match what its kind promises.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("wrong event kind: expected {expected}, found {found}")]
    WrongKind { expected: u16, found: u16 },

    #[error("missing required tag: {0}")]
    MissingTag(&'static str),

    #[error("invalid tag '{tag}': {reason}")]
    InvalidTag { tag: &'static str, reason: String },

    #[error("malformed content: {0}")]
    MalformedContent(String),
}
