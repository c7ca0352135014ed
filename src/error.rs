use nostr_core::RelayError;
use thiserror::Error;

/// Errors surfaced by [`crate::SocialGraph`].
///
/// Partial data is never an error: failed signals, unreachable relays and
/// malformed documents degrade to empty or zero values and are logged.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("invalid root identity {input:?}: {reason}")]
    InvalidRoot { input: String, reason: String },

    #[error("social graph computation cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Relay(#[from] RelayError),
}
