//! Nostr plumbing for flavorgraph
//!
//! This crate provides the relay gateway, the relay client seam, typed
//! decoding of the protocol documents the graph reads, and relay-list
//! handling.

pub mod documents;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod kinds;
pub mod relay;
pub mod transport;

// Re-export commonly used types
pub use documents::{
    FollowEdge, FollowList, FollowSet, LabelSet, PayerSource, ProfileSummary, RelationshipStatus,
    RelayList, TopicSet, ZapReceipt,
};
pub use error::{DocumentError, RelayError};
pub use filter::QueryFilter;
pub use gateway::{default_bootstrap_relays, GatewayConfig, RelayGateway};
pub use kinds::DocumentKind;
pub use relay::{Access, RelayCapability, RelayEndpoint};
pub use transport::{latest_event, NostrSdkTransport, RelayTransport};
