//! flavorgraph: a web of flavor over Nostr.
//!
//! Given one identity, reconstruct who it follows, rank those peers by
//! influence signals gathered from relays, and derive the food topics the
//! highest-ranked peers publish.

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod graph;
pub mod network;
pub mod ontology;
pub mod scoring;

pub use cache::{CacheEntry, TtlCache};
pub use config::Config;
pub use directory::PeerDirectory;
pub use error::GraphError;
pub use graph::{parse_root, SocialGraph, SocialGraphResult};
pub use network::{FollowerNetwork, NetworkBuilder, PeerNode};
pub use ontology::{Bucket, Dictionaries, Ontology, OntologyExtractor};
pub use scoring::{InfluenceScorer, PeerSignals, RootContext, Signal};
