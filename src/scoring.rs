//! Influence scoring.
//!
//! Every followed peer gets a [`PeerSignals`] record gathered from relays and
//! a score that is the weighted sum of those signals. Peers are scored by a
//! bounded worker pool; the signals of one peer are fetched concurrently.
//! A failed fetch counts as the signal's zero value.

use crate::config::ScoringConfig;
use crate::directory::{decode, PeerDirectory};
use crate::error::GraphError;
use crate::graph::until_cancelled;
use crate::network::{FollowerNetwork, PeerNode};
use futures_util::stream::{self, StreamExt};
use nostr_core::{DocumentKind, QueryFilter, RelationshipStatus, RelayEndpoint, ZapReceipt};
use nostr_sdk::PublicKey;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The raw evidence behind a peer's score.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeerSignals {
    /// The peer follows the root back.
    pub reciprocal: bool,
    /// Reactions the peer sent to the root.
    pub inbound_reactions: u64,
    /// The root has reacted to the peer at least once.
    pub outbound_ack: bool,
    /// The peer has zapped the root.
    pub zapped: bool,
    /// Relationship categories the root assigned to the peer.
    pub relationships: Vec<String>,
    pub groups: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Reciprocity,
    InboundReactions,
    OutboundAck,
    Zap,
    Relationships,
    Groups,
}

impl Signal {
    pub const ALL: [Signal; 6] = [
        Signal::Reciprocity,
        Signal::InboundReactions,
        Signal::OutboundAck,
        Signal::Zap,
        Signal::Relationships,
        Signal::Groups,
    ];
}

fn times(weight: i64, n: u64) -> i64 {
    weight.saturating_mul(i64::try_from(n).unwrap_or(i64::MAX))
}

impl PeerSignals {
    /// Weighted sum. Never negative while weights are not.
    pub fn score(&self, weights: &ScoringConfig) -> i64 {
        let flag = |on: bool, weight: i64| if on { weight } else { 0 };

        [
            flag(self.reciprocal, weights.reciprocity),
            times(weights.inbound_reaction, self.inbound_reactions),
            flag(self.outbound_ack, weights.outbound_reaction),
            flag(self.zapped, weights.zap),
            self.relationships
                .iter()
                .map(|c| relationship_weight(c, weights))
                .fold(0, i64::saturating_add),
            times(weights.group_membership, self.groups as u64),
        ]
        .into_iter()
        .fold(0, i64::saturating_add)
    }

    /// A copy with one signal reset to its zero value.
    pub fn without(&self, signal: Signal) -> Self {
        let mut signals = self.clone();
        match signal {
            Signal::Reciprocity => signals.reciprocal = false,
            Signal::InboundReactions => signals.inbound_reactions = 0,
            Signal::OutboundAck => signals.outbound_ack = false,
            Signal::Zap => signals.zapped = false,
            Signal::Relationships => signals.relationships.clear(),
            Signal::Groups => signals.groups = 0,
        }
        signals
    }
}

/// Exact table weight, else the trusted-prefix bonus, else nothing.
/// Table keys and the prefix match case-insensitively.
pub fn relationship_weight(category: &str, weights: &ScoringConfig) -> i64 {
    let category = category.to_lowercase();
    if let Some((_, weight)) = weights
        .relationship
        .iter()
        .find(|(name, _)| name.to_lowercase() == category)
    {
        return *weight;
    }
    let prefix = weights.trusted_prefix.to_lowercase();
    if !prefix.is_empty() && category.starts_with(&prefix) {
        return weights.trusted_topic;
    }
    0
}

/// Root-scoped documents fetched once per run and shared by every peer task.
#[derive(Debug)]
pub struct RootContext {
    pub root: PublicKey,
    pub endpoints: Vec<RelayEndpoint>,
    pub relationships: HashMap<PublicKey, Vec<String>>,
    pub zap_payers: HashSet<PublicKey>,
}

pub struct InfluenceScorer<'a> {
    directory: &'a PeerDirectory,
    weights: &'a ScoringConfig,
}

impl<'a> InfluenceScorer<'a> {
    pub fn new(directory: &'a PeerDirectory, weights: &'a ScoringConfig) -> Self {
        Self { directory, weights }
    }

    /// Score every node. Resolves once all peers are scored, or fails with
    /// [`GraphError::Cancelled`] and drops every pending fetch.
    pub async fn score(
        &self,
        mut network: FollowerNetwork,
        endpoints: &[RelayEndpoint],
        cancel: &CancellationToken,
    ) -> Result<FollowerNetwork, GraphError> {
        let context = until_cancelled(cancel, self.root_context(&network.root, endpoints)).await?;
        let context = &context;

        let limit = self.weights.worker_limit();
        let nodes = std::mem::take(&mut network.nodes);
        info!(peers = nodes.len(), workers = limit, "scoring follower network");

        // Each task owns its node; results come back in completion order.
        let scoring = stream::iter(nodes.into_iter().enumerate())
            .map(|(index, node)| async move { (index, self.score_peer(node, context).await) })
            .buffer_unordered(limit)
            .collect::<Vec<_>>();

        let mut scored = until_cancelled(cancel, scoring).await?;
        scored.sort_by_key(|(index, _)| *index);
        network.nodes = scored.into_iter().map(|(_, node)| node).collect();

        let positive = network.nodes.iter().filter(|n| n.influence_score > 0).count();
        info!(peers = network.len(), positive, "scoring complete");
        Ok(network)
    }

    /// Fetch the relationship labels the root published and the zap
    /// receipts addressed to the root.
    pub async fn root_context(&self, root: &PublicKey, endpoints: &[RelayEndpoint]) -> RootContext {
        let gateway = self.directory.gateway();
        let relationship_filter = QueryFilter::new()
            .kind(DocumentKind::RelationshipStatus)
            .author(*root);
        let zap_filter = QueryFilter::new().kind(DocumentKind::ZapReceipt).pubkey(root);

        let (relationship_events, zap_events) = tokio::join!(
            gateway.fetch_all(endpoints, &relationship_filter),
            gateway.fetch_all(endpoints, &zap_filter),
        );

        let mut relationships: HashMap<PublicKey, Vec<String>> = HashMap::new();
        for status in signal_or_default(relationship_events, root, "relationships")
            .iter()
            .filter_map(|event| decode::<RelationshipStatus>(event, "relationship status"))
        {
            let categories = relationships.entry(status.target).or_default();
            for category in status.categories {
                if !categories.contains(&category) {
                    categories.push(category);
                }
            }
        }

        let zap_payers: HashSet<PublicKey> = signal_or_default(zap_events, root, "zap receipts")
            .iter()
            .filter_map(|event| decode::<ZapReceipt>(event, "zap receipt"))
            .filter(|receipt| &receipt.recipient == root)
            .filter_map(|receipt| receipt.payer)
            .collect();

        debug!(
            root = %root,
            relationships = relationships.len(),
            zap_payers = zap_payers.len(),
            "root context ready"
        );

        RootContext {
            root: *root,
            endpoints: endpoints.to_vec(),
            relationships,
            zap_payers,
        }
    }

    async fn score_peer(&self, mut node: PeerNode, context: &RootContext) -> PeerNode {
        let peer = node.peer;
        let resolved = self.directory.endpoints_for(&peer, node.relay_hint()).await;
        if !resolved.is_empty() {
            node.endpoints = resolved;
        }

        let (reciprocal, inbound_reactions, outbound_ack) = tokio::join!(
            self.reciprocity(&node, context),
            self.inbound_reactions(&peer, context),
            self.outbound_ack(&peer, context),
        );

        let signals = PeerSignals {
            reciprocal,
            inbound_reactions,
            outbound_ack,
            zapped: context.zap_payers.contains(&peer),
            relationships: context.relationships.get(&peer).cloned().unwrap_or_default(),
            groups: node.groups.len(),
        };
        node.influence_score = signals.score(self.weights);
        node.signals = signals;

        if node.influence_score > 0 {
            node.profile = match self.directory.profile(&peer, &node.endpoints).await {
                Ok(profile) => profile,
                Err(e) => {
                    warn!(peer = %peer, "profile fetch failed: {e}");
                    None
                }
            };
        }

        debug!(peer = %peer, score = node.influence_score, signals = ?node.signals, "scored peer");
        node
    }

    async fn reciprocity(&self, node: &PeerNode, context: &RootContext) -> bool {
        let result = self.directory.follow_list(&node.peer, &node.endpoints).await;
        signal_or_default(result, &node.peer, "reciprocity")
            .is_some_and(|list| list.contains(&context.root))
    }

    async fn inbound_reactions(&self, peer: &PublicKey, context: &RootContext) -> u64 {
        let filter = QueryFilter::new()
            .kind(DocumentKind::Reaction)
            .author(*peer)
            .pubkey(&context.root);
        let result = self.directory.gateway().count(&context.endpoints, &filter).await;
        signal_or_default(result, peer, "inbound reactions")
    }

    async fn outbound_ack(&self, peer: &PublicKey, context: &RootContext) -> bool {
        let filter = QueryFilter::new()
            .kind(DocumentKind::Reaction)
            .author(context.root)
            .pubkey(peer)
            .limit(1);
        let result = self.directory.gateway().fetch_one(&context.endpoints, &filter).await;
        signal_or_default(result, peer, "outbound reactions").is_some()
    }
}

fn signal_or_default<T: Default, E: std::fmt::Display>(
    result: Result<T, E>,
    peer: &PublicKey,
    signal: &str,
) -> T {
    result.unwrap_or_else(|e| {
        warn!(peer = %peer, signal, "signal fetch failed, scoring as zero: {e}");
        T::default()
    })
}
