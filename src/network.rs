//! Follower network: the root's direct follows, enriched with the groups
//! (follow sets) the root has put them in.

use crate::directory::{decode, PeerDirectory};
use crate::scoring::PeerSignals;
use nostr_core::{DocumentKind, FollowSet, ProfileSummary, QueryFilter, RelayEndpoint};
use nostr_sdk::PublicKey;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerNode {
    pub peer: PublicKey,
    pub endpoints: Vec<RelayEndpoint>,
    pub display_label: Option<String>,
    /// Distinct group names, in the order the groups were read.
    pub groups: Vec<String>,
    /// Recomputed from `signals` on every scoring run, never accumulated.
    pub influence_score: i64,
    pub signals: PeerSignals,
    /// Only fetched for peers with a positive score.
    pub profile: Option<ProfileSummary>,
}

impl PeerNode {
    pub fn new(peer: PublicKey) -> Self {
        Self {
            peer,
            endpoints: Vec::new(),
            display_label: None,
            groups: Vec::new(),
            influence_score: 0,
            signals: PeerSignals::default(),
            profile: None,
        }
    }

    /// First relay URL the node was referenced with, if any.
    pub fn relay_hint(&self) -> Option<&str> {
        self.endpoints.first().map(|e| e.url.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FollowerNetwork {
    pub root: PublicKey,
    /// One node per followed peer, in follow-list order.
    pub nodes: Vec<PeerNode>,
}

impl FollowerNetwork {
    pub fn new(root: PublicKey) -> Self {
        Self {
            root,
            nodes: Vec::new(),
        }
    }

    pub fn get(&self, peer: &PublicKey) -> Option<&PeerNode> {
        self.nodes.iter().find(|n| &n.peer == peer)
    }

    fn get_mut(&mut self, peer: &PublicKey) -> Option<&mut PeerNode> {
        self.nodes.iter_mut().find(|n| &n.peer == peer)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes by descending score; equal scores keep follow-list order.
    pub fn ranked(&self) -> Vec<&PeerNode> {
        let mut ranked: Vec<&PeerNode> = self.nodes.iter().collect();
        ranked.sort_by(|a, b| b.influence_score.cmp(&a.influence_score));
        ranked
    }
}

pub struct NetworkBuilder<'a> {
    directory: &'a PeerDirectory,
}

impl<'a> NetworkBuilder<'a> {
    pub fn new(directory: &'a PeerDirectory) -> Self {
        Self { directory }
    }

    /// Build the unscored network for `root`. Relay failures leave the
    /// network empty (no follow list) or ungrouped (no follow sets).
    pub async fn build(&self, root: &PublicKey, endpoints: &[RelayEndpoint]) -> FollowerNetwork {
        let mut network = FollowerNetwork::new(*root);

        let follows = match self.directory.follow_list(root, endpoints).await {
            Ok(Some(list)) => list,
            Ok(None) => {
                info!(root = %root, "root has no follow list");
                return network;
            }
            Err(e) => {
                warn!(root = %root, "failed to fetch follow list: {e}");
                return network;
            }
        };

        network.nodes = follows
            .edges
            .into_iter()
            .map(|edge| {
                let mut node = PeerNode::new(edge.peer);
                node.endpoints = edge
                    .preferred_relay
                    .map(RelayEndpoint::read_write)
                    .into_iter()
                    .collect();
                node.display_label = edge.display_label;
                node
            })
            .collect();

        for set in self.follow_sets(root, endpoints).await {
            for member in &set.members {
                // Membership alone never adds a node.
                let Some(node) = network.get_mut(member) else {
                    continue;
                };
                if !node.groups.contains(&set.name) {
                    node.groups.push(set.name.clone());
                }
            }
        }

        info!(root = %root, peers = network.len(), "built follower network");
        network
    }

    async fn follow_sets(&self, root: &PublicKey, endpoints: &[RelayEndpoint]) -> Vec<FollowSet> {
        let filter = QueryFilter::new().kind(DocumentKind::FollowSet).author(*root);
        let events = match self.directory.gateway().fetch_all(endpoints, &filter).await {
            Ok(events) => events,
            Err(e) => {
                warn!(root = %root, "failed to fetch follow sets: {e}");
                return Vec::new();
            }
        };

        let mut sets: Vec<FollowSet> = events
            .iter()
            .filter_map(|event| decode::<FollowSet>(event, "follow set"))
            .collect();
        sets.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(root = %root, sets = sets.len(), "decoded follow sets");
        sets
    }
}
