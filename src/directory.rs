//! Cached peer lookups on top of the relay gateway.
//!
//! Relay lists, follow lists and profiles are each held in their own
//! [`TtlCache`] with a TTL matched to how often that document changes.

use crate::cache::TtlCache;
use crate::config::CacheConfig;
use nostr_core::{
    DocumentKind, FollowList, ProfileSummary, QueryFilter, RelayEndpoint, RelayError, RelayGateway,
};
use nostr_sdk::{Event, PublicKey};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct PeerDirectory {
    gateway: Arc<RelayGateway>,
    relay_lists: TtlCache<PublicKey, Vec<RelayEndpoint>>,
    follow_lists: TtlCache<PublicKey, Option<FollowList>>,
    profiles: TtlCache<PublicKey, Option<ProfileSummary>>,
}

impl PeerDirectory {
    pub fn new(gateway: Arc<RelayGateway>, config: &CacheConfig) -> Self {
        let sweep = Duration::from_secs(config.sweep_interval_secs);
        Self {
            gateway,
            relay_lists: TtlCache::new(Duration::from_secs(config.relay_list_ttl_secs), sweep),
            follow_lists: TtlCache::new(Duration::from_secs(config.follow_list_ttl_secs), sweep),
            profiles: TtlCache::new(Duration::from_secs(config.profile_ttl_secs), sweep),
        }
    }

    pub fn gateway(&self) -> &RelayGateway {
        &self.gateway
    }

    /// The peer's declared relays (kind 10002), empty when none is published.
    pub async fn relay_list(&self, peer: &PublicKey) -> Result<Vec<RelayEndpoint>, RelayError> {
        if let Some(endpoints) = self.relay_lists.get(peer) {
            return Ok(endpoints);
        }
        let endpoints = self.gateway.fetch_relay_list(peer).await?;
        self.relay_lists.set(*peer, endpoints.clone());
        Ok(endpoints)
    }

    /// Endpoints to use for `peer`: its relay list when one resolves,
    /// otherwise the relay hint from whoever referenced it.
    pub async fn endpoints_for(&self, peer: &PublicKey, hint: Option<&str>) -> Vec<RelayEndpoint> {
        let resolved = match self.relay_list(peer).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!(peer = %peer, "relay list lookup failed: {e}");
                Vec::new()
            }
        };
        if !resolved.is_empty() {
            return resolved;
        }
        hint.map(|url| vec![RelayEndpoint::read_write(url)])
            .unwrap_or_default()
    }

    /// The peer's current follow list, `None` when it has not published one.
    pub async fn follow_list(
        &self,
        peer: &PublicKey,
        endpoints: &[RelayEndpoint],
    ) -> Result<Option<FollowList>, RelayError> {
        if let Some(list) = self.follow_lists.get(peer) {
            return Ok(list);
        }

        let filter = QueryFilter::new()
            .kind(DocumentKind::ContactList)
            .author(*peer)
            .limit(1);
        let list = self
            .gateway
            .fetch_one(endpoints, &filter)
            .await?
            .and_then(|event| decode::<FollowList>(&event, "follow list"));

        self.follow_lists.set(*peer, list.clone());
        Ok(list)
    }

    pub async fn profile(
        &self,
        peer: &PublicKey,
        endpoints: &[RelayEndpoint],
    ) -> Result<Option<ProfileSummary>, RelayError> {
        if let Some(profile) = self.profiles.get(peer) {
            return Ok(profile);
        }

        let filter = QueryFilter::new()
            .kind(DocumentKind::ProfileMetadata)
            .author(*peer)
            .limit(1);
        let profile = self
            .gateway
            .fetch_one(endpoints, &filter)
            .await?
            .and_then(|event| decode::<ProfileSummary>(&event, "profile"));

        self.profiles.set(*peer, profile.clone());
        Ok(profile)
    }

    /// Stop every cache sweep and drop cached documents.
    pub fn destroy(&self) {
        self.relay_lists.destroy();
        self.follow_lists.destroy();
        self.profiles.destroy();
        debug!("peer directory caches destroyed");
    }
}

/// Decode a document, logging and discarding it when malformed.
pub(crate) fn decode<'a, T>(event: &'a Event, what: &str) -> Option<T>
where
    T: TryFrom<&'a Event, Error = nostr_core::DocumentError>,
{
    match T::try_from(event) {
        Ok(document) => Some(document),
        Err(e) => {
            warn!(event = %event.id, author = %event.pubkey, "skipping malformed {what}: {e}");
            None
        }
    }
}
