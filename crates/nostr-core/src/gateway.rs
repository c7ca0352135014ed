//! Relay gateway: endpoint selection, bootstrap fallback and deadlines.
//!
//! Every read the graph performs goes through here. Write-capable endpoints
//! are where a peer authors content, so single canonical documents are read
//! from them; read-capable endpoints are where a peer receives content, so
//! collections and counts come from those. When a peer has no eligible
//! endpoint the bootstrap relays are used instead.

use crate::documents::RelayList;
use crate::error::RelayError;
use crate::filter::QueryFilter;
use crate::kinds::DocumentKind;
use crate::relay::{select_urls, Access, RelayEndpoint};
use crate::transport::{latest_event, RelayTransport};
use futures_util::future::join_all;
use nostr_sdk::{Event, PublicKey};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-query deadline.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);
/// Default deadline for count requests.
pub const DEFAULT_COUNT_TIMEOUT: Duration = Duration::from_millis(3000);

pub fn default_bootstrap_relays() -> Vec<String> {
    vec![
        "wss://relay.damus.io".to_string(),
        "wss://relay.snort.social".to_string(),
        "wss://nos.lol".to_string(),
    ]
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Used when a peer has no eligible endpoint of its own.
    pub bootstrap: Vec<RelayEndpoint>,
    pub query_timeout: Duration,
    pub count_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bootstrap: default_bootstrap_relays()
                .into_iter()
                .map(RelayEndpoint::read_write)
                .collect(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            count_timeout: DEFAULT_COUNT_TIMEOUT,
        }
    }
}

pub struct RelayGateway {
    transport: Arc<dyn RelayTransport>,
    config: GatewayConfig,
}

impl RelayGateway {
    pub fn new(transport: Arc<dyn RelayTransport>, config: GatewayConfig) -> Self {
        Self { transport, config }
    }

    pub fn bootstrap(&self) -> &[RelayEndpoint] {
        &self.config.bootstrap
    }

    /// URLs to use for `access`, falling back to bootstrap relays.
    pub fn resolve(&self, endpoints: &[RelayEndpoint], access: Access) -> Vec<String> {
        let urls = select_urls(endpoints, access);
        if !urls.is_empty() {
            return urls;
        }
        debug!(?access, "no eligible endpoints, using bootstrap relays");
        select_urls(&self.config.bootstrap, access)
    }

    /// Resolve and connect, keeping only endpoints that accepted a connection.
    async fn prepare(&self, endpoints: &[RelayEndpoint], access: Access) -> Result<Vec<String>, RelayError> {
        let urls = self.resolve(endpoints, access);
        if urls.is_empty() {
            return Err(RelayError::EmptyEndpointSet);
        }

        let outcomes = join_all(urls.iter().map(|url| self.transport.connect(url))).await;

        let mut reachable = Vec::with_capacity(urls.len());
        let mut last_error = None;
        for (url, outcome) in urls.into_iter().zip(outcomes) {
            match outcome {
                Ok(()) => reachable.push(url),
                Err(e) => {
                    warn!(relay = %url, "skipping unreachable relay: {e}");
                    last_error = Some(e);
                }
            }
        }

        match (reachable.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(reachable),
        }
    }

    /// The single most recent document matching `filter`, read from the
    /// write-capable endpoints.
    pub async fn fetch_one(
        &self,
        endpoints: &[RelayEndpoint],
        filter: &QueryFilter,
    ) -> Result<Option<Event>, RelayError> {
        let urls = match self.prepare(endpoints, Access::Write).await {
            Ok(urls) => urls,
            Err(RelayError::EmptyEndpointSet) => return Ok(None),
            Err(e) => return Err(e),
        };

        debug!(%filter, relays = urls.len(), "fetch_one");
        let timeout = self.config.query_timeout;
        let events = tokio::time::timeout(timeout, self.transport.query(&urls, filter, timeout))
            .await
            .map_err(|_| RelayError::Timeout {
                operation: "fetch_one",
                after: timeout,
            })??;

        // Filter before picking: a newer non-matching event must not hide
        // an older matching one.
        Ok(latest_event(events.into_iter().filter(|e| accept(filter, e))))
    }

    /// Deduplicated union of matching events from the read-capable endpoints.
    pub async fn fetch_all(
        &self,
        endpoints: &[RelayEndpoint],
        filter: &QueryFilter,
    ) -> Result<Vec<Event>, RelayError> {
        let urls = match self.prepare(endpoints, Access::Read).await {
            Ok(urls) => urls,
            Err(RelayError::EmptyEndpointSet) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        debug!(%filter, relays = urls.len(), "fetch_all");
        let timeout = self.config.query_timeout;
        let events = tokio::time::timeout(timeout, self.transport.query(&urls, filter, timeout))
            .await
            .map_err(|_| RelayError::Timeout {
                operation: "fetch_all",
                after: timeout,
            })??;

        let mut seen = HashSet::new();
        Ok(events
            .into_iter()
            .filter(|e| accept(filter, e) && seen.insert(e.id))
            .collect())
    }

    /// Server-side count of matches on the read-capable endpoints. Fails
    /// with [`RelayError::Timeout`] once the count deadline passes.
    pub async fn count(&self, endpoints: &[RelayEndpoint], filter: &QueryFilter) -> Result<u64, RelayError> {
        let urls = match self.prepare(endpoints, Access::Read).await {
            Ok(urls) => urls,
            Err(RelayError::EmptyEndpointSet) => return Ok(0),
            Err(e) => return Err(e),
        };

        debug!(%filter, relays = urls.len(), "count");
        let timeout = self.config.count_timeout;
        tokio::time::timeout(timeout, self.transport.count(&urls, filter, timeout))
            .await
            .map_err(|_| RelayError::Timeout {
                operation: "count",
                after: timeout,
            })?
    }

    /// A peer's declared relays, looked up on the bootstrap relays. A peer
    /// without a relay list (or with a malformed one) has no endpoints.
    pub async fn fetch_relay_list(&self, peer: &PublicKey) -> Result<Vec<RelayEndpoint>, RelayError> {
        let filter = QueryFilter::new()
            .kind(DocumentKind::RelayList)
            .author(*peer)
            .limit(1);

        let Some(event) = self.fetch_one(&self.config.bootstrap, &filter).await? else {
            debug!(peer = %peer, "no relay list published");
            return Ok(Vec::new());
        };

        match RelayList::try_from(&event) {
            Ok(list) => Ok(list.endpoints),
            Err(e) => {
                warn!(peer = %peer, event = %event.id, "malformed relay list: {e}");
                Ok(Vec::new())
            }
        }
    }

    /// Close the underlying transport.
    pub async fn shutdown(&self) {
        self.transport.disconnect().await;
    }
}

/// Relays are untrusted: drop anything that does not match what was asked for.
fn accept(filter: &QueryFilter, event: &Event) -> bool {
    let ok = filter.matches(event);
    if !ok {
        debug!(event = %event.id, %filter, "dropping event that does not match filter");
    }
    ok
}
