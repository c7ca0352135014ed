//! The relay client seam.
//!
//! The gateway talks to relays only through [`RelayTransport`], so the
//! connection pool is an explicitly owned value that callers create, share and
//! close. [`NostrSdkTransport`] is the production implementation.

use crate::error::RelayError;
use crate::filter::QueryFilter;
use async_trait::async_trait;
use futures_util::future::join_all;
use nostr_sdk::prelude::*;
use std::time::Duration;
use tracing::{debug, info};

#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Ensure a live connection to `url`.
    async fn connect(&self, url: &str) -> Result<(), RelayError>;

    /// One-shot query across `urls`, returning every stored match.
    async fn query(
        &self,
        urls: &[String],
        filter: &QueryFilter,
        timeout: Duration,
    ) -> Result<Vec<Event>, RelayError>;

    /// Latest match across `urls`. Events that do not satisfy `filter` are
    /// discarded before the newest is chosen.
    async fn get(
        &self,
        urls: &[String],
        filter: &QueryFilter,
        timeout: Duration,
    ) -> Result<Option<Event>, RelayError> {
        let events = self.query(urls, filter, timeout).await?;
        Ok(latest_event(events.into_iter().filter(|e| filter.matches(e))))
    }

    /// Number of stored matches across `urls`.
    async fn count(
        &self,
        urls: &[String],
        filter: &QueryFilter,
        timeout: Duration,
    ) -> Result<u64, RelayError>;

    /// Close every connection this transport opened.
    async fn disconnect(&self);
}

/// Most recent event; ties go to the lowest event id so the pick is stable.
pub fn latest_event(events: impl IntoIterator<Item = Event>) -> Option<Event> {
    events.into_iter().max_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| b.id.cmp(&a.id))
    })
}

/// Convert to the SDK filter type.
pub fn to_sdk_filter(filter: &QueryFilter) -> Result<Filter, RelayError> {
    let mut sdk = Filter::new();
    if !filter.authors.is_empty() {
        sdk = sdk.authors(filter.authors.iter().copied());
    }
    if !filter.kinds.is_empty() {
        sdk = sdk.kinds(filter.kinds.iter().map(|k| Kind::from(*k)));
    }
    for (letter, values) in &filter.tags {
        let tag = SingleLetterTag::from_char(*letter)
            .map_err(|e| RelayError::Transport(format!("invalid tag filter #{letter}: {e}")))?;
        sdk = sdk.custom_tags(tag, values.iter().cloned());
    }
    if let Some(limit) = filter.limit {
        sdk = sdk.limit(limit);
    }
    Ok(sdk)
}

fn connection_error(url: &str, reason: impl std::fmt::Display) -> RelayError {
    RelayError::Connection {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// Relay transport backed by a read-only `nostr-sdk` client.
#[derive(Clone)]
pub struct NostrSdkTransport {
    client: Client,
}

impl Default for NostrSdkTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl NostrSdkTransport {
    pub fn new() -> Self {
        Self {
            client: Client::default(),
        }
    }

    /// Get the underlying nostr-sdk Client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn count_one(&self, url: &str, filter: Filter, timeout: Duration) -> Result<u64, RelayError> {
        let relay = self
            .client
            .relay(url)
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        match relay.count_events(filter.clone(), timeout).await {
            Ok(n) => Ok(n as u64),
            Err(e) => {
                debug!(relay = url, "COUNT unsupported ({e}), counting fetched events instead");
                let events = self
                    .client
                    .fetch_events_from([url], filter, timeout)
                    .await
                    .map_err(|e| RelayError::Transport(e.to_string()))?;
                Ok(events.len() as u64)
            }
        }
    }
}

#[async_trait]
impl RelayTransport for NostrSdkTransport {
    async fn connect(&self, url: &str) -> Result<(), RelayError> {
        if self
            .client
            .add_relay(url)
            .await
            .map_err(|e| connection_error(url, e))?
        {
            debug!(relay = url, "added relay to pool");
        }
        self.client
            .connect_relay(url)
            .await
            .map_err(|e| connection_error(url, e))?;
        Ok(())
    }

    async fn query(
        &self,
        urls: &[String],
        filter: &QueryFilter,
        timeout: Duration,
    ) -> Result<Vec<Event>, RelayError> {
        let events = self
            .client
            .fetch_events_from(urls.iter().map(String::as_str), to_sdk_filter(filter)?, timeout)
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        Ok(events.into_iter().collect())
    }

    /// Counts cannot be deduplicated across relays, so the largest per-relay
    /// count is reported.
    async fn count(
        &self,
        urls: &[String],
        filter: &QueryFilter,
        timeout: Duration,
    ) -> Result<u64, RelayError> {
        let sdk_filter = to_sdk_filter(filter)?;
        let results = join_all(
            urls.iter()
                .map(|url| self.count_one(url, sdk_filter.clone(), timeout)),
        )
        .await;

        let mut best: Option<u64> = None;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(n) => best = Some(best.map_or(n, |b| b.max(n))),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match (best, first_error) {
            (Some(n), _) => Ok(n),
            (None, Some(e)) => Err(e),
            (None, None) => Ok(0),
        }
    }

    async fn disconnect(&self) {
        self.client.disconnect().await;
        info!("Relay transport disconnected");
    }
}
