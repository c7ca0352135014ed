//! In-memory relay transport and event builders shared by the integration
//! tests.

#![allow(dead_code)]

use async_trait::async_trait;
use flavorgraph::Config;
use nostr_core::{QueryFilter, RelayError, RelayTransport};
use nostr_sdk::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BOOTSTRAP: &str = "wss://bootstrap.test";

/// Serves a fixed set of signed events from every URL and records what was
/// asked for.
pub struct MockRelays {
    root: PublicKey,
    events: Mutex<Vec<Event>>,
    unreachable: Mutex<HashSet<String>>,
    pub query_delay: Mutex<Duration>,
    pub count_delay: Mutex<Duration>,
    queries: Mutex<Vec<(Vec<String>, QueryFilter)>>,
    in_flight: Mutex<HashMap<PublicKey, usize>>,
    max_in_flight_peers: AtomicUsize,
    disconnected: AtomicBool,
}

impl MockRelays {
    pub fn new(root: PublicKey) -> Arc<Self> {
        Arc::new(Self {
            root,
            events: Mutex::new(Vec::new()),
            unreachable: Mutex::new(HashSet::new()),
            query_delay: Mutex::new(Duration::ZERO),
            count_delay: Mutex::new(Duration::ZERO),
            queries: Mutex::new(Vec::new()),
            in_flight: Mutex::new(HashMap::new()),
            max_in_flight_peers: AtomicUsize::new(0),
            disconnected: AtomicBool::new(false),
        })
    }

    pub fn publish(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn set_unreachable(&self, url: &str) {
        self.unreachable.lock().unwrap().insert(url.to_string());
    }

    pub fn set_query_delay(&self, delay: Duration) {
        *self.query_delay.lock().unwrap() = delay;
    }

    pub fn set_count_delay(&self, delay: Duration) {
        *self.count_delay.lock().unwrap() = delay;
    }

    pub fn queries(&self) -> Vec<(Vec<String>, QueryFilter)> {
        self.queries.lock().unwrap().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    /// Queries for `kind` authored by `author`.
    pub fn queries_for(&self, kind: u16, author: &PublicKey) -> Vec<(Vec<String>, QueryFilter)> {
        self.queries()
            .into_iter()
            .filter(|(_, f)| f.kinds.contains(&kind) && f.authors.contains(author))
            .collect()
    }

    /// Most distinct non-root peers that had a query in flight at once.
    pub fn max_in_flight_peers(&self) -> usize {
        self.max_in_flight_peers.load(Ordering::SeqCst)
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    fn matching(&self, filter: &QueryFilter) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            events.truncate(limit);
        }
        events
    }

    /// The non-root peer a query is about, if any.
    fn subject(&self, filter: &QueryFilter) -> Option<PublicKey> {
        let tagged = filter
            .tags
            .get(&'p')
            .into_iter()
            .flatten()
            .filter_map(|hex| PublicKey::from_hex(hex).ok());
        filter
            .authors
            .iter()
            .copied()
            .chain(tagged)
            .find(|pk| pk != &self.root)
    }

    fn enter(&self, urls: &[String], filter: &QueryFilter) -> Option<PublicKey> {
        self.queries
            .lock()
            .unwrap()
            .push((urls.to_vec(), filter.clone()));

        let subject = self.subject(filter)?;
        let mut in_flight = self.in_flight.lock().unwrap();
        *in_flight.entry(subject).or_default() += 1;
        let peers = in_flight.values().filter(|n| **n > 0).count();
        self.max_in_flight_peers.fetch_max(peers, Ordering::SeqCst);
        Some(subject)
    }

    fn leave(&self, subject: Option<PublicKey>) {
        if let Some(subject) = subject {
            if let Some(n) = self.in_flight.lock().unwrap().get_mut(&subject) {
                *n -= 1;
            }
        }
    }
}

#[async_trait]
impl RelayTransport for MockRelays {
    async fn connect(&self, url: &str) -> Result<(), RelayError> {
        if self.unreachable.lock().unwrap().contains(url) {
            return Err(RelayError::Connection {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn query(
        &self,
        urls: &[String],
        filter: &QueryFilter,
        _timeout: Duration,
    ) -> Result<Vec<Event>, RelayError> {
        let subject = self.enter(urls, filter);
        let delay = *self.query_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.leave(subject);
        Ok(self.matching(filter))
    }

    async fn count(
        &self,
        urls: &[String],
        filter: &QueryFilter,
        _timeout: Duration,
    ) -> Result<u64, RelayError> {
        let subject = self.enter(urls, filter);
        let delay = *self.count_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.leave(subject);
        Ok(self.matching(&QueryFilter { limit: None, ..filter.clone() }).len() as u64)
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

pub fn test_config(concurrency: usize) -> Config {
    let mut config = Config::default();
    config.relays.bootstrap = vec![BOOTSTRAP.to_string()];
    config.scoring.concurrency = concurrency;
    config
}

// ── Event builders ──────────────────────────────────────────────

fn tag(name: &str, values: &[&str]) -> Tag {
    Tag::custom(
        TagKind::custom(name.to_string()),
        values.iter().map(|v| v.to_string()).collect::<Vec<_>>(),
    )
}

fn sign(keys: &Keys, kind: u16, content: &str, tags: Vec<Tag>) -> Event {
    EventBuilder::new(Kind::from(kind), content)
        .tags(tags)
        .sign_with_keys(keys)
        .unwrap()
}

pub fn follow_list(keys: &Keys, follows: &[PublicKey]) -> Event {
    sign(keys, 3, "", follows.iter().map(|pk| Tag::public_key(*pk)).collect())
}

pub fn follow_set(keys: &Keys, name: &str, members: &[PublicKey]) -> Event {
    let mut tags = vec![tag("d", &[name])];
    tags.extend(members.iter().map(|pk| Tag::public_key(*pk)));
    sign(keys, 30000, "", tags)
}

pub fn reaction(keys: &Keys, target: &PublicKey) -> Event {
    sign(keys, 7, "+", vec![Tag::public_key(*target)])
}

pub fn relay_list(keys: &Keys, relays: &[(&str, Option<&str>)]) -> Event {
    let tags = relays
        .iter()
        .map(|(url, marker)| match marker {
            Some(marker) => tag("r", &[*url, *marker]),
            None => tag("r", &[*url]),
        })
        .collect();
    sign(keys, 10002, "", tags)
}

pub fn relationship(keys: &Keys, target: &PublicKey, categories: &[&str]) -> Event {
    let mut tags = vec![tag("d", &[target.to_hex().as_str()])];
    tags.extend(categories.iter().map(|c| tag("n", &[*c])));
    sign(keys, 30382, "", tags)
}

/// Receipt naming the payer in a `P` tag.
pub fn zap_receipt(service: &Keys, recipient: &PublicKey, payer: &PublicKey) -> Event {
    sign(
        service,
        9735,
        "",
        vec![
            tag("p", &[recipient.to_hex().as_str()]),
            tag("P", &[payer.to_hex().as_str()]),
        ],
    )
}

/// Receipt carrying only the embedded zap request signed by `payer`, which
/// targets `request_target`.
pub fn zap_receipt_with_request(
    service: &Keys,
    recipient: &PublicKey,
    payer: &Keys,
    request_target: &PublicKey,
) -> Event {
    let request = sign(payer, 9734, "", vec![Tag::public_key(*request_target)]);
    let description = serde_json::to_string(&request).unwrap();
    sign(
        service,
        9735,
        "",
        vec![
            tag("p", &[recipient.to_hex().as_str()]),
            tag("description", &[description.as_str()]),
        ],
    )
}

pub fn profile(keys: &Keys, name: &str) -> Event {
    let content = serde_json::json!({ "name": name, "about": "cooks", "picture": "https://img.test/a.png" });
    sign(keys, 0, &content.to_string(), Vec::new())
}

pub fn interests(keys: &Keys, topics: &[&str]) -> Event {
    sign(keys, 10015, "", topics.iter().map(|t| tag("t", &[*t])).collect())
}

pub fn curation(keys: &Keys, name: &str, topics: &[&str]) -> Event {
    let mut tags = vec![tag("d", &[name])];
    tags.extend(topics.iter().map(|t| tag("t", &[*t])));
    sign(keys, 30023, "", tags)
}

pub fn labels(keys: &Keys, labels: &[&str]) -> Event {
    let mut tags = vec![tag("L", &["food"])];
    tags.extend(labels.iter().map(|l| tag("l", &[*l, "food"])));
    sign(keys, 1985, "", tags)
}
