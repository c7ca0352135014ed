//! In-process TTL cache.
//!
//! Entries carry an absolute wall-clock expiry. Reads evict lazily, and a
//! background task sweeps the whole map on a fixed period. Both paths use
//! [`CacheEntry::is_live`], so an entry is never visible past its expiry.
//!
//! The cache has no size bound; it lives for one process.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<V> {
    pub value: V,
    /// Unix epoch milliseconds.
    pub expires_at: i64,
}

impl<V> CacheEntry<V> {
    pub fn is_live(&self, now: i64) -> bool {
        now < self.expires_at
    }
}

type Entries<K, V> = Mutex<HashMap<K, CacheEntry<V>>>;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct TtlCache<K, V> {
    entries: Arc<Entries<K, V>>,
    default_ttl: Duration,
    sweeper: CancellationToken,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create a cache. The sweep task is spawned on the current tokio
    /// runtime; outside a runtime only lazy eviction applies.
    pub fn new(default_ttl: Duration, sweep_interval: Duration) -> Self {
        let entries = Arc::new(Mutex::new(HashMap::new()));
        let sweeper = CancellationToken::new();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(sweep_loop(
                    Arc::downgrade(&entries),
                    sweep_interval.max(Duration::from_millis(1)),
                    sweeper.clone(),
                ));
            }
            Err(_) => debug!("no tokio runtime; cache sweep disabled"),
        }

        Self {
            entries,
            default_ttl,
            sweeper,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let entry = CacheEntry {
            value,
            expires_at: now_millis().saturating_add(ttl_ms),
        };
        self.entries.lock().insert(key, entry);
    }

    /// Live value for `key`. An expired entry is removed under the same lock.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = now_millis();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn has(&self, key: &K) -> bool {
        let now = now_millis();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => true,
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    pub fn delete(&self, key: &K) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry now. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        sweep_expired(&self.entries, now_millis())
    }

    /// Stop the sweep task and drop all entries.
    pub fn destroy(&self) {
        self.sweeper.cancel();
        self.clear();
    }
}

impl<K, V> Drop for TtlCache<K, V> {
    fn drop(&mut self) {
        self.sweeper.cancel();
    }
}

fn sweep_expired<K: Eq + Hash, V>(entries: &Entries<K, V>, now: i64) -> usize {
    let mut entries = entries.lock();
    let before = entries.len();
    entries.retain(|_, entry| entry.is_live(now));
    before - entries.len()
}

async fn sweep_loop<K: Eq + Hash, V>(
    entries: Weak<Entries<K, V>>,
    period: Duration,
    stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let Some(entries) = entries.upgrade() else { break };
                let removed = sweep_expired(&entries, now_millis());
                if removed > 0 {
                    debug!(removed, "swept expired cache entries");
                }
            }
        }
    }
}
