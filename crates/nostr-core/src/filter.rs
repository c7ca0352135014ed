//! Transport-neutral query filter.
//!
//! Mirrors the subset of a NIP-01 filter the graph needs. Keeping it separate
//! from `nostr_sdk::Filter` lets the gateway hash it for cache keys and
//! re-check untrusted relay responses against it.

use crate::kinds::DocumentKind;
use nostr_sdk::{Event, PublicKey};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryFilter {
    pub authors: Vec<PublicKey>,
    pub kinds: Vec<u16>,
    /// Single-letter tag filters (`#p`, `#t`, ...) keyed by the tag letter.
    pub tags: BTreeMap<char, Vec<String>>,
    pub limit: Option<usize>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn author(mut self, author: PublicKey) -> Self {
        self.authors.push(author);
        self
    }

    pub fn kind(mut self, kind: DocumentKind) -> Self {
        self.kinds.push(kind.as_u16());
        self
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = DocumentKind>) -> Self {
        self.kinds.extend(kinds.into_iter().map(DocumentKind::as_u16));
        self
    }

    pub fn tag(mut self, letter: char, value: impl Into<String>) -> Self {
        self.tags.entry(letter).or_default().push(value.into());
        self
    }

    /// Shorthand for a `#p` filter on a pubkey.
    pub fn pubkey(self, pubkey: &PublicKey) -> Self {
        self.tag('p', pubkey.to_hex())
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `event` satisfies every constraint (the limit is not an
    /// event-level constraint and is ignored here).
    pub fn matches(&self, event: &Event) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind.as_u16()) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.contains(&event.pubkey) {
            return false;
        }
        self.tags.iter().all(|(letter, values)| {
            let name = letter.to_string();
            event.tags.iter().any(|tag| {
                let s = tag.as_slice();
                s.first() == Some(&name)
                    && s.get(1).is_some_and(|v| values.contains(v))
            })
        })
    }
}

impl fmt::Display for QueryFilter {
    /// Stable signature used in logs and cache keys.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kinds={:?}", self.kinds)?;
        if !self.authors.is_empty() {
            let authors: Vec<String> = self.authors.iter().map(PublicKey::to_hex).collect();
            write!(f, " authors={}", authors.join(","))?;
        }
        for (letter, values) in &self.tags {
            write!(f, " #{}={}", letter, values.join(","))?;
        }
        if let Some(limit) = self.limit {
            write!(f, " limit={limit}")?;
        }
        Ok(())
    }
}
