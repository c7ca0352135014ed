//! Topic ontology from the top-ranked peers.
//!
//! Interest, curation and label documents are classified into cuisines,
//! categories and ingredients with dictionary lookups. Classification is a
//! pure function of the documents; only fetching touches the network.

use crate::config::OntologyConfig;
use crate::directory::decode;
use crate::network::{FollowerNetwork, PeerNode};
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use nostr_core::{DocumentKind, LabelSet, QueryFilter, RelayGateway, TopicSet};
use nostr_sdk::Event;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ontology {
    pub cuisines: BTreeSet<String>,
    pub categories: BTreeSet<String>,
    pub ingredients: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Cuisines,
    Categories,
    Ingredients,
}

impl Ontology {
    /// Insert a term, lower-cased. Blank terms are ignored.
    pub fn insert(&mut self, bucket: Bucket, term: &str) {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return;
        }
        let set = match bucket {
            Bucket::Cuisines => &mut self.cuisines,
            Bucket::Categories => &mut self.categories,
            Bucket::Ingredients => &mut self.ingredients,
        };
        set.insert(term);
    }

    pub fn is_empty(&self) -> bool {
        self.cuisines.is_empty() && self.categories.is_empty() && self.ingredients.is_empty()
    }
}

/// Lookup lists, lower-cased once.
#[derive(Debug, Clone, Default)]
pub struct Dictionaries {
    cuisines: HashSet<String>,
    ingredients: HashSet<String>,
    category_markers: Vec<String>,
}

fn folded<'a, I: IntoIterator<Item = &'a String>>(words: I) -> impl Iterator<Item = String> + use<'a, I> {
    words
        .into_iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
}

impl From<&OntologyConfig> for Dictionaries {
    fn from(config: &OntologyConfig) -> Self {
        Self {
            cuisines: folded(&config.cuisines).collect(),
            ingredients: folded(&config.ingredients).collect(),
            category_markers: folded(&config.category_markers).collect(),
        }
    }
}

impl Dictionaries {
    /// Labels: a category marker wins, then known ingredients; the rest are
    /// categories.
    pub fn classify_label(&self, label: &str) -> Bucket {
        let label = label.trim().to_lowercase();
        if self.category_markers.iter().any(|m| label.contains(m.as_str())) {
            Bucket::Categories
        } else if self.ingredients.contains(&label) {
            Bucket::Ingredients
        } else {
            Bucket::Categories
        }
    }

    pub fn classify_curation_topic(&self, topic: &str) -> Bucket {
        if self.cuisines.contains(&topic.trim().to_lowercase()) {
            Bucket::Cuisines
        } else {
            Bucket::Categories
        }
    }

    /// Interest topics always land in categories.
    pub fn classify_interest_topic(&self, _topic: &str) -> Bucket {
        Bucket::Categories
    }

    /// Classify a batch of documents. Unsupported kinds and malformed
    /// documents are skipped.
    pub fn classify<'e>(&self, events: impl IntoIterator<Item = &'e Event>) -> Ontology {
        let mut ontology = Ontology::default();
        for event in events {
            let Some(kind) = DocumentKind::from_u16(event.kind.as_u16()) else {
                continue;
            };

            if kind == DocumentKind::Label {
                if let Some(labels) = decode::<LabelSet>(event, "label") {
                    for label in &labels.labels {
                        ontology.insert(self.classify_label(label), label);
                    }
                }
                continue;
            }

            let topical = DocumentKind::INTERESTS.contains(&kind) || DocumentKind::CURATIONS.contains(&kind);
            if !topical {
                continue;
            }
            if let Some(set) = decode::<TopicSet>(event, "topic set") {
                for topic in &set.topics {
                    let bucket = if set.is_curation() {
                        self.classify_curation_topic(topic)
                    } else {
                        self.classify_interest_topic(topic)
                    };
                    ontology.insert(bucket, topic);
                }
            }
        }
        ontology
    }
}

pub struct OntologyExtractor<'a> {
    gateway: &'a RelayGateway,
    dictionaries: Dictionaries,
    /// Peers whose documents are fetched at once.
    workers: usize,
}

impl<'a> OntologyExtractor<'a> {
    pub fn new(gateway: &'a RelayGateway, config: &OntologyConfig, workers: usize) -> Self {
        Self {
            gateway,
            dictionaries: Dictionaries::from(config),
            workers: workers.max(1),
        }
    }

    pub fn dictionaries(&self) -> &Dictionaries {
        &self.dictionaries
    }

    /// Ontology of the `top_n` highest-scoring peers (ties keep follow order).
    pub async fn extract(&self, network: &FollowerNetwork, top_n: usize) -> Ontology {
        let selected: Vec<&PeerNode> = network.ranked().into_iter().take(top_n).collect();
        info!(peers = selected.len(), workers = self.workers, "extracting ontology");

        // Buckets are sets, so completion order does not matter.
        let batches: Vec<Vec<Event>> = stream::iter(selected)
            .map(|node| self.peer_documents(node))
            .buffer_unordered(self.workers)
            .collect()
            .await;
        let ontology = self.dictionaries.classify(batches.iter().flatten());

        debug!(
            cuisines = ontology.cuisines.len(),
            categories = ontology.categories.len(),
            ingredients = ontology.ingredients.len(),
            "ontology extracted"
        );
        ontology
    }

    /// Interest, curation and label documents authored by one peer.
    async fn peer_documents(&self, node: &PeerNode) -> Vec<Event> {
        let author = node.peer;
        let queries = [
            ("interests", QueryFilter::new().kinds(DocumentKind::INTERESTS)),
            ("curations", QueryFilter::new().kinds(DocumentKind::CURATIONS)),
            ("labels", QueryFilter::new().kind(DocumentKind::Label)),
        ];

        let results = join_all(queries.iter().map(|(what, filter)| async move {
            let filter = filter.clone().author(author);
            match self.gateway.fetch_all(&node.endpoints, &filter).await {
                Ok(events) => events,
                Err(e) => {
                    warn!(peer = %author, "failed to fetch {what}: {e}");
                    Vec::new()
                }
            }
        }))
        .await;

        results.into_iter().flatten().collect()
    }
}
