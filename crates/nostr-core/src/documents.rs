//! Typed decoding of the documents the social graph reads.
//!
//! Each supported kind gets one struct with a `TryFrom<&Event>` impl. Tags a
//! decoder does not know about are ignored; tags it does know about but
//! cannot parse are skipped entry by entry, so one bad `p` tag never discards
//! a whole follow list.

use crate::error::DocumentError;
use crate::kinds::DocumentKind;
use crate::relay::{is_relay_url, RelayCapability, RelayEndpoint};
use nostr_sdk::{Event, PublicKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Name given to follow sets that carry no `d` tag.
pub const UNNAMED_SET: &str = "unnamed-set";

/// Iterate the raw values of every tag called `name`.
pub fn tags_named<'a>(event: &'a Event, name: &'a str) -> impl Iterator<Item = &'a [String]> + 'a {
    event
        .tags
        .iter()
        .map(|tag| tag.as_slice())
        .filter(move |s| s.first().map(String::as_str) == Some(name))
}

/// Second element of the first tag called `name`.
pub fn first_tag_value<'a>(event: &'a Event, name: &'a str) -> Option<&'a str> {
    tags_named(event, name)
        .find_map(|s| s.get(1))
        .map(String::as_str)
}

fn expect_kind(event: &Event, kind: DocumentKind) -> Result<(), DocumentError> {
    let found = event.kind.as_u16();
    if found == kind.as_u16() {
        Ok(())
    } else {
        Err(DocumentError::WrongKind {
            expected: kind.as_u16(),
            found,
        })
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ── Relay list (kind 10002) ─────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayList {
    pub endpoints: Vec<RelayEndpoint>,
}

impl TryFrom<&Event> for RelayList {
    type Error = DocumentError;

    fn try_from(event: &Event) -> Result<Self, Self::Error> {
        expect_kind(event, DocumentKind::RelayList)?;

        let mut endpoints: Vec<RelayEndpoint> = Vec::new();
        for tag in tags_named(event, "r") {
            let Some(url) = tag.get(1).filter(|u| is_relay_url(u)) else {
                debug!(event = %event.id, "skipping relay tag without a websocket url");
                continue;
            };
            let marker = tag.get(2).map(String::as_str).unwrap_or("");
            let capability = match marker.parse::<RelayCapability>() {
                Ok(c) => c,
                Err(e) => {
                    debug!(event = %event.id, "{e}");
                    continue;
                }
            };
            let endpoint = RelayEndpoint::new(url.as_str(), capability);
            if !endpoints.iter().any(|e| e.url == endpoint.url) {
                endpoints.push(endpoint);
            }
        }

        Ok(Self { endpoints })
    }
}

// ── Follow list (kind 3) ────────────────────────────────────────

/// One followed peer as listed in a follow-list document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowEdge {
    pub peer: PublicKey,
    pub preferred_relay: Option<String>,
    pub display_label: Option<String>,
}

/// A peer's follow list. Peers are unique; the first listing wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowList {
    pub edges: Vec<FollowEdge>,
}

impl FollowList {
    pub fn contains(&self, peer: &PublicKey) -> bool {
        self.edges.iter().any(|e| &e.peer == peer)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl TryFrom<&Event> for FollowList {
    type Error = DocumentError;

    fn try_from(event: &Event) -> Result<Self, Self::Error> {
        expect_kind(event, DocumentKind::ContactList)?;

        let mut edges: Vec<FollowEdge> = Vec::new();
        for tag in tags_named(event, "p") {
            let Some(peer) = tag.get(1).and_then(|hex| PublicKey::from_hex(hex).ok()) else {
                debug!(event = %event.id, "skipping follow entry with invalid pubkey");
                continue;
            };
            if edges.iter().any(|e| e.peer == peer) {
                continue;
            }
            let preferred_relay = non_empty(tag.get(2))
                .filter(|u| is_relay_url(u))
                .map(|u| crate::relay::normalize_url(&u));
            edges.push(FollowEdge {
                peer,
                preferred_relay,
                display_label: non_empty(tag.get(3)),
            });
        }

        Ok(Self { edges })
    }
}

// ── Follow set (kind 30000) ─────────────────────────────────────

/// A named group of peers curated by its author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowSet {
    pub name: String,
    pub members: Vec<PublicKey>,
}

impl TryFrom<&Event> for FollowSet {
    type Error = DocumentError;

    fn try_from(event: &Event) -> Result<Self, Self::Error> {
        expect_kind(event, DocumentKind::FollowSet)?;

        let name = first_tag_value(event, "d")
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(UNNAMED_SET)
            .to_string();

        let mut members: Vec<PublicKey> = Vec::new();
        for pk in tags_named(event, "p").filter_map(|s| s.get(1)) {
            match PublicKey::from_hex(pk) {
                Ok(pk) if !members.contains(&pk) => members.push(pk),
                Ok(_) => {}
                Err(_) => debug!(event = %event.id, set = %name, "skipping invalid set member"),
            }
        }

        Ok(Self { name, members })
    }
}

// ── Relationship status (kind 30382) ────────────────────────────

/// The author's categorisation of one other peer (`d` = target, `n` = category).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipStatus {
    pub target: PublicKey,
    pub categories: Vec<String>,
}

impl TryFrom<&Event> for RelationshipStatus {
    type Error = DocumentError;

    fn try_from(event: &Event) -> Result<Self, Self::Error> {
        expect_kind(event, DocumentKind::RelationshipStatus)?;

        let d = first_tag_value(event, "d").ok_or(DocumentError::MissingTag("d"))?;
        let target = PublicKey::from_hex(d.trim()).map_err(|e| DocumentError::InvalidTag {
            tag: "d",
            reason: e.to_string(),
        })?;

        let mut categories: Vec<String> = Vec::new();
        for category in tags_named(event, "n").filter_map(|s| non_empty(s.get(1))) {
            let category = category.to_lowercase();
            if !categories.contains(&category) {
                categories.push(category);
            }
        }

        Ok(Self { target, categories })
    }
}

// ── Interest / curation sets ────────────────────────────────────

/// Topic (`t`) tags from an interest or curation document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    pub kind: DocumentKind,
    pub topics: Vec<String>,
}

impl TopicSet {
    pub fn is_curation(&self) -> bool {
        DocumentKind::CURATIONS.contains(&self.kind)
    }
}

impl TryFrom<&Event> for TopicSet {
    type Error = DocumentError;

    fn try_from(event: &Event) -> Result<Self, Self::Error> {
        let found = event.kind.as_u16();
        let kind = DocumentKind::from_u16(found)
            .filter(|k| DocumentKind::INTERESTS.contains(k) || DocumentKind::CURATIONS.contains(k))
            .ok_or(DocumentError::WrongKind {
                expected: DocumentKind::InterestList.as_u16(),
                found,
            })?;

        let topics = tags_named(event, "t")
            .filter_map(|s| non_empty(s.get(1)))
            .collect();

        Ok(Self { kind, topics })
    }
}

// ── Labels (kind 1985) ──────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
    /// `L` namespace tags.
    pub namespaces: Vec<String>,
    /// `l` label tags.
    pub labels: Vec<String>,
}

impl TryFrom<&Event> for LabelSet {
    type Error = DocumentError;

    fn try_from(event: &Event) -> Result<Self, Self::Error> {
        expect_kind(event, DocumentKind::Label)?;

        Ok(Self {
            namespaces: tags_named(event, "L")
                .filter_map(|s| non_empty(s.get(1)))
                .collect(),
            labels: tags_named(event, "l")
                .filter_map(|s| non_empty(s.get(1)))
                .collect(),
        })
    }
}

// ── Zap receipts (kind 9735) ────────────────────────────────────

/// Where a receipt's payer identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayerSource {
    /// The receipt's own `P` tag.
    Tag,
    /// The embedded zap request in the `description` tag.
    EmbeddedRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZapReceipt {
    pub recipient: PublicKey,
    pub payer: Option<PublicKey>,
    pub payer_source: Option<PayerSource>,
}

impl ZapReceipt {
    pub fn is_from(&self, payer: &PublicKey) -> bool {
        self.payer.as_ref() == Some(payer)
    }
}

impl TryFrom<&Event> for ZapReceipt {
    type Error = DocumentError;

    fn try_from(event: &Event) -> Result<Self, Self::Error> {
        expect_kind(event, DocumentKind::ZapReceipt)?;

        let p = first_tag_value(event, "p").ok_or(DocumentError::MissingTag("p"))?;
        let recipient = PublicKey::from_hex(p).map_err(|e| DocumentError::InvalidTag {
            tag: "p",
            reason: e.to_string(),
        })?;

        if let Some(payer) = first_tag_value(event, "P").and_then(|hex| PublicKey::from_hex(hex).ok()) {
            return Ok(Self {
                recipient,
                payer: Some(payer),
                payer_source: Some(PayerSource::Tag),
            });
        }

        let payer = first_tag_value(event, "description")
            .and_then(|description| payer_from_request(description, &recipient));

        Ok(Self {
            recipient,
            payer,
            payer_source: payer.map(|_| PayerSource::EmbeddedRequest),
        })
    }
}

/// Recover the payer from an embedded zap request. The request is only
/// trusted when it is a zap request addressed to the receipt's recipient.
fn payer_from_request(description: &str, recipient: &PublicKey) -> Option<PublicKey> {
    let request: Event = match serde_json::from_str(description) {
        Ok(request) => request,
        Err(e) => {
            debug!("ignoring unparsable zap request: {e}");
            return None;
        }
    };

    if request.kind.as_u16() != DocumentKind::ZapRequest.as_u16() {
        debug!(kind = request.kind.as_u16(), "embedded document is not a zap request");
        return None;
    }

    let targets_recipient = tags_named(&request, "p")
        .filter_map(|s| s.get(1))
        .any(|hex| hex == &recipient.to_hex());
    if !targets_recipient {
        debug!(request = %request.id, "zap request does not target the receipt recipient");
        return None;
    }

    Some(request.pubkey)
}

// ── Profile metadata (kind 0) ───────────────────────────────────

/// The slice of a kind-0 profile the graph reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct RawProfile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    about: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

impl TryFrom<&Event> for ProfileSummary {
    type Error = DocumentError;

    fn try_from(event: &Event) -> Result<Self, Self::Error> {
        expect_kind(event, DocumentKind::ProfileMetadata)?;

        let raw: RawProfile = serde_json::from_str(&event.content)
            .map_err(|e| DocumentError::MalformedContent(e.to_string()))?;

        Ok(Self {
            name: non_empty(raw.name.as_ref()).or_else(|| non_empty(raw.display_name.as_ref())),
            bio: non_empty(raw.about.as_ref()),
            avatar_url: non_empty(raw.picture.as_ref()),
        })
    }
}
