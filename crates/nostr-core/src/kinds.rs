//! Event kinds the social graph reads.

use nostr_sdk::Kind;

/// Typed view over the protocol kind numbers used by the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    ProfileMetadata,
    ContactList,
    Reaction,
    Label,
    ZapRequest,
    ZapReceipt,
    RelayList,
    InterestList,
    FollowSet,
    CuratedArticleSet,
    InterestSet,
    LongFormArticle,
    RelationshipStatus,
}

impl DocumentKind {
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::ProfileMetadata => 0,
            Self::ContactList => 3,
            Self::Reaction => 7,
            Self::Label => 1985,
            Self::ZapRequest => 9734,
            Self::ZapReceipt => 9735,
            Self::RelayList => 10002,
            Self::InterestList => 10015,
            Self::FollowSet => 30000,
            Self::CuratedArticleSet => 30004,
            Self::InterestSet => 30015,
            Self::LongFormArticle => 30023,
            Self::RelationshipStatus => 30382,
        }
    }

    pub fn from_u16(kind: u16) -> Option<Self> {
        let kind = match kind {
            0 => Self::ProfileMetadata,
            3 => Self::ContactList,
            7 => Self::Reaction,
            1985 => Self::Label,
            9734 => Self::ZapRequest,
            9735 => Self::ZapReceipt,
            10002 => Self::RelayList,
            10015 => Self::InterestList,
            30000 => Self::FollowSet,
            30004 => Self::CuratedArticleSet,
            30015 => Self::InterestSet,
            30023 => Self::LongFormArticle,
            30382 => Self::RelationshipStatus,
            _ => return None,
        };
        Some(kind)
    }

    /// Kinds whose `t` tags declare a peer's interests.
    pub const INTERESTS: [DocumentKind; 2] = [Self::InterestList, Self::InterestSet];

    /// Kinds whose `t` tags describe curated collections.
    pub const CURATIONS: [DocumentKind; 2] = [Self::CuratedArticleSet, Self::LongFormArticle];
}

impl From<DocumentKind> for u16 {
    fn from(kind: DocumentKind) -> Self {
        kind.as_u16()
    }
}

impl From<DocumentKind> for Kind {
    fn from(kind: DocumentKind) -> Self {
        Kind::from(kind.as_u16())
    }
}
