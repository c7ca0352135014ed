//! Relay endpoints and read/write capability normalization.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a relay endpoint is used for by the peer who listed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayCapability {
    Read,
    Write,
    ReadWrite,
}

/// The direction a gateway operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl RelayCapability {
    pub fn allows(self, access: Access) -> bool {
        matches!(
            (self, access),
            (Self::ReadWrite, _) | (Self::Read, Access::Read) | (Self::Write, Access::Write)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::ReadWrite => "read+write",
        }
    }
}

impl fmt::Display for RelayCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker text that could not be mapped to a capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCapability(pub String);

impl fmt::Display for UnknownCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown relay capability marker: '{}'", self.0)
    }
}

impl std::error::Error for UnknownCapability {}

impl FromStr for RelayCapability {
    type Err = UnknownCapability;

    /// Accepts `read`, `write`, `read+write` and their spelling variants
    /// (`r`, `w`, `r+w`, `rw`, `Read/Write`, ...). An empty marker means both,
    /// matching NIP-65 where an unmarked `r` tag is read+write.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut read = false;
        let mut write = false;
        let mut saw_token = false;

        for token in s
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            saw_token = true;
            match token.to_ascii_lowercase().as_str() {
                "read" | "r" => read = true,
                "write" | "w" => write = true,
                "readwrite" | "rw" | "both" => {
                    read = true;
                    write = true;
                }
                _ => return Err(UnknownCapability(s.to_string())),
            }
        }

        match (saw_token, read, write) {
            (false, _, _) | (_, true, true) => Ok(Self::ReadWrite),
            (_, true, false) => Ok(Self::Read),
            (_, false, true) => Ok(Self::Write),
            (_, false, false) => Err(UnknownCapability(s.to_string())),
        }
    }
}

/// A relay URL together with the capability its owner declared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelayEndpoint {
    pub url: String,
    pub capability: RelayCapability,
}

impl RelayEndpoint {
    pub fn new(url: impl Into<String>, capability: RelayCapability) -> Self {
        Self {
            url: normalize_url(&url.into()),
            capability,
        }
    }

    pub fn read_write(url: impl Into<String>) -> Self {
        Self::new(url, RelayCapability::ReadWrite)
    }
}

/// Trim whitespace and a trailing slash so `wss://a/` and `wss://a` dedup.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    trimmed.strip_suffix('/').unwrap_or(trimmed).to_string()
}

/// Whether a string looks like a websocket relay URL.
pub fn is_relay_url(url: &str) -> bool {
    let url = url.trim();
    (url.starts_with("wss://") || url.starts_with("ws://")) && url.len() > "wss://".len()
}

/// URLs of the endpoints eligible for `access`, deduplicated, in listing order.
pub fn select_urls(endpoints: &[RelayEndpoint], access: Access) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for endpoint in endpoints.iter().filter(|e| e.capability.allows(access)) {
        if !urls.contains(&endpoint.url) {
            urls.push(endpoint.url.clone());
        }
    }
    urls
}
