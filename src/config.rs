use anyhow::{Context, Result};
use nostr_core::relay::is_relay_url;
use nostr_core::{default_bootstrap_relays, GatewayConfig, RelayEndpoint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "FLAVORGRAPH_CONFIG";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub relays: RelaysConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub ontology: OntologyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelaysConfig {
    /// Queried for relay lists, and used when a peer has no relays of its own.
    #[serde(default = "default_relays::bootstrap")]
    pub bootstrap: Vec<String>,
    #[serde(default = "default_relays::query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_relays::count_timeout_ms")]
    pub count_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache::sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_cache::relay_list_ttl_secs")]
    pub relay_list_ttl_secs: u64,
    #[serde(default = "default_cache::follow_list_ttl_secs")]
    pub follow_list_ttl_secs: u64,
    #[serde(default = "default_cache::profile_ttl_secs")]
    pub profile_ttl_secs: u64,
}

/// Worker pool size and signal weights.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ScoringConfig {
    /// Peers scored at once. 0 picks the available parallelism.
    #[serde(default)]
    pub concurrency: usize,
    #[serde(default = "default_scoring::reciprocity")]
    pub reciprocity: i64,
    /// Added per reaction the peer sent the root.
    #[serde(default = "default_scoring::inbound_reaction")]
    pub inbound_reaction: i64,
    #[serde(default = "default_scoring::outbound_reaction")]
    pub outbound_reaction: i64,
    #[serde(default = "default_scoring::zap")]
    pub zap: i64,
    /// Added per distinct group.
    #[serde(default = "default_scoring::group_membership")]
    pub group_membership: i64,
    #[serde(default = "default_scoring::trusted_topic")]
    pub trusted_topic: i64,
    #[serde(default = "default_scoring::trusted_prefix")]
    pub trusted_prefix: String,
    /// Exact relationship category weights.
    #[serde(default = "default_scoring::relationship")]
    pub relationship: BTreeMap<String, i64>,
}

/// Classifier dictionaries. Entries are matched case-insensitively.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct OntologyConfig {
    #[serde(default = "default_ontology::top_n")]
    pub top_n: usize,
    #[serde(default = "default_ontology::cuisines")]
    pub cuisines: Vec<String>,
    #[serde(default = "default_ontology::ingredients")]
    pub ingredients: Vec<String>,
    /// Label substrings that force the categories bucket (e.g. "gluten-free").
    #[serde(default = "default_ontology::category_markers")]
    pub category_markers: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for RelaysConfig {
    fn default() -> Self {
        Self {
            bootstrap: default_relays::bootstrap(),
            query_timeout_ms: default_relays::query_timeout_ms(),
            count_timeout_ms: default_relays::count_timeout_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_cache::sweep_interval_secs(),
            relay_list_ttl_secs: default_cache::relay_list_ttl_secs(),
            follow_list_ttl_secs: default_cache::follow_list_ttl_secs(),
            profile_ttl_secs: default_cache::profile_ttl_secs(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            concurrency: 0,
            reciprocity: default_scoring::reciprocity(),
            inbound_reaction: default_scoring::inbound_reaction(),
            outbound_reaction: default_scoring::outbound_reaction(),
            zap: default_scoring::zap(),
            group_membership: default_scoring::group_membership(),
            trusted_topic: default_scoring::trusted_topic(),
            trusted_prefix: default_scoring::trusted_prefix(),
            relationship: default_scoring::relationship(),
        }
    }
}

impl Default for OntologyConfig {
    fn default() -> Self {
        Self {
            top_n: default_ontology::top_n(),
            cuisines: default_ontology::cuisines(),
            ingredients: default_ontology::ingredients(),
            category_markers: default_ontology::category_markers(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

mod default_relays {
    pub fn bootstrap() -> Vec<String> {
        super::default_bootstrap_relays()
    }

    pub fn query_timeout_ms() -> u64 {
        5000
    }

    pub fn count_timeout_ms() -> u64 {
        3000
    }
}

mod default_cache {
    pub fn sweep_interval_secs() -> u64 {
        60
    }

    // Relay lists rarely change.
    pub fn relay_list_ttl_secs() -> u64 {
        6 * 60 * 60
    }

    pub fn follow_list_ttl_secs() -> u64 {
        15 * 60
    }

    pub fn profile_ttl_secs() -> u64 {
        5 * 60
    }
}

mod default_scoring {
    use std::collections::BTreeMap;

    pub fn reciprocity() -> i64 {
        5
    }

    pub fn inbound_reaction() -> i64 {
        1
    }

    pub fn outbound_reaction() -> i64 {
        2
    }

    pub fn zap() -> i64 {
        4
    }

    pub fn group_membership() -> i64 {
        1
    }

    pub fn trusted_topic() -> i64 {
        2
    }

    pub fn trusted_prefix() -> String {
        "trusted-".to_string()
    }

    pub fn relationship() -> BTreeMap<String, i64> {
        BTreeMap::from([("friend".to_string(), 5)])
    }
}

mod default_ontology {
    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    pub fn top_n() -> usize {
        5
    }

    pub fn cuisines() -> Vec<String> {
        words(&[
            "american",
            "arabic",
            "french",
            "indian",
            "italian",
            "japanese",
            "mediterranean",
            "mexican",
            "thai",
        ])
    }

    pub fn ingredients() -> Vec<String> {
        words(&[
            "balsamic",
            "basil",
            "beans",
            "cheese",
            "garlic",
            "hot sauce",
            "ketchup",
            "mayonnaise",
            "mustard",
            "olive oil",
            "olives",
            "onion",
            "oregano",
            "pepper",
            "rice",
            "salt",
            "soy sauce",
            "tomato",
            "worcestershire",
        ])
    }

    pub fn category_markers() -> Vec<String> {
        words(&["free"])
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl RelaysConfig {
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            bootstrap: self
                .bootstrap
                .iter()
                .map(|url| RelayEndpoint::read_write(url.as_str()))
                .collect(),
            query_timeout: Duration::from_millis(self.query_timeout_ms),
            count_timeout: Duration::from_millis(self.count_timeout_ms),
        }
    }
}

impl ScoringConfig {
    /// Worker pool size: the configured value, else available parallelism, else 4.
    pub fn worker_limit(&self) -> usize {
        if self.concurrency > 0 {
            return self.concurrency;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(path);
        let content = fs::read_to_string(expanded_path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path))?;

        toml::from_str(&content).with_context(|| format!("Failed to parse TOML config: {}", path))
    }

    /// Config file to use: `--config`, then `$FLAVORGRAPH_CONFIG`, then the
    /// platform config directory if a file exists there.
    pub fn resolve_path(flag: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = flag {
            return Some(PathBuf::from(shellexpand::tilde(path).as_ref()));
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(shellexpand::tilde(&path).as_ref()));
            }
        }
        directories::ProjectDirs::from("", "", "flavorgraph")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .filter(|path| path.is_file())
    }

    /// Load from the resolved path, or fall back to built-in defaults.
    pub fn load(flag: Option<&str>) -> Result<Self> {
        match Self::resolve_path(flag) {
            Some(path) => Self::load_from_file(&path.to_string_lossy()),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for url in &self.relays.bootstrap {
            if !is_relay_url(url) {
                anyhow::bail!("Bootstrap relay URL must start with ws:// or wss://: {}", url);
            }
        }
        if self.relays.query_timeout_ms == 0 || self.relays.count_timeout_ms == 0 {
            anyhow::bail!("Relay timeouts must be greater than zero");
        }

        let cache = &self.cache;
        if [
            cache.sweep_interval_secs,
            cache.relay_list_ttl_secs,
            cache.follow_list_ttl_secs,
            cache.profile_ttl_secs,
        ]
        .contains(&0)
        {
            anyhow::bail!("Cache TTLs and sweep interval must be greater than zero");
        }

        let s = &self.scoring;
        let weights = [
            s.reciprocity,
            s.inbound_reaction,
            s.outbound_reaction,
            s.zap,
            s.group_membership,
            s.trusted_topic,
        ];
        if weights.iter().chain(s.relationship.values()).any(|w| *w < 0) {
            anyhow::bail!("Signal weights must not be negative");
        }

        if self.ontology.top_n == 0 {
            anyhow::bail!("ontology.top_n must be greater than zero");
        }

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
