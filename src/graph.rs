//! Orchestration: build, score and extract for one root identity.

use crate::config::Config;
use crate::directory::PeerDirectory;
use crate::error::GraphError;
use crate::network::{FollowerNetwork, NetworkBuilder};
use crate::ontology::{Ontology, OntologyExtractor};
use crate::scoring::InfluenceScorer;
use nostr_core::{NostrSdkTransport, RelayGateway, RelayTransport};
use nostr_sdk::PublicKey;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct SocialGraphResult {
    pub network: FollowerNetwork,
    pub ontology: Ontology,
}

/// Owns the relay gateway and the peer caches for as long as it lives.
/// Call [`SocialGraph::shutdown`] to stop cache sweeps and close relay
/// connections.
pub struct SocialGraph {
    config: Config,
    gateway: Arc<RelayGateway>,
    directory: PeerDirectory,
}

impl SocialGraph {
    pub fn new(config: Config, transport: Arc<dyn RelayTransport>) -> Result<Self, GraphError> {
        config
            .validate()
            .map_err(|e| GraphError::Config(format!("{e:#}")))?;

        let gateway = Arc::new(RelayGateway::new(transport, config.relays.gateway_config()));
        let directory = PeerDirectory::new(gateway.clone(), &config.cache);
        Ok(Self {
            config,
            gateway,
            directory,
        })
    }

    /// Connect through a fresh `nostr-sdk` client.
    pub fn connect(config: Config) -> Result<Self, GraphError> {
        Self::new(config, Arc::new(NostrSdkTransport::new()))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    /// Build the root's follower network, score it and extract the ontology
    /// of its top peers. Partial relay data still yields a result; only an
    /// unparsable root or cancellation fail.
    pub async fn compute_social_graph(
        &self,
        root: &str,
        cancel: &CancellationToken,
    ) -> Result<SocialGraphResult, GraphError> {
        let root = parse_root(root)?;
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        info!(root = %root, "computing social graph");

        let endpoints = until_cancelled(cancel, self.directory.endpoints_for(&root, None)).await?;

        let builder = NetworkBuilder::new(&self.directory);
        let network = until_cancelled(cancel, builder.build(&root, &endpoints)).await?;

        let scorer = InfluenceScorer::new(&self.directory, &self.config.scoring);
        let network = scorer.score(network, &endpoints, cancel).await?;

        let extractor = OntologyExtractor::new(
            &self.gateway,
            &self.config.ontology,
            self.config.scoring.worker_limit(),
        );
        let ontology = until_cancelled(
            cancel,
            extractor.extract(&network, self.config.ontology.top_n),
        )
        .await?;

        Ok(SocialGraphResult { network, ontology })
    }

    pub async fn shutdown(&self) {
        self.directory.destroy();
        self.gateway.shutdown().await;
        info!("social graph shut down");
    }
}

/// Accept a hex or bech32 (`npub`) public key.
pub fn parse_root(input: &str) -> Result<PublicKey, GraphError> {
    let trimmed = input.trim();
    PublicKey::parse(trimmed).map_err(|e| GraphError::InvalidRoot {
        input: trimmed.to_string(),
        reason: e.to_string(),
    })
}

/// Run `fut` unless `cancel` fires first; dropping `fut` abandons its
/// pending relay calls.
pub(crate) async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, GraphError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(GraphError::Cancelled),
        output = fut => Ok(output),
    }
}
