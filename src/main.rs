use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flavorgraph::{parse_root, Config, SocialGraph, SocialGraphResult};
use nostr_sdk::prelude::ToBech32;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "flavorgraph")]
#[command(about = "Rank the peers a Nostr identity follows and extract their food topics")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to $FLAVORGRAPH_CONFIG, then the
    /// platform config directory)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, score and extract the web of flavor for a root identity
    Graph {
        /// Root identity (hex or npub)
        peer: String,

        /// Number of top peers the ontology is extracted from
        #[arg(long)]
        top: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show a peer's declared relays
    Relays {
        /// Identity (hex or npub)
        peer: String,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Print built-in defaults instead
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    init_logging(&config.logging.level)?;

    match cli.command {
        Commands::Config { default } => {
            let shown = if default { Config::default() } else { config };
            print!("{}", shown.to_toml()?);
            Ok(())
        }
        Commands::Relays { peer } => {
            config.validate().context("Configuration validation failed")?;
            show_relays(config, &peer).await
        }
        Commands::Graph { peer, top, json } => {
            if let Some(top) = top {
                config.ontology.top_n = top;
            }
            config.validate().context("Configuration validation failed")?;
            run_graph(config, &peer, json).await
        }
    }
}

async fn run_graph(config: Config, peer: &str, json: bool) -> Result<()> {
    // Fail on a bad identity before opening any relay connection.
    parse_root(peer)?;

    let graph = SocialGraph::connect(config)?;
    let cancel = CancellationToken::new();

    let watcher = cancel.clone();
    tokio::spawn(async move {
        if wait_for_shutdown().await.is_ok() {
            tracing::info!("Cancelling in-flight run");
            watcher.cancel();
        }
    });

    let result = graph.compute_social_graph(peer, &cancel).await;
    graph.shutdown().await;
    let result = result.context("Failed to compute social graph")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

async fn show_relays(config: Config, peer: &str) -> Result<()> {
    let pk = parse_root(peer)?;
    let graph = SocialGraph::connect(config)?;

    let relays = graph.directory().relay_list(&pk).await;
    graph.shutdown().await;
    let relays = relays.context("Failed to fetch relay list")?;

    if relays.is_empty() {
        println!("No relay list published; bootstrap relays will be used.");
    }
    for endpoint in relays {
        println!("{:<10} {}", endpoint.capability.as_str(), endpoint.url);
    }
    Ok(())
}

fn print_result(result: &SocialGraphResult) {
    let network = &result.network;
    let root = network.root.to_bech32().unwrap_or_else(|_| network.root.to_hex());
    println!("Root: {root}");
    println!("Follows: {}\n", network.len());

    println!("{:>4}  {:>6}  {:<24}  {:<18}  Groups", "#", "Score", "Peer", "Name");
    for (rank, node) in network.ranked().iter().enumerate() {
        let hex = node.peer.to_hex();
        let name = node
            .profile
            .as_ref()
            .and_then(|p| p.name.clone())
            .or_else(|| node.display_label.clone())
            .unwrap_or_default();
        println!(
            "{:>4}  {:>6}  {:<24}  {:<18}  {}",
            rank + 1,
            node.influence_score,
            format!("{}…{}", &hex[..8], &hex[hex.len() - 8..]),
            name,
            node.groups.join(", ")
        );
    }

    let ontology = &result.ontology;
    println!();
    println!("Cuisines:    {}", join(&ontology.cuisines));
    println!("Categories:  {}", join(&ontology.categories));
    println!("Ingredients: {}", join(&ontology.ingredients));
}

fn join<'a>(terms: impl IntoIterator<Item = &'a String>) -> String {
    let terms: Vec<&str> = terms.into_iter().map(String::as_str).collect();
    if terms.is_empty() {
        "-".to_string()
    } else {
        terms.join(", ")
    }
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            },
            _ = signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
        tracing::info!("Received Ctrl+C");
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match level.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter.to_string())),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();

    Ok(())
}
