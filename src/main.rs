//! InsightMap - Knowledge Graph Notes with Streamed AI Expansion
//!
//! Serves the note graph and generation endpoints over HTTP.

use anyhow::Result;
use clap::{Parser, Subcommand};
use insightmap::{
    api::build_app,
    config::InsightMapConfig,
    generation::{GenerationState, OpenAiProvider, StreamPipeline},
    graph::GraphBuilder,
    node::{GraphState, NodeStore},
    session::SessionRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "insightmap")]
#[command(version)]
#[command(about = "Knowledge graph notes with streamed AI expansion")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "INSIGHTMAP_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Directory holding node files
        #[arg(long)]
        nodes_dir: Option<PathBuf>,
    },

    /// Print the derived graph as JSON
    Graph {
        /// Directory holding node files
        #[arg(long)]
        nodes_dir: Option<PathBuf>,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("insightmap={},tower_http=debug", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let mut config = match cli.config {
        Some(ref path) => InsightMapConfig::load(path)?,
        None => InsightMapConfig::default(),
    };

    match cli.command {
        Commands::Serve {
            host,
            port,
            nodes_dir,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(dir) = nodes_dir {
                config.storage.nodes_dir = dir;
            }
            run_server(config).await?;
        }
        Commands::Graph { nodes_dir } => {
            if let Some(dir) = nodes_dir {
                config.storage.nodes_dir = dir;
            }
            print_graph(&config).await?;
        }
        Commands::Config { default } => {
            let shown = if default {
                InsightMapConfig::default()
            } else {
                config
            };
            println!("{}", shown.to_toml()?);
        }
    }

    Ok(())
}

async fn run_server(config: InsightMapConfig) -> Result<()> {
    tracing::info!("Starting InsightMap");

    let store = NodeStore::from_config(&config.storage).await?;
    let builder = GraphBuilder::new(store.clone(), config.graph.edge_validation);
    tracing::info!(
        nodes_dir = %store.dir().display(),
        edge_validation = ?builder.validation(),
        "Node store ready"
    );

    let provider = Arc::new(OpenAiProvider::from_config(&config.generation)?);
    let pipeline = Arc::new(StreamPipeline::new(
        provider,
        builder.clone(),
        config.generation.clone(),
    ));

    let registry = Arc::new(SessionRegistry::new(config.sessions.ttl()));
    registry.spawn_sweeper(config.sessions.sweep_interval()).await;

    let app = build_app(
        GraphState { store, builder },
        GenerationState {
            pipeline,
            registry: registry.clone(),
        },
        &config.server.cors_origins,
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("InsightMap listening on http://{}. Press Ctrl+C to stop.", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down...");
    registry.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn print_graph(config: &InsightMapConfig) -> Result<()> {
    let store = NodeStore::from_config(&config.storage).await?;
    let graph = GraphBuilder::new(store, config.graph.edge_validation)
        .build_graph()
        .await?;
    println!("{}", serde_json::to_string_pretty(&graph)?);
    Ok(())
}
