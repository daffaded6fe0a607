use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use channel_sync::config::{init_logging, ConnectorConfig};
use channel_sync::graph::{DirectoryBinaryStore, GraphService, LoadLevel, MemoryGraph};
use channel_sync::transport::{LoggingTransport, Transport};
use channel_sync::{ConnectorEvent, DeliveryOrchestrator, EntityId};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Connector configuration (TOML)
    #[arg(short, long, default_value = "channel-sync.toml")]
    config: PathBuf,

    /// Channel graph snapshot (JSON)
    #[arg(short, long)]
    graph: PathBuf,

    /// Directory holding resource renditions as `<display configuration>/<file id>`
    #[arg(short, long, default_value = "files")]
    files: PathBuf,

    /// Log what would be sent instead of calling the catalog endpoints
    #[arg(long)]
    dry_run: bool,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export the whole channel
    Publish,
    /// An entity was added to the channel
    EntityAdded { entity_id: EntityId },
    /// Fields of an entity changed
    EntityUpdated {
        entity_id: EntityId,
        /// Comma-separated changed field type ids
        #[arg(long, default_value = "")]
        fields: String,
    },
    /// An entity was removed; the snapshot still holds its last state
    EntityDeleted { entity_id: EntityId },
    /// A link was added between two channel entities
    LinkAdded { source: EntityId, target: EntityId },
    /// A link between two channel entities changed
    LinkUpdated { source: EntityId, target: EntityId },
    /// A link was removed
    LinkDeleted {
        source: EntityId,
        target: EntityId,
        #[arg(long)]
        link_type: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConnectorConfig::from_file(&cli.config)?;
    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level))?;

    let graph = Arc::new(MemoryGraph::from_json_file(&cli.graph)?);
    let store = Arc::new(DirectoryBinaryStore::new(&cli.files));
    let transport: Arc<dyn Transport> = if cli.dry_run {
        Arc::new(LoggingTransport)
    } else {
        http_transport(&config)?
    };

    let orchestrator =
        DeliveryOrchestrator::new(config, graph.clone(), store, transport)?;

    let event = match cli.command {
        Commands::Publish => orchestrator.publish().await,
        Commands::EntityAdded { entity_id } => orchestrator.entity_added(entity_id).await,
        Commands::EntityUpdated { entity_id, fields } => {
            orchestrator.entity_updated(entity_id, &fields).await
        }
        Commands::EntityDeleted { entity_id } => {
            let deleted = graph
                .entity(entity_id, LoadLevel::DataAndLinks)?
                .ok_or_else(|| anyhow!("Entity {} not found in snapshot", entity_id))?;
            orchestrator.entity_deleted(&deleted).await
        }
        Commands::LinkAdded { source, target } => orchestrator.link_added(source, target).await,
        Commands::LinkUpdated { source, target } => {
            orchestrator.link_updated(source, target).await
        }
        Commands::LinkDeleted {
            source,
            target,
            link_type,
        } => orchestrator.link_deleted(source, target, &link_type).await,
    };

    report(&event)
}

#[cfg(feature = "http")]
fn http_transport(config: &ConnectorConfig) -> Result<Arc<dyn Transport>> {
    use anyhow::Context;

    let transport = channel_sync::transport::HttpTransport::new(config.transport.clone())
        .context("Failed to create HTTP transport")?;
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "http"))]
fn http_transport(_config: &ConnectorConfig) -> Result<Arc<dyn Transport>> {
    Err(anyhow!("Built without the `http` feature; use --dry-run"))
}

fn report(event: &ConnectorEvent) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(event)?);
    match &event.failure {
        Some(failure) => Err(anyhow!("{:?} failed: {}", event.event_type, failure.message)),
        None => Ok(()),
    }
}
