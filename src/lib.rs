pub mod codes;
pub mod config;
pub mod document;
pub mod events;
pub mod export_set;
pub mod graph;
pub mod model;
pub mod orchestrator;
pub mod resolver;
pub mod resources;
pub mod sku;
pub mod test_utils;
pub mod transport;
pub mod types;
pub mod xml;

pub use codes::CodeGenerator;
pub use config::ConnectorConfig;
pub use document::DocumentBuilder;
pub use events::{ConnectorEvent, ConnectorEventType, PipelineState};
pub use export_set::ExportSet;
pub use graph::{BinaryStore, GraphService, MemoryGraph};
pub use orchestrator::DeliveryOrchestrator;
pub use resolver::StructureResolver;
pub use resources::{ResourceExporter, ResourceManifest};
pub use sku::SkuDiffer;
pub use transport::Transport;
pub use types::{EntityId, Result, SyncError};
