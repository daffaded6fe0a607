//! Resource export: staging binaries, building the manifest and delivering
//! import records.

pub mod exporter;
pub mod importer;
pub mod manifest;
pub mod staging;

pub use exporter::ResourceExporter;
pub use importer::{import_records, send_batches};
pub use manifest::{ParentEntry, ResourceAction, ResourceEntry, ResourceManifest};
pub use staging::StagingArea;
