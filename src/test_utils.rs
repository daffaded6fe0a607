//! Fakes and fixtures for exercising the engine without a real graph or
//! downstream system.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::config::{ConnectorConfig, LanguageMapping};
use crate::graph::{BinaryStore, FieldHistory, MemoryGraph, SpecificationText};
use crate::model::{
    CatalogModel, DataType, Entity, EntityKind, EntityRef, EntityType, Field, FieldRevision,
    FieldType, FieldValue, Link, LinkType,
};
use crate::transport::{DeleteEventKind, ImportEventKind, ImportResource, Transport};
use crate::types::EntityId;

/// A call received by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    ImportCatalog(PathBuf),
    NotifyPostImport(PathBuf),
    ResourceBatch(Vec<ImportResource>),
    ImportUpdateCompleted {
        catalog_name: String,
        kind: ImportEventKind,
        resources_included: bool,
    },
    DeleteCompleted {
        catalog_name: String,
        kind: DeleteEventKind,
    },
    DeleteCatalog(EntityId),
    DeleteCatalogNode {
        code: String,
        catalog_id: EntityId,
    },
    DeleteCatalogEntry(String),
    DeleteSku(String),
    DeleteRelation {
        source: String,
        target: String,
    },
    DeleteAssociation {
        source: String,
        target: String,
        association_type: String,
    },
}

/// Transport that records every successful call.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    batches_attempted: AtomicUsize,
    fail_on_batch: Option<usize>,
    fail_catalog_import: bool,
}

impl RecordingTransport {
    /// Fail the `n`th resource batch (1-based).
    pub fn fail_on_batch(mut self, n: usize) -> Self {
        self.fail_on_batch = Some(n);
        self
    }

    pub fn fail_catalog_import(mut self) -> Self {
        self.fail_catalog_import = true;
        self
    }

    fn record(&self, call: TransportCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::ResourceBatch(batch) => Some(batch.len()),
                _ => None,
            })
            .collect()
    }

    pub fn resource_records(&self) -> Vec<ImportResource> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::ResourceBatch(batch) => Some(batch),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn catalog_imports(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::ImportCatalog(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    /// Arguments of the last `import_update_completed` call.
    pub fn last_completion(&self) -> Option<(String, ImportEventKind, bool)> {
        self.calls().into_iter().rev().find_map(|c| match c {
            TransportCall::ImportUpdateCompleted {
                catalog_name,
                kind,
                resources_included,
            } => Some((catalog_name, kind, resources_included)),
            _ => None,
        })
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn import_catalog(&self, catalog_path: &Path) -> Result<()> {
        if self.fail_catalog_import {
            bail!("catalog import rejected with 500 Internal Server Error");
        }
        self.record(TransportCall::ImportCatalog(catalog_path.to_path_buf()));
        Ok(())
    }

    async fn notify_post_import(&self, document_path: &Path) -> Result<()> {
        self.record(TransportCall::NotifyPostImport(document_path.to_path_buf()));
        Ok(())
    }

    async fn post_resource_batch(&self, batch: &[ImportResource]) -> Result<()> {
        let attempt = self.batches_attempted.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_batch == Some(attempt) {
            bail!("resource batch {} rejected with 502 Bad Gateway", attempt);
        }
        self.record(TransportCall::ResourceBatch(batch.to_vec()));
        Ok(())
    }

    async fn import_update_completed(
        &self,
        catalog_name: &str,
        kind: ImportEventKind,
        resources_included: bool,
    ) -> Result<()> {
        self.record(TransportCall::ImportUpdateCompleted {
            catalog_name: catalog_name.to_string(),
            kind,
            resources_included,
        });
        Ok(())
    }

    async fn delete_completed(&self, catalog_name: &str, kind: DeleteEventKind) -> Result<()> {
        self.record(TransportCall::DeleteCompleted {
            catalog_name: catalog_name.to_string(),
            kind,
        });
        Ok(())
    }

    async fn delete_catalog(&self, catalog_id: EntityId) -> Result<()> {
        self.record(TransportCall::DeleteCatalog(catalog_id));
        Ok(())
    }

    async fn delete_catalog_node(&self, node_code: &str, catalog_id: EntityId) -> Result<()> {
        self.record(TransportCall::DeleteCatalogNode {
            code: node_code.to_string(),
            catalog_id,
        });
        Ok(())
    }

    async fn delete_catalog_entry(&self, entry_code: &str) -> Result<()> {
        self.record(TransportCall::DeleteCatalogEntry(entry_code.to_string()));
        Ok(())
    }

    async fn delete_sku(&self, sku_code: &str) -> Result<()> {
        self.record(TransportCall::DeleteSku(sku_code.to_string()));
        Ok(())
    }

    async fn delete_relation(&self, source_code: &str, target_code: &str) -> Result<()> {
        self.record(TransportCall::DeleteRelation {
            source: source_code.to_string(),
            target: target_code.to_string(),
        });
        Ok(())
    }

    async fn delete_association(
        &self,
        source_code: &str,
        target_code: &str,
        association_type: &str,
    ) -> Result<()> {
        self.record(TransportCall::DeleteAssociation {
            source: source_code.to_string(),
            target: target_code.to_string(),
            association_type: association_type.to_string(),
        });
        Ok(())
    }
}

/// Binary store backed by a map of `(file id, display configuration)`.
#[derive(Debug, Clone, Default)]
pub struct MemoryBinaryStore {
    files: HashMap<(i64, String), Vec<u8>>,
}

impl MemoryBinaryStore {
    pub fn with_file(mut self, file_id: i64, display_configuration: &str, bytes: &[u8]) -> Self {
        self.files
            .insert((file_id, display_configuration.to_string()), bytes.to_vec());
        self
    }
}

impl BinaryStore for MemoryBinaryStore {
    fn file(&self, file_id: i64, display_configuration: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .files
            .get(&(file_id, display_configuration.to_string()))
            .cloned())
    }
}

/// A small channel:
///
/// ```text
/// Channel 1
/// └── ChannelNode 10
///     └── Product 100
///         └── Item 1000 (SKUs A, B)
///             ├── Resource 5000 (file 77, main picture of the item)
///             └── Specification 7000
/// ```
#[derive(Debug, Clone)]
pub struct ChannelFixture {
    graph: MemoryGraph,
}

pub const SKUS_A_B: &str =
    r#"<SKUs><SKU id="A"><Name>Red</Name></SKU><SKU id="B"><Name>Blue</Name></SKU></SKUs>"#;

impl ChannelFixture {
    pub const CHANNEL: EntityId = 1;
    pub const NODE: EntityId = 10;
    pub const PRODUCT: EntityId = 100;
    pub const ITEM: EntityId = 1000;
    pub const RESOURCE: EntityId = 5000;
    pub const SPECIFICATION: EntityId = 7000;
    pub const FILE_ID: i64 = 77;

    pub fn sample() -> Self {
        let mut graph = MemoryGraph::new(Self::CHANNEL, Self::model());

        graph.upsert_entity(Self::entity_of(Self::CHANNEL, EntityKind::Channel, "Web"));
        graph.upsert_entity(Self::entity_of(Self::NODE, EntityKind::ChannelNode, "Shoes"));
        graph.upsert_entity(Self::entity_of(Self::PRODUCT, EntityKind::Product, "Runner"));

        let mut item = Self::entity_of(Self::ITEM, EntityKind::Item, "Runner item");
        item.fields.push(Field {
            revision: 2,
            ..Field::new("SKUs", FieldValue::Text(SKUS_A_B.to_string()))
        });
        item.main_picture_file_id = Some(Self::FILE_ID);
        graph.upsert_entity(item);

        let mut resource = Self::entity_of(Self::RESOURCE, EntityKind::Resource, "shoe");
        resource.fields = vec![
            Field::new("ResourceFileId", FieldValue::Integer(Self::FILE_ID)),
            Field::new("ResourceFilename", FieldValue::Text("shoe.jpg".into())),
            Field::new("ResourceMimeType", FieldValue::Text("image/jpeg".into())),
        ];
        graph.upsert_entity(resource);
        graph.upsert_entity(Self::entity_of(
            Self::SPECIFICATION,
            EntityKind::Specification,
            "Runner spec",
        ));

        let links = [
            (1, Self::CHANNEL, EntityKind::Channel, Self::NODE, EntityKind::ChannelNode),
            (2, Self::NODE, EntityKind::ChannelNode, Self::PRODUCT, EntityKind::Product),
            (3, Self::PRODUCT, EntityKind::Product, Self::ITEM, EntityKind::Item),
            (4, Self::ITEM, EntityKind::Item, Self::RESOURCE, EntityKind::Resource),
            (5, Self::ITEM, EntityKind::Item, Self::SPECIFICATION, EntityKind::Specification),
        ];
        for (id, source, source_kind, target, target_kind) in links {
            graph.add_link(Self::link(id, (source, source_kind), (target, target_kind), 0));
        }

        graph.specifications.push(SpecificationText {
            specification_id: Self::SPECIFICATION,
            entity_id: Self::ITEM,
            culture: "en-GB".into(),
            html: "<p>Breathable mesh</p>".into(),
        });

        Self { graph }
    }

    fn model() -> CatalogModel {
        let entity_type = |kind: EntityKind, fields: Vec<FieldType>| EntityType {
            id: kind.as_str().to_string(),
            kind,
            field_types: fields,
            field_sets: vec![],
            is_link_entity_type: false,
        };
        let link_type = |index: i32, source: EntityKind, target: EntityKind| LinkType {
            id: format!("{}{}", source, target),
            source_kind: source,
            target_kind: target,
            index,
        };

        CatalogModel {
            entity_types: vec![
                entity_type(EntityKind::Channel, vec![]),
                entity_type(EntityKind::ChannelNode, vec![]),
                entity_type(
                    EntityKind::Product,
                    vec![FieldType::new("ProductName", "Product", DataType::String)],
                ),
                entity_type(
                    EntityKind::Item,
                    vec![FieldType::new("SKUs", "Item", DataType::Xml)],
                ),
                entity_type(
                    EntityKind::Resource,
                    vec![
                        FieldType::new("ResourceFileId", "Resource", DataType::File),
                        FieldType::new("ResourceFilename", "Resource", DataType::String),
                        FieldType::new("ResourceMimeType", "Resource", DataType::String),
                    ],
                ),
                entity_type(EntityKind::Specification, vec![]),
            ],
            link_types: vec![
                link_type(0, EntityKind::Channel, EntityKind::ChannelNode),
                link_type(1, EntityKind::ChannelNode, EntityKind::Product),
                link_type(2, EntityKind::Product, EntityKind::Item),
                link_type(3, EntityKind::Item, EntityKind::Resource),
                link_type(4, EntityKind::Item, EntityKind::Specification),
                link_type(5, EntityKind::Product, EntityKind::Product),
            ],
            cvls: vec![],
            image_extensions: vec!["jpg".into(), "png".into()],
        }
    }

    /// Entity with a display name and a fixed creation time.
    pub fn entity_of(id: EntityId, kind: EntityKind, name: &str) -> Entity {
        let created = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default();
        Entity {
            id,
            kind,
            entity_type_id: kind.as_str().to_string(),
            field_set_id: None,
            fields: vec![],
            display_name: Some(Field::new(
                format!("{}Name", kind.as_str()),
                FieldValue::Text(name.to_string()),
            )),
            display_description: None,
            main_picture_file_id: None,
            created,
            last_modified: created,
            outbound_links: vec![],
            inbound_links: vec![],
        }
    }

    pub fn link(
        id: i64,
        source: (EntityId, EntityKind),
        target: (EntityId, EntityKind),
        sort_order: i32,
    ) -> Link {
        Link {
            id,
            link_type_id: format!("{}{}", source.1, target.1),
            source: EntityRef {
                id: source.0,
                kind: source.1,
            },
            target: EntityRef {
                id: target.0,
                kind: target.1,
            },
            sort_order,
            link_entity_id: None,
        }
    }

    /// Connector settings matching the fixture: items explode into SKUs,
    /// `en` reads from `en-GB`.
    pub fn config(&self) -> ConnectorConfig {
        ConnectorConfig {
            channel_id: Self::CHANNEL,
            items_to_skus: true,
            language_mapping: vec![LanguageMapping {
                catalog: "en".into(),
                pim: "en-GB".into(),
            }],
            ..ConnectorConfig::default()
        }
    }

    pub fn graph(&self) -> MemoryGraph {
        self.graph.clone()
    }

    pub fn graph_mut(&mut self) -> &mut MemoryGraph {
        &mut self.graph
    }

    pub fn channel(&self) -> Entity {
        self.entity(Self::CHANNEL)
    }

    /// Stored entity without links.
    pub fn entity(&self, id: EntityId) -> Entity {
        self.graph
            .entities
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .unwrap_or_else(|| panic!("fixture has no entity {}", id))
    }

    /// Store holding the original rendition of the fixture resource.
    pub fn binary_store(&self) -> MemoryBinaryStore {
        MemoryBinaryStore::default().with_file(Self::FILE_ID, "Original", b"jpeg bytes")
    }

    /// Replace the item's SKU document, keeping `previous` as the prior
    /// revision in the field history.
    pub fn with_sku_change(mut self, previous: &str, current: &str) -> Self {
        if let Some(item) = self.graph.entities.iter_mut().find(|e| e.id == Self::ITEM) {
            item.fields.retain(|f| f.field_type_id != "SKUs");
            item.fields.push(Field {
                revision: 3,
                ..Field::new("SKUs", FieldValue::Text(current.to_string()))
            });
        }
        self.graph.field_history.push(FieldHistory {
            entity_id: Self::ITEM,
            field_type_id: "SKUs".into(),
            revisions: vec![
                FieldRevision {
                    revision: 3,
                    value: Some(FieldValue::Text(current.to_string())),
                },
                FieldRevision {
                    revision: 2,
                    value: Some(FieldValue::Text(previous.to_string())),
                },
            ],
        });
        self
    }
}
