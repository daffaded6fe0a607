//! Operation sequencing: resolve, render, stage, send, notify.
//!
//! Every public operation returns a [`ConnectorEvent`]. Failures never
//! escape as `Err`; they end the event in [`PipelineState::Failed`] and
//! nothing after the failing step is sent.

use anyhow::Context;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::codes::CodeGenerator;
use crate::config::ConnectorConfig;
use crate::document::{fetch_specifications, serialize, CatalogMapper, DocumentBuilder};
use crate::events::{ConnectorEvent, ConnectorEventType, PipelineState};
use crate::export_set::ExportSet;
use crate::graph::{BinaryStore, GraphService, LoadLevel};
use crate::model::{classify_link, CatalogModel, Entity, EntityKind, LinkRole};
use crate::resolver::StructureResolver;
use crate::resources::{
    import_records, send_batches, ResourceAction, ResourceEntry, ResourceExporter,
    ResourceManifest, StagingArea,
};
use crate::sku::SkuDiffer;
use crate::transport::{DeleteEventKind, ImportEventKind, Transport};
use crate::types::{EntityId, Result, SyncError};

/// State shared by the steps of one operation.
struct Operation {
    model: CatalogModel,
    channel: Entity,
    channel_name: String,
    staging: StagingArea,
}

/// Outcome of a rendered and delivered export set.
struct Delivery {
    resources: usize,
}

/// Drives change events through the pipeline against injected
/// collaborators.
pub struct DeliveryOrchestrator {
    config: ConnectorConfig,
    codes: CodeGenerator,
    graph: Arc<dyn GraphService>,
    store: Arc<dyn BinaryStore>,
    transport: Arc<dyn Transport>,
}

impl DeliveryOrchestrator {
    pub fn new(
        config: ConnectorConfig,
        graph: Arc<dyn GraphService>,
        store: Arc<dyn BinaryStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            codes: CodeGenerator::from_config(&config),
            config,
            graph,
            store,
            transport,
        })
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    fn resolver(&self) -> StructureResolver<'_> {
        StructureResolver::new(self.graph.as_ref(), self.config.channel_id)
    }

    fn load(&self, entity_id: EntityId, level: LoadLevel) -> Result<Entity> {
        self.graph
            .entity(entity_id, level)
            .with_context(|| format!("Failed to load entity {}", entity_id))?
            .ok_or(SyncError::NotFound(entity_id))
    }

    fn begin(&self) -> Result<Operation> {
        let model = self.graph.model().context("Failed to fetch source model")?;
        let channel = self.load(self.config.channel_id, LoadLevel::DataOnly)?;
        let channel_name = CatalogMapper::new(&self.config, &model, &self.codes).entity_name(&channel);

        Ok(Operation {
            model,
            channel,
            channel_name,
            staging: StagingArea::new(&self.config.resources_root, Utc::now()),
        })
    }

    fn catalog_path(&self, op: &Operation) -> PathBuf {
        let name = self
            .config
            .catalog_file_name
            .as_deref()
            .unwrap_or(&op.channel_name);
        op.staging.catalog_path(name)
    }

    async fn send_catalog(&self, catalog_path: &Path) -> Result<()> {
        self.transport
            .import_catalog(catalog_path)
            .await
            .map_err(|e| SyncError::transport("importing catalog", e))?;
        self.transport
            .notify_post_import(catalog_path)
            .await
            .map_err(|e| SyncError::transport("notifying catalog import", e))
    }

    async fn send_resources(&self, staging: &StagingArea, manifest: &ResourceManifest) -> Result<usize> {
        if manifest.is_empty() {
            debug!("No resources to import, no action taken");
            return Ok(0);
        }
        let records = import_records(manifest, &staging.dir());
        let batches = send_batches(self.transport.as_ref(), &records).await?;
        self.transport
            .notify_post_import(&staging.manifest_path())
            .await
            .map_err(|e| SyncError::transport("notifying resource import", e))?;
        Ok(batches)
    }

    async fn import_completed(&self, op: &Operation, kind: ImportEventKind, resources_included: bool) -> Result<()> {
        self.transport
            .import_update_completed(&op.channel_name, kind, resources_included)
            .await
            .map_err(|e| SyncError::transport("reporting import completion", e))
    }

    async fn delete_completed(&self, op: &Operation, kind: DeleteEventKind) -> Result<()> {
        self.transport
            .delete_completed(&op.channel_name, kind)
            .await
            .map_err(|e| SyncError::transport("reporting delete completion", e))
    }

    /// Render the export set, stage the catalog and its resources, then
    /// send the catalog before the resources.
    async fn deliver(
        &self,
        event: &mut ConnectorEvent,
        op: &Operation,
        export: &ExportSet,
        full: bool,
    ) -> Result<Delivery> {
        let builder = DocumentBuilder::new(&self.config, &op.model, &self.codes);
        let specifications =
            fetch_specifications(self.graph.as_ref(), builder.mapper(), &self.config, export.entities())?;
        let records = builder.build(&op.channel, export, full, &specifications);
        let stats = records.stats();
        info!(
            "Catalog for '{}': {} nodes, {} entries, {} relations, {} associations",
            op.channel_name, stats.nodes, stats.entries, stats.relations, stats.associations
        );

        let catalog_path = self.catalog_path(op);
        op.staging
            .save_document(&serialize::catalog(&records), &catalog_path)?;
        event.update(
            PipelineState::DocumentsBuilt,
            26,
            "Done generating catalog.xml. Generating Resource.xml and saving files to disk...",
        );

        let exporter =
            ResourceExporter::new(&self.config, &op.model, &self.codes, self.store.as_ref());
        let manifest = exporter.export(export, &op.staging, ResourceAction::Added, full);
        op.staging
            .save_document(&manifest.to_element(), &op.staging.manifest_path())?;
        event.update(
            PipelineState::FilesStaged,
            50,
            "Done generating/saving Resource.xml, sending Catalog.xml...",
        );

        self.send_catalog(&catalog_path).await?;
        event.update(PipelineState::CatalogSent, 75, "Done sending Catalog.xml");

        event.progress(76, "Sending Resources...");
        self.send_resources(&op.staging, &manifest).await?;
        event.update(PipelineState::ResourcesSent, 99, "Done sending resources");

        Ok(Delivery {
            resources: manifest.len(),
        })
    }

    /// Export the whole channel, schema included.
    pub async fn publish(&self) -> ConnectorEvent {
        let mut event = ConnectorEvent::initiate(
            ConnectorEventType::Publish,
            self.config.channel_id,
            format!("Publish started for channel {}", self.config.channel_id),
        );
        if let Err(err) = self.run_publish(&mut event).await {
            event.fail(&err);
        }
        event
    }

    async fn run_publish(&self, event: &mut ConnectorEvent) -> Result<()> {
        let op = self.begin()?;
        event.progress(1, "Fetching all channel entities...");

        let resolver = self.resolver();
        let mut export = resolver.full(&self.config.export_enabled_entity_types)?;
        let resources: Vec<_> = resolver
            .kind(EntityKind::Resource)?
            .positions()
            .cloned()
            .collect();
        export.extend_positions(resources);
        export.hydrate(self.graph.as_ref(), self.config.channel_id)?;

        event.update(
            PipelineState::EntitiesFetched,
            10,
            "Fetched all channel entities. Generating catalog.xml...",
        );
        self.deliver(event, &op, &export, true).await?;

        self.import_completed(&op, ImportEventKind::Publish, true).await?;
        event.complete(format!("Publish done for channel {}", op.channel_name));
        Ok(())
    }

    /// Incremental delivery of a resolved export set.
    async fn publish_entities(
        &self,
        event: &mut ConnectorEvent,
        op: &Operation,
        mut export: ExportSet,
    ) -> Result<Delivery> {
        export.hydrate(self.graph.as_ref(), self.config.channel_id)?;
        event.update(PipelineState::EntitiesFetched, 10, "Fetched entities");
        event.progress(11, "Generating catalog.xml...");
        self.deliver(event, op, &export, false).await
    }

    pub async fn entity_added(&self, entity_id: EntityId) -> ConnectorEvent {
        let mut event = ConnectorEvent::initiate(
            ConnectorEventType::ChannelEntityAdded,
            self.config.channel_id,
            format!(
                "Received entity added for entity {} in channel {}",
                entity_id, self.config.channel_id
            ),
        );
        if let Err(err) = self.run_entity_added(&mut event, entity_id).await {
            event.fail(&err);
        }
        event
    }

    async fn run_entity_added(&self, event: &mut ConnectorEvent, entity_id: EntityId) -> Result<()> {
        let op = self.begin()?;
        event.progress(1, "Fetching entities...");
        let export = self.resolver().entity_added(entity_id)?;
        if export.is_empty() {
            event.complete(format!("Entity {} is not part of channel {}", entity_id, op.channel_name));
            return Ok(());
        }

        let delivery = self.publish_entities(event, &op, export).await?;
        self.import_completed(&op, ImportEventKind::EntityAdded, delivery.resources > 0)
            .await?;
        event.complete(format!(
            "ChannelEntityAdded complete for entity {} in channel {}",
            entity_id, op.channel_name
        ));
        Ok(())
    }

    /// `changed_fields` is the comma-separated list of changed field type ids.
    pub async fn entity_updated(&self, entity_id: EntityId, changed_fields: &str) -> ConnectorEvent {
        let mut event = ConnectorEvent::initiate(
            ConnectorEventType::ChannelEntityUpdated,
            self.config.channel_id,
            format!(
                "Received entity update for entity {} in channel {}",
                entity_id, self.config.channel_id
            ),
        );
        if let Err(err) = self
            .run_entity_updated(&mut event, entity_id, changed_fields)
            .await
        {
            event.fail(&err);
        }
        event
    }

    async fn run_entity_updated(
        &self,
        event: &mut ConnectorEvent,
        entity_id: EntityId,
        changed_fields: &str,
    ) -> Result<()> {
        let op = self.begin()?;
        let entity = self.load(entity_id, LoadLevel::DataAndLinks)?;

        let is_link_entity = op
            .model
            .entity_type(&entity.entity_type_id)
            .map(|et| et.is_link_entity_type)
            .unwrap_or(false);
        if is_link_entity {
            event.complete(format!("Link entity {} updated; nothing to export", entity_id));
            return Ok(());
        }

        let positions = self.resolver().entity_positions(entity_id)?;
        if positions.is_empty() {
            event.complete(format!(
                "Entity {} is not part of channel {}; nothing to export",
                entity_id, op.channel_name
            ));
            return Ok(());
        }

        let resources_included = match entity.kind {
            EntityKind::Resource => {
                self.update_resource(event, &op, positions).await?;
                true
            }
            EntityKind::ChannelNode => {
                let delivery = self.publish_entities(event, &op, positions).await?;
                delivery.resources > 0
            }
            EntityKind::Product | EntityKind::Item | EntityKind::Bundle | EntityKind::Package => {
                if self.apply_sku_changes(&entity, changed_fields).await? {
                    let export = self.resolver().entity_added(entity.id)?;
                    self.publish_entities(event, &op, export).await?;
                    true
                } else {
                    self.send_update_document(event, &op, &entity).await?;
                    false
                }
            }
            EntityKind::Channel | EntityKind::Specification => {
                event.complete(format!(
                    "{} {} updated; nothing to export",
                    entity.kind, entity_id
                ));
                return Ok(());
            }
        };

        self.import_completed(&op, ImportEventKind::EntityUpdated, resources_included)
            .await?;
        event.complete(format!(
            "Update done for entity {} in channel {}",
            entity_id, op.channel_name
        ));
        Ok(())
    }

    async fn update_resource(
        &self,
        event: &mut ConnectorEvent,
        op: &Operation,
        mut positions: ExportSet,
    ) -> Result<()> {
        positions.hydrate(self.graph.as_ref(), self.config.channel_id)?;
        event.update(PipelineState::EntitiesFetched, 10, "Fetched resource");

        let exporter =
            ResourceExporter::new(&self.config, &op.model, &self.codes, self.store.as_ref());
        let manifest = exporter.export(&positions, &op.staging, ResourceAction::Updated, false);
        op.staging
            .save_document(&manifest.to_element(), &op.staging.manifest_path())?;
        event.update(PipelineState::FilesStaged, 50, "Done saving Resource.xml, sending resources...");

        self.send_resources(&op.staging, &manifest).await?;
        event.update(PipelineState::ResourcesSent, 99, "Done sending resources");
        Ok(())
    }

    /// Diff the item's SKU field against its previous revision and delete
    /// removed SKUs. Returns whether SKUs were added, in which case the item
    /// has to be exported again.
    async fn apply_sku_changes(&self, entity: &Entity, changed_fields: &str) -> Result<bool> {
        let sku_field = self.config.sku_field.as_str();
        let sku_changed = changed_fields
            .split(',')
            .any(|f| f.trim().eq_ignore_ascii_case(sku_field));
        if !self.config.items_to_skus || entity.kind != EntityKind::Item || !sku_changed {
            return Ok(false);
        }

        let current = entity.field(sku_field);
        let revision = current.map(|f| f.revision).unwrap_or(0);
        let history = self
            .graph
            .field_history(entity.id, sku_field)
            .with_context(|| format!("Failed to fetch {} history of entity {}", sku_field, entity.id))?;
        let previous = history
            .iter()
            .find(|r| r.revision + 1 == revision)
            .and_then(|r| r.value.as_ref())
            .map(|v| v.flat());
        let current = current.and_then(|f| f.value.as_ref()).map(|v| v.flat());

        let diff = SkuDiffer::new(self.config.sku_data_element.clone())
            .diff(previous.as_deref(), current.as_deref());
        info!(
            "SKUs of item {}: {} added, {} removed",
            entity.id,
            diff.added.len(),
            diff.removed.len()
        );

        for sku in &diff.removed {
            let code = self.codes.sku_code(sku);
            self.transport
                .delete_sku(&code)
                .await
                .map_err(|e| SyncError::transport(format!("deleting sku {}", code), e))?;
        }

        Ok(!diff.added.is_empty())
    }

    /// Entries of one entity, no relations.
    async fn send_update_document(&self, event: &mut ConnectorEvent, op: &Operation, entity: &Entity) -> Result<()> {
        let builder = DocumentBuilder::new(&self.config, &op.model, &self.codes);
        let specifications = fetch_specifications(
            self.graph.as_ref(),
            builder.mapper(),
            &self.config,
            std::iter::once(entity),
        )?;
        let records = builder.build_update(&op.channel, entity, &specifications);

        let catalog_path = self.catalog_path(op);
        op.staging
            .save_document(&serialize::catalog(&records), &catalog_path)?;
        event.update(PipelineState::DocumentsBuilt, 26, "Done generating update document");

        self.send_catalog(&catalog_path).await?;
        event.update(PipelineState::CatalogSent, 75, "Done sending update document");
        Ok(())
    }

    /// `deleted` is the last snapshot of the removed entity.
    pub async fn entity_deleted(&self, deleted: &Entity) -> ConnectorEvent {
        let mut event = ConnectorEvent::initiate(
            ConnectorEventType::ChannelEntityDeleted,
            self.config.channel_id,
            format!(
                "Received entity deleted for entity {} in channel {}",
                deleted.id, self.config.channel_id
            ),
        );
        if let Err(err) = self.run_entity_deleted(&mut event, deleted).await {
            event.fail(&err);
        }
        event
    }

    async fn run_entity_deleted(&self, event: &mut ConnectorEvent, deleted: &Entity) -> Result<()> {
        let op = self.begin()?;
        let code = self.codes.entity_code(deleted.id);
        let transport = self.transport.as_ref();

        match deleted.kind {
            EntityKind::Channel => transport
                .delete_catalog(deleted.id)
                .await
                .map_err(|e| SyncError::transport("deleting catalog", e))?,
            EntityKind::ChannelNode => transport
                .delete_catalog_node(&code, self.config.channel_id)
                .await
                .map_err(|e| SyncError::transport(format!("deleting node {}", code), e))?,
            EntityKind::Resource => {
                let manifest = ResourceManifest {
                    schema: None,
                    resources: vec![ResourceEntry::deleted(code)],
                };
                op.staging
                    .save_document(&manifest.to_element(), &op.staging.manifest_path())?;
                event.update(PipelineState::FilesStaged, 50, "Done saving Resource.xml");
                self.send_resources(&op.staging, &manifest).await?;
            }
            EntityKind::Product | EntityKind::Item | EntityKind::Bundle | EntityKind::Package => {
                let mapper = CatalogMapper::new(&self.config, &op.model, &self.codes);
                let skus = mapper.exploded_skus(deleted);
                for sku in &skus {
                    let sku_code = self.codes.sku_code(&sku.id);
                    transport
                        .delete_sku(&sku_code)
                        .await
                        .map_err(|e| SyncError::transport(format!("deleting sku {}", sku_code), e))?;
                }
                if skus.is_empty() || self.config.use_three_levels_in_commerce {
                    transport
                        .delete_catalog_entry(&code)
                        .await
                        .map_err(|e| SyncError::transport(format!("deleting entry {}", code), e))?;
                }
            }
            EntityKind::Specification => {
                debug!("Specification {} deleted; nothing to remove downstream", deleted.id)
            }
        }

        self.delete_completed(&op, DeleteEventKind::EntityDeleted).await?;
        event.complete(format!(
            "Delete done for entity {} in channel {}",
            deleted.id, op.channel_name
        ));
        Ok(())
    }

    pub async fn link_added(&self, source_id: EntityId, target_id: EntityId) -> ConnectorEvent {
        let mut event = ConnectorEvent::initiate(
            ConnectorEventType::ChannelLinkAdded,
            self.config.channel_id,
            format!(
                "Received link added for source {} and target {} in channel {}",
                source_id, target_id, self.config.channel_id
            ),
        );
        if let Err(err) = self.run_link_added(&mut event, source_id, target_id).await {
            event.fail(&err);
        }
        event
    }

    async fn run_link_added(
        &self,
        event: &mut ConnectorEvent,
        source_id: EntityId,
        target_id: EntityId,
    ) -> Result<()> {
        let op = self.begin()?;
        event.progress(1, "Fetching entities...");
        let export = self.resolver().link_added(source_id, target_id)?;
        if export.is_empty() {
            event.complete(format!(
                "Link {} -> {} is not part of channel {}",
                source_id, target_id, op.channel_name
            ));
            return Ok(());
        }

        let delivery = self.publish_entities(event, &op, export).await?;
        self.import_completed(&op, ImportEventKind::LinkAdded, delivery.resources > 0)
            .await?;
        event.complete(format!(
            "ChannelLinkAdded complete for {} -> {} in channel {}",
            source_id, target_id, op.channel_name
        ));
        Ok(())
    }

    pub async fn link_updated(&self, source_id: EntityId, target_id: EntityId) -> ConnectorEvent {
        let mut event = ConnectorEvent::initiate(
            ConnectorEventType::ChannelLinkUpdated,
            self.config.channel_id,
            format!(
                "Received link updated for source {} and target {} in channel {}",
                source_id, target_id, self.config.channel_id
            ),
        );
        if let Err(err) = self.run_link_updated(&mut event, source_id, target_id).await {
            event.fail(&err);
        }
        event
    }

    async fn run_link_updated(
        &self,
        event: &mut ConnectorEvent,
        source_id: EntityId,
        target_id: EntityId,
    ) -> Result<()> {
        let op = self.begin()?;
        event.progress(1, "Fetching entities...");
        let export = self.resolver().link_updated(source_id, target_id)?;

        let delivery = self.publish_entities(event, &op, export).await?;
        self.import_completed(&op, ImportEventKind::LinkUpdated, delivery.resources > 0)
            .await?;
        event.complete(format!(
            "ChannelLinkUpdated complete for {} -> {} in channel {}",
            source_id, target_id, op.channel_name
        ));
        Ok(())
    }

    pub async fn link_deleted(
        &self,
        source_id: EntityId,
        target_id: EntityId,
        link_type_id: &str,
    ) -> ConnectorEvent {
        let mut event = ConnectorEvent::initiate(
            ConnectorEventType::ChannelLinkDeleted,
            self.config.channel_id,
            format!(
                "Received link deleted for source {} and target {} in channel {}",
                source_id, target_id, self.config.channel_id
            ),
        );
        if let Err(err) = self
            .run_link_deleted(&mut event, source_id, target_id, link_type_id)
            .await
        {
            event.fail(&err);
        }
        event
    }

    async fn run_link_deleted(
        &self,
        event: &mut ConnectorEvent,
        source_id: EntityId,
        target_id: EntityId,
        link_type_id: &str,
    ) -> Result<()> {
        let op = self.begin()?;
        let source = self.load(source_id, LoadLevel::DataOnly)?;
        let target = self.load(target_id, LoadLevel::DataOnly)?;
        let role = op
            .model
            .link_type(link_type_id)
            .map(|lt| lt.role())
            .unwrap_or_else(|| classify_link(source.kind, target.kind));

        let mapper = CatalogMapper::new(&self.config, &op.model, &self.codes);
        let transport = self.transport.as_ref();

        match role {
            LinkRole::Media => {
                let exporter =
                    ResourceExporter::new(&self.config, &op.model, &self.codes, self.store.as_ref());
                let manifest = ResourceManifest {
                    schema: None,
                    resources: vec![exporter.unlinked_entry(target.id, &source)],
                };
                op.staging
                    .save_document(&manifest.to_element(), &op.staging.manifest_path())?;
                event.update(PipelineState::FilesStaged, 50, "Done saving Resource.xml");
                self.send_resources(&op.staging, &manifest).await?;
            }
            LinkRole::Association => {
                for source_code in mapper.relation_codes(&source) {
                    for target_code in mapper.relation_codes(&target) {
                        transport
                            .delete_association(&source_code, &target_code, link_type_id)
                            .await
                            .map_err(|e| SyncError::transport("deleting association", e))?;
                    }
                }
            }
            LinkRole::Structure | LinkRole::EntryRelation => {
                for source_code in mapper.relation_codes(&source) {
                    for target_code in mapper.relation_codes(&target) {
                        transport
                            .delete_relation(&source_code, &target_code)
                            .await
                            .map_err(|e| SyncError::transport("deleting relation", e))?;
                    }
                }
            }
            LinkRole::Specification | LinkRole::Other => {
                debug!("Link type {} has no downstream counterpart", link_type_id)
            }
        }

        self.delete_completed(&op, DeleteEventKind::LinkDeleted).await?;
        event.complete(format!(
            "Link {} -> {} removed in channel {}",
            source_id, target_id, op.channel_name
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ChannelFixture, RecordingTransport, TransportCall, SKUS_A_B};
    use crate::types::FailureKind;
    use tempfile::{tempdir, TempDir};

    struct Harness {
        orchestrator: DeliveryOrchestrator,
        transport: Arc<RecordingTransport>,
        _staging: TempDir,
    }

    fn harness(fixture: ChannelFixture, transport: RecordingTransport) -> Harness {
        let staging = tempdir().expect("tempdir");
        let config = ConnectorConfig {
            resources_root: staging.path().to_path_buf(),
            ..fixture.config()
        };
        let transport = Arc::new(transport);
        let orchestrator = DeliveryOrchestrator::new(
            config,
            Arc::new(fixture.graph()),
            Arc::new(fixture.binary_store()),
            transport.clone(),
        )
        .expect("orchestrator");

        Harness {
            orchestrator,
            transport,
            _staging: staging,
        }
    }

    #[tokio::test]
    async fn publish_sends_catalog_before_resources_and_reports_completion() {
        let h = harness(ChannelFixture::sample(), RecordingTransport::default());
        let event = h.orchestrator.publish().await;

        assert!(event.is_success(), "{:?}", event.failure);
        assert_eq!(event.percentages(), vec![0, 1, 10, 26, 50, 75, 76, 99, 100]);

        let calls = h.transport.calls();
        let catalog = calls
            .iter()
            .position(|c| matches!(c, TransportCall::ImportCatalog(_)))
            .unwrap();
        let batch = calls
            .iter()
            .position(|c| matches!(c, TransportCall::ResourceBatch(_)))
            .unwrap();
        assert!(catalog < batch);
        assert_eq!(
            h.transport.last_completion(),
            Some(("Web".to_string(), ImportEventKind::Publish, true))
        );

        let catalog_path = &h.transport.catalog_imports()[0];
        let xml = std::fs::read_to_string(catalog_path).unwrap();
        assert!(xml.contains("<MetaDataScheme>"));
        assert!(xml.contains("<Code>SKU-A</Code>"));
        assert!(!xml.contains("<Code>1000</Code>"));
        assert!(catalog_path.ends_with("Web.xml"));
    }

    #[tokio::test]
    async fn publish_attributes_resource_to_each_sku() {
        let h = harness(ChannelFixture::sample(), RecordingTransport::default());
        let event = h.orchestrator.publish().await;
        assert!(event.is_success());

        let records = h.transport.resource_records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.resource_id, "5000");
        assert_eq!(record.codes, vec!["SKU-A", "SKU-B"]);
        assert_eq!(
            record.entry_codes.iter().filter(|c| c.is_main_picture).count(),
            1
        );
        let path = PathBuf::from(record.path.as_deref().unwrap());
        assert!(path.ends_with("Original/shoe.jpg"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn failed_catalog_import_stops_before_resources() {
        let h = harness(
            ChannelFixture::sample(),
            RecordingTransport::default().fail_catalog_import(),
        );
        let event = h.orchestrator.publish().await;

        assert_eq!(event.state, PipelineState::Failed);
        let failure = event.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Transport);
        assert!(failure.message.contains("500"));
        assert!(h.transport.batch_sizes().is_empty());
        assert!(h.transport.last_completion().is_none());
    }

    #[tokio::test]
    async fn failed_resource_batch_is_terminal() {
        let h = harness(
            ChannelFixture::sample(),
            RecordingTransport::default().fail_on_batch(1),
        );
        let event = h.orchestrator.publish().await;

        assert_eq!(event.state, PipelineState::Failed);
        assert_eq!(event.percentage, 76);
        assert_eq!(h.transport.catalog_imports().len(), 1);
        assert!(h.transport.last_completion().is_none());
    }

    #[tokio::test]
    async fn sku_addition_triggers_reexport_with_resources() {
        let previous = r#"<SKUs><SKU id="A"/></SKUs>"#;
        let current = r#"<SKUs><SKU id="A"/><SKU id="B"/></SKUs>"#;
        let fixture = ChannelFixture::sample().with_sku_change(previous, current);
        let h = harness(fixture, RecordingTransport::default());

        let event = h
            .orchestrator
            .entity_updated(ChannelFixture::ITEM, "ItemName,SKUs")
            .await;

        assert!(event.is_success(), "{:?}", event.failure);
        let calls = h.transport.calls();
        assert!(!calls.iter().any(|c| matches!(c, TransportCall::DeleteSku(_))));
        // the re-export carries the updated entries, no separate update document
        assert_eq!(h.transport.catalog_imports().len(), 1);
        assert_eq!(
            h.transport.last_completion(),
            Some(("Web".to_string(), ImportEventKind::EntityUpdated, true))
        );
        assert!(event
            .history
            .windows(2)
            .all(|w| w[0].state <= w[1].state));
    }

    #[tokio::test]
    async fn sku_removal_deletes_without_reexport() {
        let fixture = ChannelFixture::sample()
            .with_sku_change(SKUS_A_B, r#"<SKUs><SKU id="A"/></SKUs>"#);
        let h = harness(fixture, RecordingTransport::default());

        let event = h
            .orchestrator
            .entity_updated(ChannelFixture::ITEM, "SKUs")
            .await;

        assert!(event.is_success(), "{:?}", event.failure);
        let calls = h.transport.calls();
        assert!(calls.contains(&TransportCall::DeleteSku("SKU-B".into())));
        assert_eq!(h.transport.catalog_imports().len(), 1);
        assert_eq!(
            h.transport.last_completion(),
            Some(("Web".to_string(), ImportEventKind::EntityUpdated, false))
        );
    }

    #[tokio::test]
    async fn updated_resource_sends_only_a_manifest() {
        let h = harness(ChannelFixture::sample(), RecordingTransport::default());
        let event = h
            .orchestrator
            .entity_updated(ChannelFixture::RESOURCE, "ResourceFilename")
            .await;

        assert!(event.is_success(), "{:?}", event.failure);
        assert!(h.transport.catalog_imports().is_empty());
        let records = h.transport.resource_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, "updated");
    }

    #[tokio::test]
    async fn entity_outside_channel_completes_without_sending() {
        let h = harness(ChannelFixture::sample(), RecordingTransport::default());
        let event = h.orchestrator.entity_added(9999).await;

        assert!(event.is_success(), "{:?}", event.failure);
        assert!(h.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn link_update_without_parent_structure_fails() {
        let h = harness(ChannelFixture::sample(), RecordingTransport::default());
        let event = h
            .orchestrator
            .link_updated(ChannelFixture::NODE, ChannelFixture::ITEM)
            .await;

        assert_eq!(event.state, PipelineState::Failed);
        assert_eq!(event.failure.unwrap().kind, FailureKind::Inconsistency);
        assert!(h.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn link_added_reexports_target_subtree() {
        let h = harness(ChannelFixture::sample(), RecordingTransport::default());
        let event = h
            .orchestrator
            .link_added(ChannelFixture::PRODUCT, ChannelFixture::ITEM)
            .await;

        assert!(event.is_success(), "{:?}", event.failure);
        let xml = std::fs::read_to_string(&h.transport.catalog_imports()[0]).unwrap();
        assert!(!xml.contains("<MetaDataScheme>"));
        assert!(xml.contains("<ChildEntryCode>SKU-B</ChildEntryCode>"));
        assert_eq!(
            h.transport.last_completion(),
            Some(("Web".to_string(), ImportEventKind::LinkAdded, true))
        );
    }

    #[tokio::test]
    async fn resource_link_deletion_sends_unlink_manifest() {
        let h = harness(ChannelFixture::sample(), RecordingTransport::default());
        let event = h
            .orchestrator
            .link_deleted(ChannelFixture::ITEM, ChannelFixture::RESOURCE, "ItemResource")
            .await;

        assert!(event.is_success(), "{:?}", event.failure);
        let records = h.transport.resource_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, "unlinked");
        assert_eq!(records[0].codes, vec!["SKU-A", "SKU-B"]);
        assert!(!h
            .transport
            .calls()
            .iter()
            .any(|c| matches!(c, TransportCall::DeleteRelation { .. })));
        assert!(h.transport.calls().contains(&TransportCall::DeleteCompleted {
            catalog_name: "Web".into(),
            kind: DeleteEventKind::LinkDeleted,
        }));
    }

    #[tokio::test]
    async fn entry_link_deletion_removes_relations_per_sku() {
        let h = harness(ChannelFixture::sample(), RecordingTransport::default());
        let event = h
            .orchestrator
            .link_deleted(ChannelFixture::PRODUCT, ChannelFixture::ITEM, "ProductItem")
            .await;

        assert!(event.is_success(), "{:?}", event.failure);
        let calls = h.transport.calls();
        for sku in ["SKU-A", "SKU-B"] {
            assert!(calls.contains(&TransportCall::DeleteRelation {
                source: "100".into(),
                target: sku.into(),
            }));
        }
    }

    #[tokio::test]
    async fn deleted_item_removes_its_skus() {
        let fixture = ChannelFixture::sample();
        let item = fixture.entity(ChannelFixture::ITEM);
        let h = harness(fixture, RecordingTransport::default());

        let event = h.orchestrator.entity_deleted(&item).await;

        assert!(event.is_success(), "{:?}", event.failure);
        let calls = h.transport.calls();
        assert!(calls.contains(&TransportCall::DeleteSku("SKU-A".into())));
        assert!(calls.contains(&TransportCall::DeleteSku("SKU-B".into())));
        assert!(!calls.contains(&TransportCall::DeleteCatalogEntry("1000".into())));
        assert!(calls.contains(&TransportCall::DeleteCompleted {
            catalog_name: "Web".into(),
            kind: DeleteEventKind::EntityDeleted,
        }));
    }

    #[tokio::test]
    async fn deleted_resource_sends_deleted_manifest() {
        let fixture = ChannelFixture::sample();
        let resource = fixture.entity(ChannelFixture::RESOURCE);
        let h = harness(fixture, RecordingTransport::default());

        let event = h.orchestrator.entity_deleted(&resource).await;

        assert!(event.is_success(), "{:?}", event.failure);
        let records = h.transport.resource_records();
        assert_eq!(records[0].action, "deleted");
        assert!(records[0].path.is_none());
    }

    #[tokio::test]
    async fn added_item_exports_its_parent_and_subtree() {
        let h = harness(ChannelFixture::sample(), RecordingTransport::default());
        let event = h.orchestrator.entity_added(ChannelFixture::ITEM).await;

        assert!(event.is_success(), "{:?}", event.failure);
        let xml = std::fs::read_to_string(&h.transport.catalog_imports()[0]).unwrap();
        assert!(!xml.contains("<MetaDataScheme>"));
        assert!(xml.contains("<Code>SKU-A</Code>"));
        assert!(!h.transport.resource_records().is_empty());
        assert_eq!(
            h.transport.last_completion(),
            Some(("Web".to_string(), ImportEventKind::EntityAdded, true))
        );
    }

    #[tokio::test]
    async fn link_update_reexports_below_the_source() {
        let h = harness(ChannelFixture::sample(), RecordingTransport::default());
        let event = h
            .orchestrator
            .link_updated(ChannelFixture::PRODUCT, ChannelFixture::ITEM)
            .await;

        assert!(event.is_success(), "{:?}", event.failure);
        assert_eq!(h.transport.catalog_imports().len(), 1);
        assert_eq!(
            h.transport.last_completion(),
            Some(("Web".to_string(), ImportEventKind::LinkUpdated, true))
        );
    }

    #[tokio::test]
    async fn updated_node_is_published_without_resources() {
        let h = harness(ChannelFixture::sample(), RecordingTransport::default());
        let event = h
            .orchestrator
            .entity_updated(ChannelFixture::NODE, "ChannelNodeName")
            .await;

        assert!(event.is_success(), "{:?}", event.failure);
        let imports = h.transport.catalog_imports();
        assert_eq!(imports.len(), 1);
        let xml = std::fs::read_to_string(&imports[0]).unwrap();
        assert!(xml.contains("<Code>10</Code>"));
        assert!(h.transport.resource_records().is_empty());
        assert_eq!(
            h.transport.last_completion(),
            Some(("Web".to_string(), ImportEventKind::EntityUpdated, false))
        );
    }

    #[tokio::test]
    async fn deleted_node_is_removed_from_the_catalog() {
        let fixture = ChannelFixture::sample();
        let node = fixture.entity(ChannelFixture::NODE);
        let h = harness(fixture, RecordingTransport::default());

        let event = h.orchestrator.entity_deleted(&node).await;

        assert!(event.is_success(), "{:?}", event.failure);
        let calls = h.transport.calls();
        assert!(calls.contains(&TransportCall::DeleteCatalogNode {
            code: "10".into(),
            catalog_id: ChannelFixture::CHANNEL,
        }));
        assert!(calls.contains(&TransportCall::DeleteCompleted {
            catalog_name: "Web".into(),
            kind: DeleteEventKind::EntityDeleted,
        }));
    }

    #[tokio::test]
    async fn deleted_channel_drops_the_catalog() {
        let fixture = ChannelFixture::sample();
        let channel = fixture.channel();
        let h = harness(fixture, RecordingTransport::default());

        let event = h.orchestrator.entity_deleted(&channel).await;

        assert!(event.is_success(), "{:?}", event.failure);
        assert!(h
            .transport
            .calls()
            .contains(&TransportCall::DeleteCatalog(ChannelFixture::CHANNEL)));
        assert!(h.transport.catalog_imports().is_empty());
    }
}
