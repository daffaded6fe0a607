//! Catalog document rendering.
//!
//! Rendering is split in two pure stages: [`mapping`] turns entities and
//! field policy into [`records`], and [`serialize`] turns records into an
//! element tree. Anything that needs the graph (specification texts) is
//! fetched up front by [`fetch_specifications`].

pub mod mapping;
pub mod records;
pub mod schema;
pub mod serialize;

use anyhow::Context;
use indexmap::IndexSet;
use tracing::{debug, warn};

use crate::codes::CodeGenerator;
use crate::config::ConnectorConfig;
use crate::export_set::ExportSet;
use crate::graph::GraphService;
use crate::model::{classify_link, CatalogModel, Entity, EntityKind, LinkRole, StructureEntity};
use crate::types::{EntityId, Result};
use crate::xml::Element;

pub use mapping::CatalogMapper;
pub use records::{
    AssociationRecord, CatalogHeader, CatalogRecords, CatalogStats, EntryRecord,
    EntryRelationType, NodeRecord, RelationRecord, SpecificationTexts,
};

/// Renders export sets into catalog documents.
pub struct DocumentBuilder<'a> {
    config: &'a ConnectorConfig,
    model: &'a CatalogModel,
    mapper: CatalogMapper<'a>,
}

impl<'a> DocumentBuilder<'a> {
    pub fn new(config: &'a ConnectorConfig, model: &'a CatalogModel, codes: &'a CodeGenerator) -> Self {
        Self {
            config,
            model,
            mapper: CatalogMapper::new(config, model, codes),
        }
    }

    pub fn mapper(&self) -> &CatalogMapper<'a> {
        &self.mapper
    }

    fn header(&self, channel: &Entity) -> CatalogHeader {
        CatalogHeader {
            name: self.mapper.entity_name(channel),
            last_modified: mapping::format_date(channel.last_modified),
            start_date: mapping::format_date(self.mapper.start_date(channel)),
            end_date: mapping::format_date(self.mapper.end_date(channel)),
            default_currency: self.config.default_currency.clone(),
            weight_base: self.config.weight_base.clone(),
            default_language: self.config.default_catalog_language(),
            languages: self.config.catalog_languages(),
        }
    }

    /// Records for every position in the export set, in discovery order.
    ///
    /// `full` adds the schema block and association types.
    pub fn build(
        &self,
        channel: &Entity,
        export: &ExportSet,
        full: bool,
        specifications: &SpecificationTexts,
    ) -> CatalogRecords {
        let codes = self.mapper.codes();
        let mut rendered: IndexSet<EntityId> = IndexSet::new();
        let mut nodes = Vec::new();
        let mut entries = Vec::new();
        let mut relations: IndexSet<RelationRecord> = IndexSet::new();
        let mut associations: IndexSet<AssociationRecord> = IndexSet::new();

        for position in export.positions() {
            let Some(entity) = export.entity(position.entity_id) else {
                warn!(
                    "Entity {} at '{}' was not loaded; skipping",
                    position.entity_id, position.path
                );
                continue;
            };
            let parent = export.entity(position.parent_id);

            match position.kind {
                EntityKind::ChannelNode => {
                    let parent_node = parent.filter(|p| p.kind == EntityKind::ChannelNode);
                    if rendered.insert(entity.id) {
                        let parent_code = parent_node
                            .map(|p| codes.entity_code(p.id))
                            .unwrap_or_default();
                        nodes.push(self.mapper.node_record(entity, parent_code, position.sort_order));
                    } else if let Some(parent_node) = parent_node {
                        relations.insert(RelationRecord::Node {
                            parent_code: codes.entity_code(parent_node.id),
                            child_code: codes.entity_code(entity.id),
                            sort_order: position.sort_order,
                        });
                    }
                }
                EntityKind::Product | EntityKind::Item | EntityKind::Bundle | EntityKind::Package => {
                    if rendered.insert(entity.id) {
                        self.push_entries(entity, specifications, &mut entries, &mut relations);
                    }
                    if let Some(parent) = parent {
                        self.relate(parent, entity, position, &mut relations, &mut associations);
                    }
                }
                EntityKind::Channel | EntityKind::Resource | EntityKind::Specification => {}
            }
        }

        let records = CatalogRecords {
            header: self.header(channel),
            schema: full.then(|| schema::schema_records(self.config, self.model)),
            nodes,
            entries,
            relations: relations.into_iter().collect(),
            associations: associations.into_iter().collect(),
            association_types: full.then(|| schema::association_types(self.model)),
        };
        debug!("Built catalog records: {:?}", records.stats());
        records
    }

    /// Records for a single updated entity, without relations or schema.
    pub fn build_update(
        &self,
        channel: &Entity,
        entity: &Entity,
        specifications: &SpecificationTexts,
    ) -> CatalogRecords {
        let mut entries = Vec::new();
        let mut relations = IndexSet::new();
        if entity.kind.is_entry() {
            self.push_entries(entity, specifications, &mut entries, &mut relations);
        }

        CatalogRecords {
            header: self.header(channel),
            schema: None,
            nodes: Vec::new(),
            entries,
            relations: relations.into_iter().collect(),
            associations: Vec::new(),
            association_types: None,
        }
    }

    /// Render straight to an element tree.
    pub fn render(
        &self,
        channel: &Entity,
        export: &ExportSet,
        full: bool,
        specifications: &SpecificationTexts,
    ) -> Element {
        serialize::catalog(&self.build(channel, export, full, specifications))
    }

    fn push_entries(
        &self,
        entity: &Entity,
        specifications: &SpecificationTexts,
        entries: &mut Vec<EntryRecord>,
        relations: &mut IndexSet<RelationRecord>,
    ) {
        let skus = self.mapper.sku_entries(entity, specifications);
        if skus.is_empty() {
            entries.push(self.mapper.entry_record(entity));
            return;
        }

        if self.config.use_three_levels_in_commerce {
            let item_code = self.mapper.codes().entity_code(entity.id);
            entries.push(self.mapper.entry_record(entity));
            for (index, sku) in skus.iter().enumerate() {
                relations.insert(RelationRecord::Entry {
                    parent_code: item_code.clone(),
                    child_code: sku.code.clone(),
                    relation_type: EntryRelationType::ProductVariation,
                    sort_order: index as i32,
                });
            }
        }
        entries.extend(skus);
    }

    fn relate(
        &self,
        parent: &Entity,
        child: &Entity,
        position: &StructureEntity,
        relations: &mut IndexSet<RelationRecord>,
        associations: &mut IndexSet<AssociationRecord>,
    ) {
        let child_codes = self.mapper.relation_codes(child);

        match classify_link(parent.kind, child.kind) {
            LinkRole::Structure => {
                let node_code = self.mapper.codes().entity_code(parent.id);
                for entry_code in child_codes {
                    relations.insert(RelationRecord::NodeEntry {
                        node_code: node_code.clone(),
                        entry_code,
                        sort_order: position.sort_order,
                    });
                }
            }
            LinkRole::EntryRelation => {
                let relation_type = match parent.kind {
                    EntityKind::Bundle => EntryRelationType::BundleEntry,
                    EntityKind::Package => EntryRelationType::PackageEntry,
                    _ => EntryRelationType::ProductVariation,
                };
                for parent_code in self.mapper.relation_codes(parent) {
                    for child_code in &child_codes {
                        relations.insert(RelationRecord::Entry {
                            parent_code: parent_code.clone(),
                            child_code: child_code.clone(),
                            relation_type,
                            sort_order: position.sort_order,
                        });
                    }
                }
            }
            LinkRole::Association => {
                let link_type = position.link_type_id.clone().unwrap_or_default();
                for parent_code in self.mapper.relation_codes(parent) {
                    for child_code in &child_codes {
                        associations.insert(AssociationRecord {
                            name: link_type.clone(),
                            description: link_type.clone(),
                            sort_order: position.sort_order,
                            entry_code: parent_code.clone(),
                            associated_code: child_code.clone(),
                            association_type: link_type.clone(),
                        });
                    }
                }
            }
            LinkRole::Media | LinkRole::Specification | LinkRole::Other => {}
        }
    }
}

/// Fetch specification texts for every exploding item that links a
/// specification, once per source culture.
pub fn fetch_specifications<'e>(
    graph: &dyn GraphService,
    mapper: &CatalogMapper<'_>,
    config: &ConnectorConfig,
    entities: impl IntoIterator<Item = &'e Entity>,
) -> Result<SpecificationTexts> {
    let mut texts = SpecificationTexts::default();
    let mut fetched: IndexSet<EntityId> = IndexSet::new();

    for entity in entities {
        if mapper.exploded_skus(entity).is_empty() || fetched.contains(&entity.id) {
            continue;
        }
        let Some(link) = entity.outbound_to(EntityKind::Specification) else {
            continue;
        };
        fetched.insert(entity.id);

        for mapping in &config.language_mapping {
            let html = graph
                .specification_html(link.target.id, entity.id, &mapping.pim)
                .with_context(|| {
                    format!(
                        "Failed to fetch specification {} for entity {}",
                        link.target.id, entity.id
                    )
                })?;
            if let Some(html) = html {
                texts.insert(entity.id, mapping.pim.clone(), html);
            }
        }
    }

    Ok(texts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ChannelFixture;

    fn sample() -> (ChannelFixture, ConnectorConfig) {
        let fixture = ChannelFixture::sample();
        let config = fixture.config();
        (fixture, config)
    }

    fn full_set(fixture: &ChannelFixture, config: &ConnectorConfig) -> ExportSet {
        let graph = fixture.graph();
        let mut set = crate::resolver::StructureResolver::new(&graph, config.channel_id)
            .full(&config.export_enabled_entity_types)
            .unwrap();
        set.hydrate(&graph, config.channel_id).unwrap();
        set
    }

    #[test]
    fn rendering_is_deterministic() {
        let (fixture, config) = sample();
        let model = fixture.graph().model;
        let codes = CodeGenerator::from_config(&config);
        let builder = DocumentBuilder::new(&config, &model, &codes);
        let set = full_set(&fixture, &config);
        let channel = fixture.channel();

        let first = builder
            .render(&channel, &set, true, &SpecificationTexts::default())
            .to_xml_string()
            .unwrap();
        let second = builder
            .render(&channel, &set, true, &SpecificationTexts::default())
            .to_xml_string()
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn item_with_skus_explodes_without_own_entry() {
        let (fixture, config) = sample();
        let model = fixture.graph().model;
        let codes = CodeGenerator::from_config(&config);
        let builder = DocumentBuilder::new(&config, &model, &codes);
        let set = full_set(&fixture, &config);

        let records = builder.build(&fixture.channel(), &set, false, &SpecificationTexts::default());

        let item_code = codes.entity_code(ChannelFixture::ITEM);
        assert!(records.entry(&item_code).is_none());
        assert!(records.entry(&codes.sku_code("A")).is_some());
        assert!(records.entry(&codes.sku_code("B")).is_some());
        assert!(records.schema.is_none());
        assert!(records.association_types.is_none());

        let product_code = codes.entity_code(ChannelFixture::PRODUCT);
        let variations: Vec<&str> = records
            .relations
            .iter()
            .filter_map(|r| match r {
                RelationRecord::Entry {
                    parent_code,
                    child_code,
                    relation_type: EntryRelationType::ProductVariation,
                    ..
                } if *parent_code == product_code => Some(child_code.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(variations, vec!["SKU-A", "SKU-B"]);
    }

    #[test]
    fn three_levels_keeps_item_entry_and_links_skus() {
        let (fixture, mut config) = sample();
        config.use_three_levels_in_commerce = true;
        let model = fixture.graph().model;
        let codes = CodeGenerator::from_config(&config);
        let builder = DocumentBuilder::new(&config, &model, &codes);
        let set = full_set(&fixture, &config);

        let records = builder.build(&fixture.channel(), &set, false, &SpecificationTexts::default());
        let item_code = codes.entity_code(ChannelFixture::ITEM);
        assert!(records.entry(&item_code).is_some());
        assert!(records.relations.contains(&RelationRecord::Entry {
            parent_code: item_code.clone(),
            child_code: codes.sku_code("B"),
            relation_type: EntryRelationType::ProductVariation,
            sort_order: 1,
        }));
    }

    #[test]
    fn full_export_carries_schema_and_node_relations() {
        let (fixture, config) = sample();
        let model = fixture.graph().model;
        let codes = CodeGenerator::from_config(&config);
        let builder = DocumentBuilder::new(&config, &model, &codes);
        let set = full_set(&fixture, &config);

        let records = builder.build(&fixture.channel(), &set, true, &SpecificationTexts::default());
        assert!(records.schema.is_some());
        assert_eq!(records.nodes.len(), 1);
        assert_eq!(records.nodes[0].parent_code, "");
        assert!(records.relations.contains(&RelationRecord::NodeEntry {
            node_code: codes.entity_code(ChannelFixture::NODE),
            entry_code: codes.entity_code(ChannelFixture::PRODUCT),
            sort_order: 0,
        }));

        let xml = serialize::catalog(&records).to_xml_string().unwrap();
        assert!(xml.contains("<MetaDataPlusBackup version=\"1.0\">"));
        assert!(xml.contains("<NodeEntryRelation>"));
        assert!(xml.contains("defaultLanguage=\"en\""));
    }

    #[test]
    fn update_document_has_no_relations() {
        let (fixture, config) = sample();
        let model = fixture.graph().model;
        let codes = CodeGenerator::from_config(&config);
        let builder = DocumentBuilder::new(&config, &model, &codes);
        let product = fixture.entity(ChannelFixture::PRODUCT);

        let records =
            builder.build_update(&fixture.channel(), &product, &SpecificationTexts::default());
        assert_eq!(records.entries.len(), 1);
        assert!(records.relations.is_empty());
        assert!(records.nodes.is_empty());
    }
}
