//! Intermediate records produced by the mapping stage.
//!
//! Records carry already-decided values (codes, names, languages, data
//! kinds) and no XML. [`super::serialize`] turns them into element trees.

use std::collections::BTreeMap;

use crate::types::EntityId;

/// Value payload of one `Data` element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataPayload {
    Value(String),
    /// Controlled-vocabulary items.
    Items(Vec<String>),
}

/// One language-tagged value of a meta field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataRecord {
    pub language: String,
    pub payload: DataPayload,
}

impl DataRecord {
    pub fn value(language: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            payload: DataPayload::Value(value.into()),
        }
    }

    pub fn items(language: impl Into<String>, items: Vec<String>) -> Self {
        Self {
            language: language.into(),
            payload: DataPayload::Items(items),
        }
    }
}

/// A field value as rendered on a node or entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetaFieldRecord {
    pub name: String,
    pub data_type: String,
    pub data: Vec<DataRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaDataRecord {
    pub meta_class: String,
    pub fields: Vec<MetaFieldRecord>,
}

/// SEO values for one catalog language. Only non-empty values are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeoRecord {
    pub language: String,
    pub uri: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub uri_segment: Option<String>,
}

impl SeoRecord {
    pub fn is_empty(&self) -> bool {
        self.uri.is_none()
            && self.title.is_none()
            && self.description.is_none()
            && self.keywords.is_none()
            && self.uri_segment.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub entity_id: EntityId,
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub sort_order: i32,
    pub guid: String,
    pub code: String,
    pub meta: MetaDataRecord,
    /// Empty for nodes directly below the channel.
    pub parent_code: String,
    pub seo: Vec<SeoRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub entity_id: EntityId,
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub code: String,
    pub entry_type: String,
    pub guid: String,
    pub meta: MetaDataRecord,
    pub seo: Vec<SeoRecord>,
}

/// Kind of a parent-to-child entry relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryRelationType {
    ProductVariation,
    BundleEntry,
    PackageEntry,
}

impl EntryRelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryRelationType::ProductVariation => "ProductVariation",
            EntryRelationType::BundleEntry => "BundleEntry",
            EntryRelationType::PackageEntry => "PackageEntry",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelationRecord {
    NodeEntry {
        node_code: String,
        entry_code: String,
        sort_order: i32,
    },
    Node {
        parent_code: String,
        child_code: String,
        sort_order: i32,
    },
    Entry {
        parent_code: String,
        child_code: String,
        relation_type: EntryRelationType,
        sort_order: i32,
    },
}

/// A typed, non-hierarchical link between two entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssociationRecord {
    pub name: String,
    pub description: String,
    pub sort_order: i32,
    pub entry_code: String,
    pub associated_code: String,
    pub association_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationTypeRecord {
    pub type_id: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaClassRecord {
    pub name: String,
    pub parent_class: String,
    pub table_name: String,
}

/// Definition of a meta field in the schema block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaFieldDefinition {
    pub name: String,
    pub data_type: String,
    pub length: u32,
    pub allow_nulls: bool,
    pub allow_search: bool,
    pub multi_language: bool,
    pub use_in_comparing: bool,
    pub owners: Vec<String>,
}

impl MetaFieldDefinition {
    pub fn add_owner(&mut self, owner: impl Into<String>) {
        let owner = owner.into();
        if !self.owners.contains(&owner) {
            self.owners.push(owner);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaRecords {
    pub meta_classes: Vec<MetaClassRecord>,
    pub meta_fields: Vec<MetaFieldDefinition>,
}

/// Attributes of the catalog root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogHeader {
    pub name: String,
    pub last_modified: String,
    pub start_date: String,
    pub end_date: String,
    pub default_currency: String,
    pub weight_base: String,
    pub default_language: String,
    pub languages: String,
}

/// Everything a catalog document contains, in output order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecords {
    pub header: CatalogHeader,
    pub schema: Option<SchemaRecords>,
    pub nodes: Vec<NodeRecord>,
    pub entries: Vec<EntryRecord>,
    pub relations: Vec<RelationRecord>,
    pub associations: Vec<AssociationRecord>,
    pub association_types: Option<Vec<AssociationTypeRecord>>,
}

/// Element counts logged after rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogStats {
    pub nodes: usize,
    pub entries: usize,
    pub relations: usize,
    pub associations: usize,
}

impl CatalogRecords {
    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            nodes: self.nodes.len(),
            entries: self.entries.len(),
            relations: self.relations.len(),
            associations: self.associations.len(),
        }
    }

    pub fn entry(&self, code: &str) -> Option<&EntryRecord> {
        self.entries.iter().find(|e| e.code == code)
    }
}

/// Pre-fetched specification texts keyed by entity and source culture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecificationTexts(BTreeMap<(EntityId, String), String>);

impl SpecificationTexts {
    pub fn insert(&mut self, entity_id: EntityId, culture: impl Into<String>, html: String) {
        self.0.insert((entity_id, culture.into()), html);
    }

    pub fn get(&self, entity_id: EntityId, culture: &str) -> Option<&str> {
        self.0
            .get(&(entity_id, culture.to_string()))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
