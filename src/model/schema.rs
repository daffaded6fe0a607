//! Source model: entity types, field types, field sets, link types and CVLs.
//!
//! Fetched once per operation and handed to the pure rendering stages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{EntityKind, LocaleString};

/// Declared data kind of a field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    String,
    LocaleString,
    Cvl,
    Integer,
    Double,
    Boolean,
    DateTime,
    Xml,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldType {
    pub id: String,
    pub entity_type_id: String,
    pub data_type: DataType,
    #[serde(default)]
    pub cvl_id: Option<String>,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub exclude_from_default_view: bool,
    /// Free-form settings (`AllowSearch`, `UseInComparing`, ...).
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl FieldType {
    pub fn new(id: impl Into<String>, entity_type_id: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: id.into(),
            entity_type_id: entity_type_id.into(),
            data_type,
            cvl_id: None,
            mandatory: false,
            unique: false,
            exclude_from_default_view: false,
            settings: BTreeMap::new(),
        }
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.settings
            .get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }

    pub fn allow_search(&self) -> bool {
        self.flag("AllowSearch", true)
    }

    pub fn use_in_comparing(&self) -> bool {
        self.flag("UseInComparing", false)
    }

    pub fn is_multi_language(&self) -> bool {
        self.data_type == DataType::LocaleString
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSet {
    pub id: String,
    #[serde(default)]
    pub field_types: Vec<String>,
}

impl FieldSet {
    pub fn contains(&self, field_type_id: &str) -> bool {
        self.field_types.iter().any(|f| f == field_type_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub id: String,
    pub kind: EntityKind,
    #[serde(default)]
    pub field_types: Vec<FieldType>,
    #[serde(default)]
    pub field_sets: Vec<FieldSet>,
    #[serde(default)]
    pub is_link_entity_type: bool,
}

impl EntityType {
    pub fn field_set(&self, id: &str) -> Option<&FieldSet> {
        self.field_sets.iter().find(|fs| fs.id == id)
    }

    pub fn field_type(&self, id: &str) -> Option<&FieldType> {
        self.field_types.iter().find(|ft| ft.id == id)
    }
}

/// How a link type surfaces downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    /// Channel or node to child node or entry.
    Structure,
    /// Parent entry to child entry (variation, bundle, package).
    EntryRelation,
    /// Non-hierarchical entry to entry link.
    Association,
    /// Attachment of a resource.
    Media,
    /// Specification template attached to an entry.
    Specification,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkType {
    pub id: String,
    pub source_kind: EntityKind,
    pub target_kind: EntityKind,
    #[serde(default)]
    pub index: i32,
}

impl LinkType {
    pub fn role(&self) -> LinkRole {
        classify_link(self.source_kind, self.target_kind)
    }
}

/// Classify a link by the kinds it connects.
pub fn classify_link(source: EntityKind, target: EntityKind) -> LinkRole {
    use EntityKind::*;

    match (source, target) {
        (_, Resource) => LinkRole::Media,
        (_, Specification) => LinkRole::Specification,
        (Channel | ChannelNode, ChannelNode | Product | Item | Bundle | Package) => {
            LinkRole::Structure
        }
        (Product, Item) | (Bundle | Package, Product | Item | Bundle | Package) => {
            LinkRole::EntryRelation
        }
        (Product | Item, Product | Bundle | Package) | (Item, Item) => LinkRole::Association,
        (_, Channel)
        | (Resource | Specification, _)
        | (Product | Item | Bundle | Package, ChannelNode) => LinkRole::Other,
    }
}

/// Text of a controlled-vocabulary value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CvlText {
    Plain(String),
    Localized(LocaleString),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvlValue {
    pub key: String,
    pub value: CvlText,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cvl {
    pub id: String,
    #[serde(default)]
    pub values: Vec<CvlValue>,
}

impl Cvl {
    pub fn is_localized(&self) -> bool {
        self.values
            .iter()
            .any(|v| matches!(v.value, CvlText::Localized(_)))
    }

    pub fn value(&self, key: &str) -> Option<&CvlValue> {
        self.values.iter().find(|v| v.key == key)
    }
}

/// Snapshot of the source model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogModel {
    #[serde(default)]
    pub entity_types: Vec<EntityType>,
    #[serde(default)]
    pub link_types: Vec<LinkType>,
    #[serde(default)]
    pub cvls: Vec<Cvl>,
    /// File extensions the image service can render display configurations for.
    #[serde(default)]
    pub image_extensions: Vec<String>,
}

impl CatalogModel {
    pub fn entity_type(&self, id: &str) -> Option<&EntityType> {
        self.entity_types.iter().find(|et| et.id == id)
    }

    pub fn entity_type_for_kind(&self, kind: EntityKind) -> Option<&EntityType> {
        self.entity_types.iter().find(|et| et.kind == kind)
    }

    pub fn field_type(&self, entity_type_id: &str, field_type_id: &str) -> Option<&FieldType> {
        self.entity_type(entity_type_id)
            .and_then(|et| et.field_type(field_type_id))
    }

    pub fn link_type(&self, id: &str) -> Option<&LinkType> {
        self.link_types.iter().find(|lt| lt.id == id)
    }

    pub fn cvl(&self, id: &str) -> Option<&Cvl> {
        self.cvls.iter().find(|c| c.id == id)
    }

    pub fn is_image_extension(&self, extension: &str) -> bool {
        self.image_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension))
    }

    /// Link types rendered as association types.
    pub fn association_types(&self) -> impl Iterator<Item = &LinkType> {
        self.link_types
            .iter()
            .filter(|lt| lt.role() == LinkRole::Association)
    }
}
