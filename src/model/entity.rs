//! Entity snapshots fetched from the source graph.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::EntityId;

/// Closed set of entity kinds understood by the engine.
///
/// Resolved once at the graph boundary from the source type id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Channel,
    ChannelNode,
    Product,
    Item,
    Bundle,
    Package,
    Resource,
    Specification,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Channel => "Channel",
            EntityKind::ChannelNode => "ChannelNode",
            EntityKind::Product => "Product",
            EntityKind::Item => "Item",
            EntityKind::Bundle => "Bundle",
            EntityKind::Package => "Package",
            EntityKind::Resource => "Resource",
            EntityKind::Specification => "Specification",
        }
    }

    /// Resolve a source type id. Unknown type ids are rejected.
    pub fn from_type_id(type_id: &str) -> Option<Self> {
        match type_id {
            "Channel" => Some(EntityKind::Channel),
            "ChannelNode" => Some(EntityKind::ChannelNode),
            "Product" => Some(EntityKind::Product),
            "Item" => Some(EntityKind::Item),
            "Bundle" => Some(EntityKind::Bundle),
            "Package" => Some(EntityKind::Package),
            "Resource" => Some(EntityKind::Resource),
            "Specification" => Some(EntityKind::Specification),
            _ => None,
        }
    }

    /// Kinds rendered as catalog entries.
    pub fn is_entry(&self) -> bool {
        match self {
            EntityKind::Product | EntityKind::Item | EntityKind::Bundle | EntityKind::Package => {
                true
            }
            EntityKind::Channel
            | EntityKind::ChannelNode
            | EntityKind::Resource
            | EntityKind::Specification => false,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A culture-keyed string value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocaleString(pub BTreeMap<String, String>);

impl LocaleString {
    pub fn get(&self, culture: &str) -> Option<&str> {
        self.0.get(culture).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| v.is_empty())
    }

    pub fn with(mut self, culture: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(culture.into(), value.into());
        self
    }
}

/// Typed field data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Locale(LocaleString),
    /// Controlled-vocabulary keys.
    Cvl(Vec<String>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::Locale(ls) => ls.is_empty(),
            FieldValue::Cvl(keys) => keys.is_empty(),
            FieldValue::Integer(_)
            | FieldValue::Double(_)
            | FieldValue::Boolean(_)
            | FieldValue::DateTime(_) => false,
        }
    }

    /// Single-string rendering used for non-localized output.
    pub fn flat(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Double(d) => d.to_string(),
            FieldValue::Boolean(b) => if *b { "True" } else { "False" }.to_string(),
            FieldValue::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
            FieldValue::Locale(ls) => ls.0.values().next().cloned().unwrap_or_default(),
            FieldValue::Cvl(keys) => keys.join(";"),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// A field on an entity snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub field_type_id: String,
    #[serde(default)]
    pub value: Option<FieldValue>,
    #[serde(default)]
    pub revision: u32,
}

impl Field {
    pub fn new(field_type_id: impl Into<String>, value: FieldValue) -> Self {
        Self {
            field_type_id: field_type_id.into(),
            value: Some(value),
            revision: 1,
        }
    }

    pub fn empty(field_type_id: impl Into<String>) -> Self {
        Self {
            field_type_id: field_type_id.into(),
            value: None,
            revision: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.as_ref().map(FieldValue::is_empty).unwrap_or(true)
    }
}

/// One historical revision of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRevision {
    pub revision: u32,
    #[serde(default)]
    pub value: Option<FieldValue>,
}

/// Minimal identity of a link endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: EntityId,
    pub kind: EntityKind,
}

/// A directed, typed relation between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: i64,
    pub link_type_id: String,
    pub source: EntityRef,
    pub target: EntityRef,
    #[serde(default)]
    pub sort_order: i32,
    /// Entity carrying per-placement fields, when the link type has one.
    #[serde(default)]
    pub link_entity_id: Option<EntityId>,
}

/// Immutable entity snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub entity_type_id: String,
    #[serde(default)]
    pub field_set_id: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub display_name: Option<Field>,
    #[serde(default)]
    pub display_description: Option<Field>,
    /// File id of the resource marked as this entity's main picture.
    #[serde(default)]
    pub main_picture_file_id: Option<i64>,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub outbound_links: Vec<Link>,
    #[serde(default)]
    pub inbound_links: Vec<Link>,
}

impl Entity {
    pub fn field(&self, field_type_id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.field_type_id == field_type_id)
    }

    /// Non-empty value of a field, if any.
    pub fn value(&self, field_type_id: &str) -> Option<&FieldValue> {
        self.field(field_type_id)
            .and_then(|f| f.value.as_ref())
            .filter(|v| !v.is_empty())
    }

    /// Case-insensitive field lookup, used for conventionally named fields.
    pub fn field_ignore_case(&self, field_type_id: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.field_type_id.eq_ignore_ascii_case(field_type_id))
    }

    /// First outbound link whose target has the given kind.
    pub fn outbound_to(&self, kind: EntityKind) -> Option<&Link> {
        self.outbound_links.iter().find(|l| l.target.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_type_id() {
        for kind in [
            EntityKind::Channel,
            EntityKind::ChannelNode,
            EntityKind::Product,
            EntityKind::Item,
            EntityKind::Bundle,
            EntityKind::Package,
            EntityKind::Resource,
            EntityKind::Specification,
        ] {
            assert_eq!(EntityKind::from_type_id(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::from_type_id("Brand"), None);
    }

    #[test]
    fn field_emptiness_follows_value_kind() {
        assert!(Field::empty("ProductName").is_empty());
        assert!(Field::new("ProductName", FieldValue::Text(String::new())).is_empty());
        assert!(Field::new(
            "ProductName",
            FieldValue::Locale(LocaleString::default().with("en", ""))
        )
        .is_empty());
        assert!(!Field::new("ProductWeight", FieldValue::Integer(0)).is_empty());
        assert!(Field::new("ProductColor", FieldValue::Cvl(vec![])).is_empty());
    }

    #[test]
    fn flat_values_are_stable() {
        assert_eq!(FieldValue::Boolean(true).flat(), "True");
        assert_eq!(FieldValue::Integer(42).flat(), "42");
        assert_eq!(
            FieldValue::Cvl(vec!["red".into(), "blue".into()]).flat(),
            "red;blue"
        );
    }
}
