//! Resource manifest records and their `Resources` document.

use serde::{Deserialize, Serialize};

use crate::document::records::MetaFieldRecord;
use crate::document::serialize::{bool_text, meta_field};
use crate::xml::Element;

/// What the downstream importer should do with a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceAction {
    Added,
    Updated,
    Unlinked,
    Deleted,
}

impl ResourceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceAction::Added => "added",
            ResourceAction::Updated => "updated",
            ResourceAction::Unlinked => "unlinked",
            ResourceAction::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ResourceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entry code a resource is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentEntry {
    pub code: String,
    pub is_main_picture: bool,
}

/// Schema row for one resource field type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMetaFieldDefinition {
    pub name: String,
    pub field_type: String,
    pub maximum_length: u32,
    pub allow_nulls: bool,
    pub unique: bool,
}

/// One `Resource` element of the manifest.
///
/// `fields` and `paths` are `None` when the element must not carry them
/// (unlinked and deleted resources).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub code: String,
    pub action: ResourceAction,
    pub fields: Option<Vec<MetaFieldRecord>>,
    pub paths: Option<Vec<String>>,
    pub parents: Vec<ParentEntry>,
}

impl ResourceEntry {
    pub fn deleted(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            action: ResourceAction::Deleted,
            fields: None,
            paths: None,
            parents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceManifest {
    /// Written as `ResourceMetaFields` on full exports.
    pub schema: Option<Vec<ResourceMetaFieldDefinition>>,
    pub resources: Vec<ResourceEntry>,
}

impl ResourceManifest {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn to_element(&self) -> Element {
        let schema = Element::new("ResourceMetaFields").with_children(
            self.schema
                .iter()
                .flatten()
                .map(resource_meta_field),
        );

        Element::new("Resources").with_child(schema).with_child(
            Element::new("ResourceFiles").with_children(self.resources.iter().map(resource)),
        )
    }
}

fn resource_meta_field(definition: &ResourceMetaFieldDefinition) -> Element {
    Element::new("ResourceMetaField")
        .with_child(Element::text_element("FieldName", &definition.name))
        .with_child(Element::text_element("FriendlyName", &definition.name))
        .with_child(Element::text_element("Description", &definition.name))
        .with_child(Element::text_element("FieldType", &definition.field_type))
        .with_child(Element::text_element("Format", "Text"))
        .with_child(Element::text_element("MaximumLength", definition.maximum_length))
        .with_child(Element::text_element("AllowNulls", bool_text(definition.allow_nulls)))
        .with_child(Element::text_element("UniqueValue", bool_text(definition.unique)))
}

fn resource(entry: &ResourceEntry) -> Element {
    let mut element = Element::new("Resource")
        .with_attr("id", &entry.code)
        .with_attr("action", entry.action);

    if entry.action == ResourceAction::Deleted {
        return element;
    }

    if let Some(fields) = &entry.fields {
        element.push(Element::new("ResourceFields").with_children(fields.iter().map(meta_field)));
    }
    if let Some(paths) = &entry.paths {
        element.push(
            Element::new("Paths").with_children(paths.iter().map(|p| Element::text_element("Path", p))),
        );
    }
    element.push(Element::new("ParentEntries").with_children(entry.parents.iter().map(|parent| {
        Element::text_element("EntryCode", &parent.code)
            .with_attr("IsMainPicture", bool_text(parent.is_main_picture))
    })));
    element
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::records::DataRecord;

    #[test]
    fn deleted_resources_carry_only_identity() {
        let manifest = ResourceManifest {
            schema: None,
            resources: vec![ResourceEntry::deleted("5000")],
        };
        let root = manifest.to_element();
        let files = root.child("ResourceFiles").unwrap();
        let resource = files.child("Resource").unwrap();
        assert_eq!(resource.attr("id"), Some("5000"));
        assert_eq!(resource.attr("action"), Some("deleted"));
        assert_eq!(resource.elements().count(), 0);
        assert_eq!(root.child("ResourceMetaFields").unwrap().elements().count(), 0);
    }

    #[test]
    fn added_resource_lists_fields_paths_and_parents() {
        let manifest = ResourceManifest {
            schema: Some(vec![ResourceMetaFieldDefinition {
                name: "ResourceFilename".into(),
                field_type: "LongHtmlString".into(),
                maximum_length: 65000,
                allow_nulls: true,
                unique: false,
            }]),
            resources: vec![ResourceEntry {
                code: "5000".into(),
                action: ResourceAction::Added,
                fields: Some(vec![MetaFieldRecord {
                    name: "ResourceFilename".into(),
                    data_type: "LongHtmlString".into(),
                    data: vec![DataRecord::value("en", "shoe.png")],
                }]),
                paths: Some(vec!["./Original/shoe.png".into()]),
                parents: vec![
                    ParentEntry {
                        code: "SKU-A".into(),
                        is_main_picture: true,
                    },
                    ParentEntry {
                        code: "SKU-B".into(),
                        is_main_picture: false,
                    },
                ],
            }],
        };

        let xml = manifest.to_element().to_xml_string().unwrap();
        assert!(xml.contains("<FieldName>ResourceFilename</FieldName>"));
        assert!(xml.contains("<Path>./Original/shoe.png</Path>"));
        assert!(xml.contains("<EntryCode IsMainPicture=\"True\">SKU-A</EntryCode>"));
        assert!(xml.contains("<EntryCode IsMainPicture=\"False\">SKU-B</EntryCode>"));
    }
}
