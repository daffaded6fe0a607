//! Records to element trees, following the downstream import contract.

use super::records::{
    AssociationRecord, AssociationTypeRecord, CatalogHeader, CatalogRecords, DataPayload,
    DataRecord, EntryRecord, MetaClassRecord, MetaDataRecord, MetaFieldDefinition,
    MetaFieldRecord, NodeRecord, RelationRecord, SchemaRecords, SeoRecord,
};
use crate::xml::Element;

const CATALOG_NAMESPACE: &str = "Mediachase.Commerce.Catalog";
const USER_NAMESPACE: &str = "Mediachase.Commerce.Catalog.User";
const SCHEMA_DESCRIPTION: &str = "From PIM";

pub fn bool_text(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

pub fn data(record: &DataRecord) -> Element {
    let element = Element::new("Data").with_attr("language", &record.language);
    match &record.payload {
        DataPayload::Value(value) => element.with_attr("value", value),
        DataPayload::Items(items) => element.with_children(
            items
                .iter()
                .map(|item| Element::new("Item").with_attr("value", item)),
        ),
    }
}

pub fn meta_field(record: &MetaFieldRecord) -> Element {
    Element::new("MetaField")
        .with_child(Element::text_element("Name", &record.name))
        .with_child(Element::text_element("Type", &record.data_type))
        .with_children(record.data.iter().map(data))
}

fn meta_data(record: &MetaDataRecord) -> Element {
    Element::new("MetaData")
        .with_child(
            Element::new("MetaClass").with_child(Element::text_element("Name", &record.meta_class)),
        )
        .with_child(Element::new("MetaFields").with_children(record.fields.iter().map(meta_field)))
}

fn seo_info(records: &[SeoRecord]) -> Element {
    let optional = |name: &str, value: &Option<String>| {
        value.as_ref().map(|v| Element::text_element(name, v))
    };

    Element::new("SeoInfo").with_children(records.iter().map(|seo| {
        Element::new("Seo")
            .with_child(Element::text_element("LanguageCode", &seo.language))
            .with_children(
                [
                    optional("Uri", &seo.uri),
                    optional("Title", &seo.title),
                    optional("Description", &seo.description),
                    optional("Keywords", &seo.keywords),
                    optional("UriSegment", &seo.uri_segment),
                ]
                .into_iter()
                .flatten(),
            )
    }))
}

fn node(record: &NodeRecord) -> Element {
    Element::new("Node")
        .with_child(Element::text_element("Name", &record.name))
        .with_child(Element::text_element("StartDate", &record.start_date))
        .with_child(Element::text_element("EndDate", &record.end_date))
        .with_child(Element::text_element("IsActive", "True"))
        .with_child(Element::text_element("SortOrder", record.sort_order))
        .with_child(Element::new("DisplayTemplate"))
        .with_child(Element::text_element("Guid", &record.guid))
        .with_child(Element::text_element("Code", &record.code))
        .with_child(meta_data(&record.meta))
        .with_child(Element::text_element("ParentNode", &record.parent_code))
        .with_child(seo_info(&record.seo))
}

pub fn entry(record: &EntryRecord) -> Element {
    Element::new("Entry")
        .with_child(Element::text_element("Name", &record.name))
        .with_child(Element::text_element("StartDate", &record.start_date))
        .with_child(Element::text_element("EndDate", &record.end_date))
        .with_child(Element::text_element("IsActive", "True"))
        .with_child(Element::new("DisplayTemplate"))
        .with_child(Element::text_element("Code", &record.code))
        .with_child(Element::text_element("EntryType", &record.entry_type))
        .with_child(Element::text_element("Guid", &record.guid))
        .with_child(meta_data(&record.meta))
        .with_child(seo_info(&record.seo))
}

fn relation(record: &RelationRecord) -> Element {
    match record {
        RelationRecord::NodeEntry {
            node_code,
            entry_code,
            sort_order,
        } => Element::new("NodeEntryRelation")
            .with_child(Element::text_element("EntryCode", entry_code))
            .with_child(Element::text_element("NodeCode", node_code))
            .with_child(Element::text_element("SortOrder", sort_order)),
        RelationRecord::Node {
            parent_code,
            child_code,
            sort_order,
        } => Element::new("NodeRelation")
            .with_child(Element::text_element("ChildNodeCode", child_code))
            .with_child(Element::text_element("ParentNodeCode", parent_code))
            .with_child(Element::text_element("SortOrder", sort_order)),
        RelationRecord::Entry {
            parent_code,
            child_code,
            relation_type,
            sort_order,
        } => Element::new("EntryRelation")
            .with_child(Element::text_element("ParentEntryCode", parent_code))
            .with_child(Element::text_element("ChildEntryCode", child_code))
            .with_child(Element::text_element("RelationType", relation_type.as_str()))
            .with_child(Element::text_element("Quantity", 0))
            .with_child(Element::text_element("GroupName", "default"))
            .with_child(Element::text_element("SortOrder", sort_order)),
    }
}

fn association(record: &AssociationRecord) -> Element {
    Element::new("CatalogAssociation")
        .with_child(Element::text_element("Name", &record.name))
        .with_child(Element::text_element("Description", &record.description))
        .with_child(Element::text_element("SortOrder", record.sort_order))
        .with_child(Element::text_element("EntryCode", &record.entry_code))
        .with_child(
            Element::new("Association")
                .with_child(Element::text_element("EntryCode", &record.associated_code))
                .with_child(Element::text_element("SortOrder", record.sort_order))
                .with_child(Element::text_element("Type", &record.association_type)),
        )
}

fn association_type(record: &AssociationTypeRecord) -> Element {
    Element::new("AssociationType")
        .with_child(Element::text_element("TypeId", &record.type_id))
        .with_child(Element::text_element("Description", &record.description))
}

fn meta_class(record: &MetaClassRecord) -> Element {
    Element::new("MetaClass")
        .with_child(Element::text_element("Namespace", USER_NAMESPACE))
        .with_child(Element::text_element("Name", &record.name))
        .with_child(Element::text_element("FriendlyName", &record.name))
        .with_child(Element::text_element("MetaClassType", "User"))
        .with_child(Element::text_element("ParentClass", &record.parent_class))
        .with_child(Element::text_element("TableName", &record.table_name))
        .with_child(Element::text_element("Description", SCHEMA_DESCRIPTION))
        .with_child(Element::text_element("IsSystem", "False"))
        .with_child(Element::text_element("IsAbstract", "False"))
        .with_child(Element::new("FieldListChangedSqlScript"))
        .with_child(Element::new("Tag"))
        .with_child(Element::new("Attributes"))
}

fn meta_field_definition(record: &MetaFieldDefinition) -> Element {
    Element::new("MetaField")
        .with_child(Element::text_element("Namespace", CATALOG_NAMESPACE))
        .with_child(Element::text_element("Name", &record.name))
        .with_child(Element::text_element("FriendlyName", &record.name))
        .with_child(Element::text_element("Description", SCHEMA_DESCRIPTION))
        .with_child(Element::text_element("DataType", &record.data_type))
        .with_child(Element::text_element("Length", record.length))
        .with_child(Element::text_element("AllowNulls", bool_text(record.allow_nulls)))
        .with_child(Element::text_element("SaveHistory", "False"))
        .with_child(Element::text_element("AllowSearch", bool_text(record.allow_search)))
        .with_child(Element::text_element(
            "MultiLanguageValue",
            bool_text(record.multi_language),
        ))
        .with_child(Element::text_element("IsSystem", "False"))
        .with_child(Element::new("Tag"))
        .with_child(
            Element::new("Attributes").with_child(
                Element::new("Attribute")
                    .with_child(Element::text_element("Key", "useincomparing"))
                    .with_child(Element::text_element(
                        "Value",
                        bool_text(record.use_in_comparing),
                    )),
            ),
        )
        .with_children(
            record
                .owners
                .iter()
                .map(|owner| Element::text_element("OwnerMetaClass", owner)),
        )
}

fn schema(records: &SchemaRecords) -> Element {
    Element::new("MetaDataScheme").with_child(
        Element::new("MetaDataPlusBackup")
            .with_attr("version", "1.0")
            .with_children(records.meta_classes.iter().map(meta_class))
            .with_children(records.meta_fields.iter().map(meta_field_definition)),
    )
}

fn catalog_root(header: &CatalogHeader) -> Element {
    Element::new("Catalog")
        .with_attr("name", &header.name)
        .with_attr("lastmodified", &header.last_modified)
        .with_attr("startDate", &header.start_date)
        .with_attr("endDate", &header.end_date)
        .with_attr("defaultCurrency", &header.default_currency)
        .with_attr("weightBase", &header.weight_base)
        .with_attr("defaultLanguage", &header.default_language)
        .with_attr("sortOrder", 0)
        .with_attr("isActive", "True")
        .with_attr("languages", &header.languages)
}

/// Full catalog document. The schema and association types are only
/// written when present.
pub fn catalog(records: &CatalogRecords) -> Element {
    let mut root = catalog_root(&records.header);

    if let Some(schema_records) = &records.schema {
        root.push(schema(schema_records));
    }
    root.push(Element::new("Nodes").with_children(records.nodes.iter().map(node)));
    root.push(Element::new("Entries").with_children(records.entries.iter().map(entry)));
    root.push(Element::new("Relations").with_children(records.relations.iter().map(relation)));
    root.push(
        Element::new("Associations").with_children(records.associations.iter().map(association)),
    );
    if let Some(types) = &records.association_types {
        root.push(Element::new("AssociationTypes").with_children(types.iter().map(association_type)));
    }

    root
}
