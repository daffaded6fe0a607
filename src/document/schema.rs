//! Meta class and meta field definitions sent with full exports.

use indexmap::IndexMap;

use super::mapping::{
    downstream_data_type, meta_field_length, DISPLAY_DESCRIPTION, DISPLAY_NAME,
    SPECIFICATION_FIELD,
};
use super::records::{
    AssociationTypeRecord, MetaClassRecord, MetaFieldDefinition, SchemaRecords,
};
use crate::config::ConnectorConfig;
use crate::model::{CatalogModel, EntityKind, EntityType, FieldType};

fn meta_class(name: &str, entity_type: &EntityType) -> MetaClassRecord {
    let (parent_class, table_prefix) = match entity_type.kind {
        EntityKind::ChannelNode => ("CatalogNode", "CatalogNodeEx"),
        _ => ("CatalogEntry", "CatalogEntryEx"),
    };
    MetaClassRecord {
        name: name.to_string(),
        parent_class: parent_class.to_string(),
        table_name: format!("{}_{}", table_prefix, name),
    }
}

fn field_definition(field_type: &FieldType) -> MetaFieldDefinition {
    MetaFieldDefinition {
        name: field_type.id.clone(),
        data_type: downstream_data_type(field_type.data_type).to_string(),
        length: meta_field_length(field_type.data_type),
        allow_nulls: !field_type.mandatory,
        allow_search: field_type.allow_search(),
        multi_language: field_type.is_multi_language(),
        use_in_comparing: field_type.use_in_comparing(),
        owners: vec![field_type.entity_type_id.clone()],
    }
}

fn display_definition(name: &str) -> MetaFieldDefinition {
    MetaFieldDefinition {
        name: name.to_string(),
        data_type: "LongString".to_string(),
        length: 150,
        allow_nulls: true,
        allow_search: true,
        multi_language: true,
        use_in_comparing: true,
        owners: Vec::new(),
    }
}

/// Meta classes per exported entity type and field set, followed by meta
/// field definitions with their owning classes.
pub fn schema_records(config: &ConnectorConfig, model: &CatalogModel) -> SchemaRecords {
    let mut meta_classes = Vec::new();
    let mut meta_fields: Vec<MetaFieldDefinition> = Vec::new();

    let mut display_name = display_definition(DISPLAY_NAME);
    let mut display_description = display_definition(DISPLAY_DESCRIPTION);
    let mut specification = MetaFieldDefinition {
        name: SPECIFICATION_FIELD.to_string(),
        data_type: "LongHtmlString".to_string(),
        length: 65000,
        use_in_comparing: false,
        ..display_definition(SPECIFICATION_FIELD)
    };
    let mut has_specification = false;

    let exported = model
        .entity_types
        .iter()
        .filter(|et| config.is_export_enabled(et.kind) && !et.is_link_entity_type);

    for entity_type in exported {
        let set_names: Vec<String> = entity_type
            .field_sets
            .iter()
            .map(|fs| format!("{}_{}", entity_type.id, fs.id))
            .collect();

        let links_specification = model.link_types.iter().any(|lt| {
            lt.source_kind == entity_type.kind && lt.target_kind == EntityKind::Specification
        });
        if links_specification && entity_type.kind != EntityKind::Specification {
            specification.add_owner(&entity_type.id);
            for name in &set_names {
                specification.add_owner(name);
            }
            has_specification = true;
        }

        meta_classes.push(meta_class(&entity_type.id, entity_type));

        let mut set_owners: IndexMap<&str, Vec<&str>> = IndexMap::new();
        for (field_set, name) in entity_type.field_sets.iter().zip(&set_names) {
            meta_classes.push(meta_class(name, entity_type));
            for field_type_id in &field_set.field_types {
                set_owners
                    .entry(field_type_id.as_str())
                    .or_default()
                    .push(name.as_str());
            }
            display_name.add_owner(name);
            display_description.add_owner(name);
        }
        display_name.add_owner(&entity_type.id);
        display_description.add_owner(&entity_type.id);

        for field_type in entity_type
            .field_types
            .iter()
            .filter(|ft| !config.skip_field(&ft.id))
        {
            let mut definition = field_definition(field_type);
            match set_owners.get(field_type.id.as_str()) {
                Some(owners) => owners.iter().for_each(|o| definition.add_owner(*o)),
                None => set_names.iter().for_each(|n| definition.add_owner(n)),
            }

            match meta_fields.iter_mut().find(|mf| mf.name == definition.name) {
                Some(existing) => {
                    for owner in definition.owners {
                        existing.add_owner(owner);
                    }
                }
                None => meta_fields.push(definition),
            }
        }
    }

    meta_fields.push(display_name);
    meta_fields.push(display_description);
    if has_specification {
        meta_fields.push(specification);
    }

    SchemaRecords {
        meta_classes,
        meta_fields,
    }
}

/// Association types for every entry-to-entry link type that is not
/// hierarchical.
pub fn association_types(model: &CatalogModel) -> Vec<AssociationTypeRecord> {
    model
        .association_types()
        .map(|lt| AssociationTypeRecord {
            type_id: lt.id.clone(),
            description: lt.id.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataType, FieldSet, LinkType};

    fn model() -> CatalogModel {
        let product = EntityType {
            id: "Product".into(),
            kind: EntityKind::Product,
            field_types: vec![
                FieldType::new("ProductName", "Product", DataType::LocaleString),
                FieldType::new("ProductFabric", "Product", DataType::String),
                FieldType::new("ProductInternalNote", "Product", DataType::String),
            ],
            field_sets: vec![
                FieldSet {
                    id: "Apparel".into(),
                    field_types: vec!["ProductFabric".into()],
                },
                FieldSet {
                    id: "Gear".into(),
                    field_types: vec![],
                },
            ],
            is_link_entity_type: false,
        };
        let link_entity = EntityType {
            id: "Placement".into(),
            kind: EntityKind::Product,
            field_types: vec![],
            field_sets: vec![],
            is_link_entity_type: true,
        };

        CatalogModel {
            entity_types: vec![product, link_entity],
            link_types: vec![
                LinkType {
                    id: "ProductSpecification".into(),
                    source_kind: EntityKind::Product,
                    target_kind: EntityKind::Specification,
                    index: 0,
                },
                LinkType {
                    id: "ProductAccessory".into(),
                    source_kind: EntityKind::Product,
                    target_kind: EntityKind::Product,
                    index: 1,
                },
                LinkType {
                    id: "ProductItem".into(),
                    source_kind: EntityKind::Product,
                    target_kind: EntityKind::Item,
                    index: 2,
                },
            ],
            ..CatalogModel::default()
        }
    }

    #[test]
    fn builds_meta_classes_and_owned_fields() {
        let config = ConnectorConfig {
            skip_fields: vec!["ProductInternalNote".into()],
            ..ConnectorConfig::default()
        };
        let schema = schema_records(&config, &model());

        let classes: Vec<&str> = schema.meta_classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(classes, vec!["Product", "Product_Apparel", "Product_Gear"]);
        assert_eq!(schema.meta_classes[1].table_name, "CatalogEntryEx_Product_Apparel");

        let field = |name: &str| schema.meta_fields.iter().find(|f| f.name == name);
        assert_eq!(
            field("ProductFabric").unwrap().owners,
            vec!["Product", "Product_Apparel"]
        );
        assert_eq!(
            field("ProductName").unwrap().owners,
            vec!["Product", "Product_Apparel", "Product_Gear"]
        );
        assert!(field("ProductInternalNote").is_none());
        assert!(field("ProductName").unwrap().multi_language);

        let spec = field(SPECIFICATION_FIELD).unwrap();
        assert_eq!(spec.data_type, "LongHtmlString");
        assert!(spec.owners.contains(&"Product_Gear".to_string()));
        assert_eq!(
            field(DISPLAY_NAME).unwrap().owners,
            vec!["Product_Apparel", "Product_Gear", "Product"]
        );
    }

    #[test]
    fn association_types_come_from_entry_links() {
        let types = association_types(&model());
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].type_id, "ProductAccessory");
    }
}
