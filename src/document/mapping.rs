//! Entity and field policy to intermediate records.

use chrono::{DateTime, Months, SecondsFormat, Utc};

use super::records::{
    DataRecord, EntryRecord, MetaDataRecord, MetaFieldRecord, NodeRecord, SeoRecord,
    SpecificationTexts,
};
use crate::codes::{channel_entity_guid, CodeGenerator};
use crate::config::{ConnectorConfig, CvlDataMode, CVL_KEY_DELIMITER};
use crate::model::{
    CatalogModel, Cvl, CvlText, DataType, Entity, EntityKind, Field, FieldType, FieldValue,
};
use crate::sku::{parse_skus, SkuRecord};

/// Longest name written for a node, entry or catalog.
pub const NAME_MAX_LENGTH: usize = 100;

pub const DISPLAY_NAME: &str = "DisplayName";
pub const DISPLAY_DESCRIPTION: &str = "DisplayDescription";
pub const SPECIFICATION_FIELD: &str = "SpecificationField";

const SEO_URI: &str = "SeoUri";
const SEO_TITLE: &str = "SeoTitle";
const SEO_DESCRIPTION: &str = "SeoDescription";
const SEO_KEYWORDS: &str = "SeoKeywords";
const SEO_URI_SEGMENT: &str = "SeoUriSegment";

/// Downstream meta data type for a source data type.
pub fn downstream_data_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::String | DataType::LocaleString => "LongHtmlString",
        DataType::Cvl | DataType::Xml => "LongString",
        DataType::Integer | DataType::File => "Integer",
        DataType::Double => "Decimal",
        DataType::Boolean => "Boolean",
        DataType::DateTime => "DateTime",
    }
}

/// Storage length declared for a meta field.
pub fn meta_field_length(data_type: DataType) -> u32 {
    match data_type {
        DataType::Boolean => 1,
        DataType::Integer | DataType::File => 4,
        DataType::DateTime => 8,
        DataType::Double => 17,
        DataType::Cvl => 255,
        DataType::String | DataType::LocaleString | DataType::Xml => 65000,
    }
}

/// Catalog entry type for an entry kind.
pub fn entry_type(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Item => "Variation",
        EntityKind::Bundle => "Bundle",
        EntityKind::Package => "Package",
        EntityKind::Product
        | EntityKind::Channel
        | EntityKind::ChannelNode
        | EntityKind::Resource
        | EntityKind::Specification => "Product",
    }
}

pub fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn data_type_of_value(value: Option<&FieldValue>) -> DataType {
    match value {
        Some(FieldValue::Integer(_)) => DataType::Integer,
        Some(FieldValue::Double(_)) => DataType::Double,
        Some(FieldValue::Boolean(_)) => DataType::Boolean,
        Some(FieldValue::DateTime(_)) => DataType::DateTime,
        Some(FieldValue::Locale(_)) => DataType::LocaleString,
        Some(FieldValue::Cvl(_)) => DataType::Cvl,
        Some(FieldValue::Text(_)) | None => DataType::String,
    }
}

/// Applies field policy, language mapping and code generation to entities.
pub struct CatalogMapper<'a> {
    config: &'a ConnectorConfig,
    model: &'a CatalogModel,
    codes: &'a CodeGenerator,
}

impl<'a> CatalogMapper<'a> {
    pub fn new(config: &'a ConnectorConfig, model: &'a CatalogModel, codes: &'a CodeGenerator) -> Self {
        Self {
            config,
            model,
            codes,
        }
    }

    pub fn codes(&self) -> &CodeGenerator {
        self.codes
    }

    fn default_language(&self) -> String {
        self.config.default_catalog_language()
    }

    /// Value of a field in one source culture; non-localized values ignore
    /// the culture.
    fn culture_value(value: &FieldValue, culture: &str) -> String {
        match value {
            FieldValue::Locale(ls) => ls.get(culture).unwrap_or_default().to_string(),
            other => other.flat(),
        }
    }

    /// Display name in the default culture, truncated, or `[id]`.
    pub fn entity_name(&self, entity: &Entity) -> String {
        let culture = self.config.default_pim_culture();
        entity
            .display_name
            .as_ref()
            .and_then(|f| f.value.as_ref())
            .map(|v| Self::culture_value(v, culture))
            .filter(|name| !name.is_empty())
            .map(|name| name.chars().take(NAME_MAX_LENGTH).collect())
            .unwrap_or_else(|| format!("[{}]", entity.id))
    }

    fn date_field(&self, entity: &Entity, suffix: &str) -> Option<DateTime<Utc>> {
        let prefixed = format!("{}{}", entity.entity_type_id, suffix);
        [suffix, prefixed.as_str()]
            .iter()
            .find_map(|name| entity.field_ignore_case(name))
            .and_then(|f| f.value.as_ref())
            .and_then(|v| match v {
                FieldValue::DateTime(dt) => Some(*dt),
                FieldValue::Text(s) => DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|d| d.with_timezone(&Utc)),
                _ => None,
            })
    }

    /// `StartDate` field, else the creation time.
    pub fn start_date(&self, entity: &Entity) -> DateTime<Utc> {
        self.date_field(entity, "StartDate").unwrap_or(entity.created)
    }

    /// `EndDate` field, else one hundred years after the start date.
    pub fn end_date(&self, entity: &Entity) -> DateTime<Utc> {
        self.date_field(entity, "EndDate").unwrap_or_else(|| {
            let start = self.start_date(entity);
            start.checked_add_months(Months::new(1200)).unwrap_or(start)
        })
    }

    /// Meta class of an entity: `{type}_{fieldset}` when its field set is
    /// known, else the entity type id.
    pub fn meta_class_for(&self, entity: &Entity) -> String {
        let known_set = entity.field_set_id.as_deref().filter(|fs| {
            self.model
                .entity_type(&entity.entity_type_id)
                .and_then(|et| et.field_set(fs))
                .is_some()
        });
        match known_set {
            Some(fs) => format!("{}_{}", entity.entity_type_id, fs),
            None => entity.entity_type_id.clone(),
        }
    }

    fn field_type(&self, entity: &Entity, field: &Field) -> Option<&'a FieldType> {
        self.model
            .field_type(&entity.entity_type_id, &field.field_type_id)
    }

    fn data_type(&self, entity: &Entity, field: &Field) -> DataType {
        self.field_type(entity, field)
            .map(|ft| ft.data_type)
            .unwrap_or_else(|| data_type_of_value(field.value.as_ref()))
    }

    /// Whether a field belongs on the entity's rendered view.
    ///
    /// Fields excluded from the default view only appear when the entity's
    /// own field set holds them, or when no other field set claims them.
    pub fn use_field(&self, entity: &Entity, field: &Field) -> bool {
        let Some(field_type) = self.field_type(entity, field) else {
            return true;
        };
        if !field_type.exclude_from_default_view {
            return true;
        }
        let Some(entity_type) = self.model.entity_type(&entity.entity_type_id) else {
            return true;
        };

        let selected = entity.field_set_id.as_deref();
        let mut others = entity_type
            .field_sets
            .iter()
            .filter(|fs| Some(fs.id.as_str()) != selected)
            .peekable();
        if others.peek().is_none() {
            return true;
        }

        if let Some(own) = selected.and_then(|id| entity_type.field_set(id)) {
            if own.contains(&field.field_type_id) {
                return true;
            }
        }

        others.all(|fs| !fs.contains(&field.field_type_id))
    }

    /// Render one field value.
    pub fn meta_field_value(&self, entity: &Entity, field: &Field) -> MetaFieldRecord {
        let data_type = self.data_type(entity, field);
        let data = match data_type {
            DataType::LocaleString => self
                .config
                .language_mapping
                .iter()
                .map(|m| {
                    let value = field
                        .value
                        .as_ref()
                        .filter(|v| !v.is_empty())
                        .map(|v| Self::culture_value(v, &m.pim))
                        .unwrap_or_default();
                    DataRecord::value(m.catalog.to_lowercase(), value)
                })
                .collect(),
            DataType::Cvl => self.cvl_data(self.field_type(entity, field), field.value.as_ref()),
            _ => vec![DataRecord::value(
                self.default_language(),
                field.value.as_ref().map(FieldValue::flat).unwrap_or_default(),
            )],
        };

        MetaFieldRecord {
            name: field.field_type_id.clone(),
            data_type: downstream_data_type(data_type).to_string(),
            data,
        }
    }

    fn cvl_data(&self, field_type: Option<&FieldType>, value: Option<&FieldValue>) -> Vec<DataRecord> {
        let keys: Vec<String> = match value {
            Some(FieldValue::Cvl(keys)) => keys.clone(),
            Some(v) if !v.is_empty() => v.flat().split(';').map(str::to_string).collect(),
            _ => Vec::new(),
        };
        let cvl = field_type
            .and_then(|ft| ft.cvl_id.as_deref())
            .and_then(|id| self.model.cvl(id));

        match cvl {
            Some(cvl) if cvl.is_localized() && self.config.cvl_data_mode != CvlDataMode::Keys => self
                .config
                .language_mapping
                .iter()
                .map(|m| {
                    let items = keys
                        .iter()
                        .map(|k| self.cvl_item(Some(cvl), k, Some(m.pim.as_str())))
                        .collect();
                    DataRecord::items(m.catalog.to_lowercase(), items)
                })
                .collect(),
            _ => {
                let items = keys.iter().map(|k| self.cvl_item(cvl, k, None)).collect();
                vec![DataRecord::items(self.default_language(), items)]
            }
        }
    }

    fn cvl_item(&self, cvl: Option<&Cvl>, key: &str, culture: Option<&str>) -> String {
        let text = cvl
            .and_then(|c| c.value(key))
            .map(|v| match &v.value {
                CvlText::Plain(s) => s.clone(),
                CvlText::Localized(ls) => culture
                    .and_then(|c| ls.get(c))
                    .or_else(|| ls.0.values().next().map(String::as_str))
                    .unwrap_or_default()
                    .to_string(),
            })
            .unwrap_or_else(|| key.to_string());

        match self.config.cvl_data_mode {
            CvlDataMode::Keys => key.to_string(),
            CvlDataMode::Values => text,
            CvlDataMode::KeysAndValues => format!("{}{}{}", key, CVL_KEY_DELIMITER, text),
        }
    }

    fn display_field(&self, entity: &Entity, field: Option<&Field>, name: &str) -> MetaFieldRecord {
        match field.filter(|f| !f.is_empty()) {
            Some(field) => MetaFieldRecord {
                name: name.to_string(),
                data_type: "LongHtmlString".to_string(),
                ..self.meta_field_value(entity, field)
            },
            None => MetaFieldRecord {
                name: name.to_string(),
                data_type: "LongHtmlString".to_string(),
                data: vec![DataRecord::value(self.default_language(), "")],
            },
        }
    }

    fn seo_value(entity: &Entity, suffix: &str, culture: &str) -> Option<String> {
        let name = format!("{}{}", entity.entity_type_id, suffix);
        entity
            .field_ignore_case(&name)
            .and_then(|f| f.value.as_ref())
            .map(|v| Self::culture_value(v, culture))
            .filter(|s| !s.is_empty())
    }

    /// SEO values per catalog language, skipping languages without any.
    pub fn seo(&self, entity: &Entity) -> Vec<SeoRecord> {
        self.config
            .language_mapping
            .iter()
            .map(|m| SeoRecord {
                language: m.catalog.to_lowercase(),
                uri: Self::seo_value(entity, SEO_URI, &m.pim),
                title: Self::seo_value(entity, SEO_TITLE, &m.pim),
                description: Self::seo_value(entity, SEO_DESCRIPTION, &m.pim),
                keywords: Self::seo_value(entity, SEO_KEYWORDS, &m.pim),
                uri_segment: Self::seo_value(entity, SEO_URI_SEGMENT, &m.pim),
            })
            .filter(|seo| !seo.is_empty())
            .collect()
    }

    fn meta_data(&self, entity: &Entity, fields: impl Iterator<Item = MetaFieldRecord>) -> MetaDataRecord {
        let mut rendered = vec![
            self.display_field(entity, entity.display_name.as_ref(), DISPLAY_NAME),
            self.display_field(entity, entity.display_description.as_ref(), DISPLAY_DESCRIPTION),
        ];
        rendered.extend(fields);
        MetaDataRecord {
            meta_class: self.meta_class_for(entity),
            fields: rendered,
        }
    }

    /// Node record. Empty and skipped fields are left out.
    pub fn node_record(&self, entity: &Entity, parent_code: String, sort_order: i32) -> NodeRecord {
        let fields = entity
            .fields
            .iter()
            .filter(|f| !f.is_empty() && !self.config.skip_field(&f.field_type_id))
            .map(|f| self.meta_field_value(entity, f));

        NodeRecord {
            entity_id: entity.id,
            name: self.entity_name(entity),
            start_date: format_date(self.start_date(entity)),
            end_date: format_date(self.end_date(entity)),
            sort_order,
            guid: channel_entity_guid(self.config.channel_id, entity.id).to_string(),
            code: self.codes.entity_code(entity.id),
            meta: self.meta_data(entity, fields),
            parent_code,
            seo: self.seo(entity),
        }
    }

    /// Entry record. Empty fields are kept; field policy decides the rest.
    pub fn entry_record(&self, entity: &Entity) -> EntryRecord {
        let fields = entity
            .fields
            .iter()
            .filter(|f| self.use_field(entity, f) && !self.config.skip_field(&f.field_type_id))
            .map(|f| self.meta_field_value(entity, f));

        EntryRecord {
            entity_id: entity.id,
            name: self.entity_name(entity),
            start_date: format_date(self.start_date(entity)),
            end_date: format_date(self.end_date(entity)),
            code: self.codes.entity_code(entity.id),
            entry_type: entry_type(entity.kind).to_string(),
            guid: channel_entity_guid(self.config.channel_id, entity.id).to_string(),
            meta: self.meta_data(entity, fields),
            seo: self.seo(entity),
        }
    }

    /// Embedded SKUs of an item that explodes into variations.
    pub fn exploded_skus(&self, entity: &Entity) -> Vec<SkuRecord> {
        if !self.config.items_to_skus || entity.kind != EntityKind::Item {
            return Vec::new();
        }
        entity
            .value(&self.config.sku_field)
            .map(|v| parse_skus(&v.flat(), &self.config.sku_data_element))
            .unwrap_or_default()
    }

    /// One variation entry per embedded SKU, cloned from the item's entry.
    pub fn sku_entries(&self, item: &Entity, specifications: &SpecificationTexts) -> Vec<EntryRecord> {
        let skus = self.exploded_skus(item);
        if skus.is_empty() {
            return Vec::new();
        }

        let base = self.entry_record(item);
        let specification = item.outbound_to(EntityKind::Specification).map(|_| MetaFieldRecord {
            name: SPECIFICATION_FIELD.to_string(),
            data_type: "LongHtmlString".to_string(),
            data: self
                .config
                .language_mapping
                .iter()
                .map(|m| {
                    DataRecord::value(
                        m.catalog.to_lowercase(),
                        specifications.get(item.id, &m.pim).unwrap_or_default(),
                    )
                })
                .collect(),
        });

        skus.into_iter()
            .map(|sku| {
                let mut entry = base.clone();
                entry.code = self.codes.sku_code(&sku.id);
                entry.entry_type = "Variation".to_string();
                match sku.name {
                    Some(name) if !name.is_empty() => entry.name = name,
                    Some(_) => entry.name = sku.id.clone(),
                    None => {}
                }
                for (name, value) in sku.data {
                    entry.meta.fields.push(MetaFieldRecord {
                        name,
                        data_type: "ShortString".to_string(),
                        data: vec![DataRecord::value(self.default_language(), value)],
                    });
                }
                if let Some(spec) = &specification {
                    entry.meta.fields.push(spec.clone());
                }
                entry
            })
            .collect()
    }

    /// Codes that stand in for an entity in catalog relations.
    pub fn relation_codes(&self, entity: &Entity) -> Vec<String> {
        let skus = self.exploded_skus(entity);
        if skus.is_empty() || self.config.use_three_levels_in_commerce {
            return vec![self.codes.entity_code(entity.id)];
        }
        skus.iter().map(|s| self.codes.sku_code(&s.id)).collect()
    }

    /// Codes a resource attached to `entity` is associated with.
    pub fn resource_parent_codes(&self, entity: &Entity) -> Vec<String> {
        let skus = self.exploded_skus(entity);
        if skus.is_empty() {
            return vec![self.codes.entity_code(entity.id)];
        }

        let mut codes = Vec::new();
        if self.config.use_three_levels_in_commerce {
            codes.push(self.codes.entity_code(entity.id));
        }
        codes.extend(skus.iter().map(|s| self.codes.sku_code(&s.id)));
        codes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LanguageMapping;
    use crate::model::{EntityType, FieldSet, LocaleString};
    use chrono::TimeZone;

    fn model() -> CatalogModel {
        let mut description = FieldType::new("ItemDescription", "Item", DataType::LocaleString);
        description.exclude_from_default_view = true;
        let mut shoe_size = FieldType::new("ItemShoeSize", "Item", DataType::String);
        shoe_size.exclude_from_default_view = true;

        CatalogModel {
            entity_types: vec![EntityType {
                id: "Item".into(),
                kind: EntityKind::Item,
                field_types: vec![
                    FieldType::new("ItemName", "Item", DataType::String),
                    description,
                    shoe_size,
                    FieldType::new("SKUs", "Item", DataType::Xml),
                ],
                field_sets: vec![
                    FieldSet {
                        id: "Shoes".into(),
                        field_types: vec!["ItemShoeSize".into()],
                    },
                    FieldSet {
                        id: "Shirts".into(),
                        field_types: vec![],
                    },
                ],
                is_link_entity_type: false,
            }],
            ..CatalogModel::default()
        }
    }

    fn config() -> ConnectorConfig {
        ConnectorConfig {
            channel_id: 1,
            items_to_skus: true,
            language_mapping: vec![
                LanguageMapping {
                    catalog: "en".into(),
                    pim: "en-GB".into(),
                },
                LanguageMapping {
                    catalog: "NB".into(),
                    pim: "nb-NO".into(),
                },
            ],
            ..ConnectorConfig::default()
        }
    }

    fn item(field_set: Option<&str>) -> Entity {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Entity {
            id: 1000,
            kind: EntityKind::Item,
            entity_type_id: "Item".into(),
            field_set_id: field_set.map(str::to_string),
            fields: vec![
                Field::new("ItemName", FieldValue::Text("Runner".into())),
                Field::new(
                    "ItemDescription",
                    FieldValue::Locale(LocaleString::default().with("en-GB", "Fast")),
                ),
                Field::new("ItemShoeSize", FieldValue::Text("42".into())),
                Field::new(
                    "SKUs",
                    FieldValue::Text(
                        r#"<SKUs><SKU id="A"><Name>Red</Name><SkuData><Color>red</Color></SkuData></SKU><SKU id="B"><Name/></SKU></SKUs>"#
                            .into(),
                    ),
                ),
            ],
            display_name: Some(Field::new(
                "ItemName",
                FieldValue::Text("x".repeat(150)),
            )),
            display_description: None,
            main_picture_file_id: None,
            created,
            last_modified: created,
            outbound_links: vec![],
            inbound_links: vec![],
        }
    }

    #[test]
    fn excluded_field_renders_only_under_owning_field_set() {
        let model = model();
        let config = config();
        let codes = CodeGenerator::from_config(&config);
        let mapper = CatalogMapper::new(&config, &model, &codes);

        let names = |entity: &Entity| -> Vec<String> {
            mapper
                .entry_record(entity)
                .meta
                .fields
                .into_iter()
                .map(|f| f.name)
                .collect()
        };

        let shoes = item(Some("Shoes"));
        let shirts = item(Some("Shirts"));
        assert!(names(&shoes).contains(&"ItemShoeSize".to_string()));
        assert!(!names(&shirts).contains(&"ItemShoeSize".to_string()));
        // not claimed by any field set, so it stays on every view
        assert!(names(&shirts).contains(&"ItemDescription".to_string()));

        assert_eq!(mapper.meta_class_for(&shoes), "Item_Shoes");
        assert_eq!(mapper.meta_class_for(&item(Some("Unknown"))), "Item");
    }

    #[test]
    fn localized_fields_render_every_language_with_empty_fallback() {
        let model = model();
        let config = config();
        let codes = CodeGenerator::from_config(&config);
        let mapper = CatalogMapper::new(&config, &model, &codes);
        let entity = item(None);

        let field = mapper.meta_field_value(&entity, entity.field("ItemDescription").unwrap());
        assert_eq!(field.data_type, "LongHtmlString");
        assert_eq!(
            field.data,
            vec![DataRecord::value("en", "Fast"), DataRecord::value("nb", "")]
        );
    }

    #[test]
    fn names_are_truncated_and_dates_default_from_creation() {
        let model = model();
        let config = config();
        let codes = CodeGenerator::from_config(&config);
        let mapper = CatalogMapper::new(&config, &model, &codes);
        let mut entity = item(None);

        assert_eq!(mapper.entity_name(&entity).chars().count(), NAME_MAX_LENGTH);
        assert_eq!(format_date(mapper.start_date(&entity)), "2024-01-01T00:00:00Z");
        assert_eq!(format_date(mapper.end_date(&entity)), "2124-01-01T00:00:00Z");

        entity.display_name = None;
        assert_eq!(mapper.entity_name(&entity), "[1000]");
    }

    #[test]
    fn skus_explode_into_variations() {
        let model = model();
        let config = config();
        let codes = CodeGenerator::from_config(&config);
        let mapper = CatalogMapper::new(&config, &model, &codes);
        let entity = item(None);

        let entries = mapper.sku_entries(&entity, &SpecificationTexts::default());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].code, "SKU-A");
        assert_eq!(entries[0].name, "Red");
        assert_eq!(entries[0].entry_type, "Variation");
        assert!(entries[0]
            .meta
            .fields
            .iter()
            .any(|f| f.name == "Color" && f.data_type == "ShortString"));
        // empty Name element falls back to the SKU id
        assert_eq!(entries[1].name, "B");

        assert_eq!(mapper.relation_codes(&entity), vec!["SKU-A", "SKU-B"]);
        assert_eq!(mapper.resource_parent_codes(&entity), vec!["SKU-A", "SKU-B"]);
    }
}
