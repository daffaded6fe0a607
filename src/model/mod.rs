//! Data model of the source graph.

pub mod entity;
pub mod schema;
pub mod structure;

pub use entity::{
    Entity, EntityKind, EntityRef, Field, FieldRevision, FieldValue, Link, LocaleString,
};
pub use schema::{
    classify_link, CatalogModel, Cvl, CvlText, CvlValue, DataType, EntityType, FieldSet,
    FieldType, LinkRole, LinkType,
};
pub use structure::{child_path, parse_path, StructureEntity, PATH_SEPARATOR};
