//! Collaborator contracts towards the source graph and its binary store.
//!
//! Both traits are synchronous and return `anyhow::Result`; the engine wraps
//! failures into [`crate::types::SyncError`] at the call site.

pub mod files;
pub mod memory;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::model::{CatalogModel, Entity, EntityKind, FieldRevision, StructureEntity};
use crate::types::EntityId;

pub use files::DirectoryBinaryStore;
pub use memory::{FieldHistory, MemoryGraph, SpecificationText};

/// How much of an entity to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadLevel {
    /// Identity, type and display fields only.
    Shallow,
    /// All fields, no links.
    DataOnly,
    /// All fields plus inbound and outbound links.
    DataAndLinks,
}

/// Read access to the source graph.
pub trait GraphService: Send + Sync {
    /// Source model (entity types, field types, link types, CVLs).
    fn model(&self) -> Result<CatalogModel>;

    /// Every structural position in the channel whose kind is enabled, in
    /// tree order.
    fn full_structure(
        &self,
        channel_id: EntityId,
        enabled: &[EntityKind],
    ) -> Result<Vec<StructureEntity>>;

    /// All positions of one entity in the channel.
    fn structure_for_entity(
        &self,
        channel_id: EntityId,
        entity_id: EntityId,
    ) -> Result<Vec<StructureEntity>>;

    /// Positions of an entity reached directly from the given parent.
    fn structure_for_entity_with_parent(
        &self,
        channel_id: EntityId,
        entity_id: EntityId,
        parent_id: EntityId,
    ) -> Result<Vec<StructureEntity>>;

    /// The position of `parent_id` that one of the `candidates` (positions of
    /// `entity_id`) hangs below.
    fn parent_structure(
        &self,
        channel_id: EntityId,
        parent_id: EntityId,
        entity_id: EntityId,
        candidates: &[StructureEntity],
    ) -> Result<Option<StructureEntity>>;

    /// Every position strictly below `path`, in tree order.
    fn descendants(&self, channel_id: EntityId, path: &str) -> Result<Vec<StructureEntity>>;

    /// Every position of the given kind in the channel.
    fn structure_for_kind(
        &self,
        channel_id: EntityId,
        kind: EntityKind,
    ) -> Result<Vec<StructureEntity>>;

    fn entity(&self, entity_id: EntityId, level: LoadLevel) -> Result<Option<Entity>>;

    /// Known revisions of a field, newest first.
    fn field_history(&self, entity_id: EntityId, field_type_id: &str)
        -> Result<Vec<FieldRevision>>;

    /// Rendered specification text for an entity in one culture.
    fn specification_html(
        &self,
        specification_id: EntityId,
        entity_id: EntityId,
        culture: &str,
    ) -> Result<Option<String>>;
}

/// Binary payloads of resource entities.
pub trait BinaryStore: Send + Sync {
    /// Bytes of a file rendered through a display configuration, or `None`
    /// when the store has no such rendition.
    fn file(&self, file_id: i64, display_configuration: &str) -> Result<Option<Vec<u8>>>;
}
