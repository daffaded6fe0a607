//! Ordered, deduplicated selection of positions and entities for one
//! operation.

use anyhow::Context;
use indexmap::{IndexMap, IndexSet};

use crate::graph::{GraphService, LoadLevel};
use crate::model::{Entity, EntityKind, StructureEntity};
use crate::types::{EntityId, Result, SyncError};

/// Positions in discovery order plus the entities they reference.
///
/// Positions are keyed by path, so the same placement is never listed twice.
/// [`ExportSet::insert_unique`] additionally refuses any entity id that is
/// already present, while [`ExportSet::add_position`] keeps legitimate
/// multi-homed placements.
#[derive(Debug, Clone, Default)]
pub struct ExportSet {
    positions: IndexMap<String, StructureEntity>,
    seen: IndexSet<EntityId>,
    entities: IndexMap<EntityId, Entity>,
}

impl ExportSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_positions(positions: impl IntoIterator<Item = StructureEntity>) -> Self {
        let mut set = Self::new();
        set.extend_positions(positions);
        set
    }

    /// Add a position unless its entity id was already seen.
    pub fn insert_unique(&mut self, position: StructureEntity) -> bool {
        if self.seen.contains(&position.entity_id) {
            return false;
        }
        self.add_position(position)
    }

    /// Add a position unless this exact placement is already present.
    pub fn add_position(&mut self, position: StructureEntity) -> bool {
        if self.positions.contains_key(&position.path) {
            return false;
        }
        self.seen.insert(position.entity_id);
        self.positions.insert(position.path.clone(), position);
        true
    }

    pub fn extend_unique(&mut self, positions: impl IntoIterator<Item = StructureEntity>) {
        for position in positions {
            self.insert_unique(position);
        }
    }

    pub fn extend_positions(&mut self, positions: impl IntoIterator<Item = StructureEntity>) {
        for position in positions {
            self.add_position(position);
        }
    }

    pub fn positions(&self) -> impl Iterator<Item = &StructureEntity> {
        self.positions.values()
    }

    /// Positions of one entity, in discovery order.
    pub fn positions_of(&self, entity_id: EntityId) -> impl Iterator<Item = &StructureEntity> {
        self.positions
            .values()
            .filter(move |se| se.entity_id == entity_id)
    }

    /// Positions whose entity is of the given kind.
    pub fn positions_of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &StructureEntity> {
        self.positions.values().filter(move |se| se.kind == kind)
    }

    /// Distinct entity ids in discovery order.
    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.seen.iter().copied()
    }

    pub fn contains_entity(&self, entity_id: EntityId) -> bool {
        self.seen.contains(&entity_id)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Load every referenced entity and every parent entity except the
    /// channel itself.
    pub fn hydrate(&mut self, graph: &dyn GraphService, channel_id: EntityId) -> Result<()> {
        let mut ids: IndexSet<EntityId> = IndexSet::new();
        for position in self.positions.values() {
            ids.insert(position.entity_id);
            if position.parent_id != channel_id {
                ids.insert(position.parent_id);
            }
        }

        for id in ids {
            if self.entities.contains_key(&id) {
                continue;
            }
            let entity = graph
                .entity(id, LoadLevel::DataAndLinks)
                .with_context(|| format!("Failed to load entity {}", id))?
                .ok_or(SyncError::NotFound(id))?;
            self.entities.insert(id, entity);
        }
        Ok(())
    }

    /// Hydrated entity by id.
    pub fn entity(&self, entity_id: EntityId) -> Option<&Entity> {
        self.entities.get(&entity_id)
    }

    /// Hydrated entities in discovery order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn se(entity_id: EntityId, parent_id: EntityId, path: &str) -> StructureEntity {
        StructureEntity {
            entity_id,
            parent_id,
            path: path.to_string(),
            link_type_id: None,
            sort_order: 0,
            kind: EntityKind::Product,
        }
    }

    #[test]
    fn insert_unique_keeps_first_seen_entity() {
        let mut set = ExportSet::new();
        assert!(set.insert_unique(se(100, 10, "1/10/100")));
        assert!(!set.insert_unique(se(100, 11, "1/11/100")));
        assert_eq!(set.len(), 1);
        assert_eq!(set.positions().next().unwrap().parent_id, 10);
    }

    #[test]
    fn add_position_keeps_multi_homed_entities() {
        let mut set = ExportSet::new();
        set.insert_unique(se(100, 10, "1/10/100"));
        assert!(set.add_position(se(100, 11, "1/11/100")));
        assert!(!set.add_position(se(100, 11, "1/11/100")));

        let paths: Vec<&str> = set.positions_of(100).map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["1/10/100", "1/11/100"]);
        assert_eq!(set.entity_ids().collect::<Vec<_>>(), vec![100]);
    }
}
