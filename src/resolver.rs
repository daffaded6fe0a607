//! Turns a change event into the set of positions that must be re-rendered.

use anyhow::Context;
use tracing::debug;

use crate::export_set::ExportSet;
use crate::graph::GraphService;
use crate::model::{EntityKind, StructureEntity};
use crate::types::{EntityId, Result, SyncError};

/// Resolves affected positions against the source graph.
///
/// Every result is computed from fresh graph queries and returned without
/// entities; call [`ExportSet::hydrate`] before rendering.
pub struct StructureResolver<'a> {
    graph: &'a dyn GraphService,
    channel_id: EntityId,
}

impl<'a> StructureResolver<'a> {
    pub fn new(graph: &'a dyn GraphService, channel_id: EntityId) -> Self {
        Self { graph, channel_id }
    }

    /// Every position of an enabled kind.
    pub fn full(&self, enabled: &[EntityKind]) -> Result<ExportSet> {
        let positions = self
            .graph
            .full_structure(self.channel_id, enabled)
            .context("Failed to fetch channel structure")?;
        debug!("Full structure contains {} positions", positions.len());
        Ok(ExportSet::from_positions(positions))
    }

    /// All positions of one entity.
    pub fn entity_positions(&self, entity_id: EntityId) -> Result<ExportSet> {
        Ok(ExportSet::from_positions(self.positions_of(entity_id)?))
    }

    /// Every position of one kind, regardless of export settings.
    pub fn kind(&self, kind: EntityKind) -> Result<ExportSet> {
        let positions = self
            .graph
            .structure_for_kind(self.channel_id, kind)
            .with_context(|| format!("Failed to fetch {} positions", kind))?;
        Ok(ExportSet::from_positions(positions))
    }

    /// Parents of each new position, the positions themselves, then the
    /// subtree already hanging below them.
    pub fn entity_added(&self, entity_id: EntityId) -> Result<ExportSet> {
        let added = self.positions_of(entity_id)?;
        let mut set = ExportSet::new();

        for position in &added {
            let parent = self
                .graph
                .parent_structure(self.channel_id, position.parent_id, entity_id, &added)
                .with_context(|| format!("Failed to fetch parent of entity {}", entity_id))?;
            match parent {
                Some(parent) => {
                    set.add_position(parent);
                }
                None => debug!(
                    "Entity {} at '{}' hangs directly below the channel",
                    entity_id, position.path
                ),
            }
        }

        set.extend_positions(added.iter().cloned());

        for position in &added {
            set.extend_unique(self.descendants(&position.path)?);
        }

        Ok(set)
    }

    /// Re-resolves every ancestor of every existing placement of `target`,
    /// adds the subtree below it, then re-appends the placements themselves.
    pub fn link_added(&self, source_id: EntityId, target_id: EntityId) -> Result<ExportSet> {
        let existing = self.positions_of(target_id)?;
        debug!(
            "Link {} -> {} touches {} positions of the target",
            source_id,
            target_id,
            existing.len()
        );

        let mut set = ExportSet::new();
        for position in &existing {
            for (entity_id, parent_id) in position.ancestor_pairs()? {
                let fresh = self
                    .graph
                    .structure_for_entity_with_parent(self.channel_id, entity_id, parent_id)
                    .with_context(|| {
                        format!("Failed to fetch entity {} below {}", entity_id, parent_id)
                    })?;
                set.extend_unique(fresh);
            }
        }

        for position in &existing {
            set.extend_unique(self.descendants(&position.path)?);
        }

        // multi-homed targets are exported once per placement
        set.extend_positions(existing);

        Ok(set)
    }

    /// The parent placement of a re-linked target plus everything below it.
    pub fn link_updated(&self, source_id: EntityId, target_id: EntityId) -> Result<ExportSet> {
        let candidates = self
            .graph
            .structure_for_entity_with_parent(self.channel_id, target_id, source_id)
            .with_context(|| format!("Failed to fetch entity {} below {}", target_id, source_id))?;

        let parent = self
            .graph
            .parent_structure(self.channel_id, source_id, target_id, &candidates)
            .with_context(|| format!("Failed to fetch parent structure {}", source_id))?
            .ok_or_else(|| {
                SyncError::Inconsistency(format!(
                    "Can't find parent structure entity {} with target entity id {}",
                    source_id, target_id
                ))
            })?;

        let mut set = ExportSet::new();
        let parent_path = parent.path.clone();
        set.add_position(parent);
        set.extend_unique(self.descendants(&parent_path)?);
        Ok(set)
    }

    fn positions_of(&self, entity_id: EntityId) -> Result<Vec<StructureEntity>> {
        Ok(self
            .graph
            .structure_for_entity(self.channel_id, entity_id)
            .with_context(|| format!("Failed to fetch positions of entity {}", entity_id))?)
    }

    fn descendants(&self, path: &str) -> Result<Vec<StructureEntity>> {
        Ok(self
            .graph
            .descendants(self.channel_id, path)
            .with_context(|| format!("Failed to fetch descendants of '{}'", path))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use crate::model::{CatalogModel, EntityRef, Link};
    use std::collections::BTreeSet;

    fn link(id: i64, source: (EntityId, EntityKind), target: (EntityId, EntityKind)) -> Link {
        Link {
            id,
            link_type_id: format!("{}{}", source.1, target.1),
            source: EntityRef {
                id: source.0,
                kind: source.1,
            },
            target: EntityRef {
                id: target.0,
                kind: target.1,
            },
            sort_order: id as i32,
            link_entity_id: None,
        }
    }

    /// Channel 1 with nodes 10 and 11 (11 nested below 12), product 100 shared
    /// by both nodes, items 1000/1001 below the product and resource 5000 on
    /// item 1000.
    fn graph() -> MemoryGraph {
        use EntityKind::*;
        let mut g = MemoryGraph::new(1, CatalogModel::default());
        g.add_link(link(1, (1, Channel), (10, ChannelNode)));
        g.add_link(link(2, (1, Channel), (12, ChannelNode)));
        g.add_link(link(3, (12, ChannelNode), (11, ChannelNode)));
        g.add_link(link(4, (10, ChannelNode), (100, Product)));
        g.add_link(link(5, (11, ChannelNode), (100, Product)));
        g.add_link(link(6, (100, Product), (1000, Item)));
        g.add_link(link(7, (100, Product), (1001, Item)));
        g.add_link(link(8, (1000, Item), (5000, Resource)));
        g
    }

    fn ids(set: &ExportSet) -> BTreeSet<EntityId> {
        set.entity_ids().collect()
    }

    #[test]
    fn full_filters_by_enabled_kinds() {
        let g = graph();
        let resolver = StructureResolver::new(&g, 1);
        let set = resolver
            .full(&[EntityKind::ChannelNode, EntityKind::Product])
            .unwrap();
        assert_eq!(ids(&set), BTreeSet::from([10, 11, 12, 100]));
        assert_eq!(set.positions_of(100).count(), 2);
    }

    #[test]
    fn entity_added_includes_parents_and_subtree() {
        let g = graph();
        let set = StructureResolver::new(&g, 1).entity_added(100).unwrap();

        let order: Vec<&str> = set.positions().map(|p| p.path.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "1/10",
                "1/12/11",
                "1/10/100",
                "1/12/11/100",
                "1/10/100/1000",
                "1/10/100/1000/5000",
                "1/10/100/1001",
            ]
        );
    }

    #[test]
    fn link_added_covers_every_ancestor_of_every_placement() {
        let g = graph();
        let existing = g.structure_for_entity(1, 1000).unwrap();
        let set = StructureResolver::new(&g, 1).link_added(100, 1000).unwrap();

        for position in &existing {
            for id in position.path_ids().unwrap().into_iter().skip(1) {
                assert!(set.contains_entity(id), "missing ancestor {}", id);
            }
        }
        assert!(set.contains_entity(5000));
        // both placements of the target survive deduplication
        assert_eq!(set.positions_of(1000).count(), 2);
    }

    #[test]
    fn path_derived_ancestors_match_fresh_queries() {
        let g = graph();
        for target in [100, 1000, 1001, 5000, 11] {
            for position in g.structure_for_entity(1, target).unwrap() {
                let from_path: Vec<EntityId> = position
                    .ancestor_pairs()
                    .unwrap()
                    .into_iter()
                    .map(|(entity, _)| entity)
                    .collect();

                let mut fresh = Vec::new();
                let mut current = position.clone();
                while current.parent_id != 1 {
                    let parent = g
                        .parent_structure(1, current.parent_id, current.entity_id, &[current.clone()])
                        .unwrap()
                        .expect("parent position");
                    fresh.push(parent.entity_id);
                    current = parent;
                }

                assert_eq!(from_path, fresh, "target {} at {}", target, position.path);
            }
        }
    }

    #[test]
    fn link_updated_exports_parent_and_subtree() {
        let g = graph();
        let set = StructureResolver::new(&g, 1).link_updated(100, 1000).unwrap();
        let first = set.positions().next().unwrap();
        assert_eq!(first.entity_id, 100);
        assert_eq!(ids(&set), BTreeSet::from([100, 1000, 1001, 5000]));
    }

    #[test]
    fn link_updated_without_link_is_inconsistent() {
        let g = graph();
        let err = StructureResolver::new(&g, 1)
            .link_updated(10, 1000)
            .unwrap_err();
        assert!(matches!(err, SyncError::Inconsistency(_)));
    }
}
