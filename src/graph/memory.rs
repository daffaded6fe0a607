//! In-memory graph backed by a serializable snapshot.
//!
//! Structural positions are derived on demand by walking outbound links from
//! the channel entity, ordered by link sort order.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use super::{GraphService, LoadLevel};
use crate::model::{
    child_path, CatalogModel, Entity, EntityKind, FieldRevision, Link, StructureEntity,
};
use crate::types::EntityId;

/// Recorded revisions of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldHistory {
    pub entity_id: EntityId,
    pub field_type_id: String,
    #[serde(default)]
    pub revisions: Vec<FieldRevision>,
}

/// Pre-rendered specification text for one entity and culture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificationText {
    pub specification_id: EntityId,
    pub entity_id: EntityId,
    pub culture: String,
    pub html: String,
}

/// Snapshot of a channel graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryGraph {
    pub channel_id: EntityId,
    #[serde(default)]
    pub model: CatalogModel,
    /// Entities without their links; links live in `links`.
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub field_history: Vec<FieldHistory>,
    #[serde(default)]
    pub specifications: Vec<SpecificationText>,
}

impl MemoryGraph {
    pub fn new(channel_id: EntityId, model: CatalogModel) -> Self {
        Self {
            channel_id,
            model,
            ..Self::default()
        }
    }

    /// Load a snapshot from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read graph snapshot: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse graph snapshot: {}", path.display()))
    }

    /// Insert or replace an entity.
    pub fn upsert_entity(&mut self, entity: Entity) {
        match self.entities.iter_mut().find(|e| e.id == entity.id) {
            Some(existing) => *existing = entity,
            None => self.entities.push(entity),
        }
    }

    pub fn add_link(&mut self, link: Link) {
        self.links.push(link);
    }

    /// All positions below the channel, depth first.
    pub fn positions(&self, channel_id: EntityId) -> Vec<StructureEntity> {
        let mut out = Vec::new();
        let mut stack = vec![channel_id];
        self.walk(channel_id, &channel_id.to_string(), &mut stack, &mut out);
        out
    }

    fn walk(
        &self,
        parent_id: EntityId,
        parent_path: &str,
        stack: &mut Vec<EntityId>,
        out: &mut Vec<StructureEntity>,
    ) {
        let mut children: Vec<&Link> = self
            .links
            .iter()
            .filter(|l| l.source.id == parent_id)
            .collect();
        children.sort_by_key(|l| (l.sort_order, l.id));

        for link in children {
            let target = link.target.id;
            if stack.contains(&target) {
                debug!(
                    "Skipping cyclic link {} from {} to {}",
                    link.id, parent_id, target
                );
                continue;
            }

            let path = child_path(parent_path, target);
            out.push(StructureEntity {
                entity_id: target,
                parent_id,
                path: path.clone(),
                link_type_id: Some(link.link_type_id.clone()),
                sort_order: link.sort_order,
                kind: link.target.kind,
            });

            stack.push(target);
            self.walk(target, &path, stack, out);
            stack.pop();
        }
    }
}

impl GraphService for MemoryGraph {
    fn model(&self) -> Result<CatalogModel> {
        Ok(self.model.clone())
    }

    fn full_structure(
        &self,
        channel_id: EntityId,
        enabled: &[EntityKind],
    ) -> Result<Vec<StructureEntity>> {
        Ok(self
            .positions(channel_id)
            .into_iter()
            .filter(|se| enabled.contains(&se.kind))
            .collect())
    }

    fn structure_for_entity(
        &self,
        channel_id: EntityId,
        entity_id: EntityId,
    ) -> Result<Vec<StructureEntity>> {
        Ok(self
            .positions(channel_id)
            .into_iter()
            .filter(|se| se.entity_id == entity_id)
            .collect())
    }

    fn structure_for_entity_with_parent(
        &self,
        channel_id: EntityId,
        entity_id: EntityId,
        parent_id: EntityId,
    ) -> Result<Vec<StructureEntity>> {
        Ok(self
            .positions(channel_id)
            .into_iter()
            .filter(|se| se.entity_id == entity_id && se.parent_id == parent_id)
            .collect())
    }

    fn parent_structure(
        &self,
        channel_id: EntityId,
        parent_id: EntityId,
        entity_id: EntityId,
        candidates: &[StructureEntity],
    ) -> Result<Option<StructureEntity>> {
        let parent = self
            .positions(channel_id)
            .into_iter()
            .filter(|se| se.entity_id == parent_id)
            .find(|parent| {
                candidates.iter().any(|c| {
                    c.entity_id == entity_id
                        && c.parent_id == parent_id
                        && c.parent_path() == Some(parent.path.as_str())
                })
            });
        Ok(parent)
    }

    fn descendants(&self, channel_id: EntityId, path: &str) -> Result<Vec<StructureEntity>> {
        Ok(self
            .positions(channel_id)
            .into_iter()
            .filter(|se| se.is_below(path))
            .collect())
    }

    fn structure_for_kind(
        &self,
        channel_id: EntityId,
        kind: EntityKind,
    ) -> Result<Vec<StructureEntity>> {
        Ok(self
            .positions(channel_id)
            .into_iter()
            .filter(|se| se.kind == kind)
            .collect())
    }

    fn entity(&self, entity_id: EntityId, level: LoadLevel) -> Result<Option<Entity>> {
        let Some(stored) = self.entities.iter().find(|e| e.id == entity_id) else {
            return Ok(None);
        };

        let mut entity = stored.clone();
        match level {
            LoadLevel::Shallow => {
                entity.fields.clear();
                entity.outbound_links.clear();
                entity.inbound_links.clear();
            }
            LoadLevel::DataOnly => {
                entity.outbound_links.clear();
                entity.inbound_links.clear();
            }
            LoadLevel::DataAndLinks => {
                entity.outbound_links = self
                    .links
                    .iter()
                    .filter(|l| l.source.id == entity_id)
                    .cloned()
                    .collect();
                entity.inbound_links = self
                    .links
                    .iter()
                    .filter(|l| l.target.id == entity_id)
                    .cloned()
                    .collect();
            }
        }
        Ok(Some(entity))
    }

    fn field_history(
        &self,
        entity_id: EntityId,
        field_type_id: &str,
    ) -> Result<Vec<FieldRevision>> {
        let mut revisions: Vec<FieldRevision> = self
            .field_history
            .iter()
            .filter(|h| h.entity_id == entity_id && h.field_type_id == field_type_id)
            .flat_map(|h| h.revisions.iter().cloned())
            .collect();
        revisions.sort_by(|a, b| b.revision.cmp(&a.revision));
        Ok(revisions)
    }

    fn specification_html(
        &self,
        specification_id: EntityId,
        entity_id: EntityId,
        culture: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .specifications
            .iter()
            .find(|s| {
                s.specification_id == specification_id
                    && s.entity_id == entity_id
                    && s.culture.eq_ignore_ascii_case(culture)
            })
            .map(|s| s.html.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityRef;

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

    fn graph() -> MemoryGraph {
        use EntityKind::*;
        let mut g = MemoryGraph::new(1, CatalogModel::default());
        g.add_link(link(1, (1, Channel), (10, ChannelNode)));
        g.add_link(link(2, (1, Channel), (11, ChannelNode)));
        g.add_link(link(3, (10, ChannelNode), (100, Product)));
        g.add_link(link(4, (11, ChannelNode), (100, Product)));
        g.add_link(link(5, (100, Product), (1000, Item)));
        // cycle back to the product must not recurse forever
        g.add_link(link(6, (1000, Item), (100, Product)));
        g
    }

    #[test]
    fn positions_follow_tree_order_and_multi_homing() {
        let g = graph();
        let paths: Vec<String> = g.positions(1).into_iter().map(|se| se.path).collect();
        assert_eq!(
            paths,
            vec!["1/10", "1/10/100", "1/10/100/1000", "1/11", "1/11/100", "1/11/100/1000"]
        );
    }

    #[test]
    fn parent_structure_matches_candidate_path() {
        let g = graph();
        let candidates = g.structure_for_entity(1, 1000).unwrap();
        assert_eq!(candidates.len(), 2);

        let parent = g
            .parent_structure(1, 100, 1000, &candidates[1..])
            .unwrap()
            .unwrap();
        assert_eq!(parent.path, "1/11/100");

        assert!(g.parent_structure(1, 10, 1000, &candidates).unwrap().is_none());
    }

    #[test]
    fn descendants_stay_below_path() {
        let g = graph();
        let below: Vec<EntityId> = g
            .descendants(1, "1/10")
            .unwrap()
            .into_iter()
            .map(|se| se.entity_id)
            .collect();
        assert_eq!(below, vec![100, 1000]);
    }
}
