//! Materialized positions of entities within the channel tree.

use serde::{Deserialize, Serialize};

use crate::model::EntityKind;
use crate::types::{EntityId, Result, SyncError};

/// Separator between entity ids in a structure path.
pub const PATH_SEPARATOR: char = '/';

/// One occurrence of an entity in the channel tree.
///
/// The path lists entity ids from the channel root down to and including
/// the entity itself, so every ancestor chain can be rebuilt from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructureEntity {
    pub entity_id: EntityId,
    pub parent_id: EntityId,
    pub path: String,
    /// Link type used to reach this entity from its parent.
    #[serde(default)]
    pub link_type_id: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    pub kind: EntityKind,
}

impl StructureEntity {
    /// Entity ids along the path, root first.
    pub fn path_ids(&self) -> Result<Vec<EntityId>> {
        parse_path(&self.path)
    }

    /// Consecutive `(entity, parent)` pairs for every ancestor of this
    /// position, nearest ancestor first. The channel root only appears as a
    /// parent.
    pub fn ancestor_pairs(&self) -> Result<Vec<(EntityId, EntityId)>> {
        let mut ids = self.path_ids()?;
        ids.reverse();
        if ids.first() != Some(&self.entity_id) {
            return Err(SyncError::Inconsistency(format!(
                "path '{}' does not end with entity {}",
                self.path, self.entity_id
            )));
        }

        Ok(ids[1..].windows(2).map(|w| (w[0], w[1])).collect())
    }

    /// Path of the parent position, if this is not a root position.
    pub fn parent_path(&self) -> Option<&str> {
        self.path.rsplit_once(PATH_SEPARATOR).map(|(parent, _)| parent)
    }

    /// True when this position lies strictly below `path`.
    pub fn is_below(&self, path: &str) -> bool {
        self.path.len() > path.len()
            && self.path.starts_with(path)
            && self.path[path.len()..].starts_with(PATH_SEPARATOR)
    }
}

/// Split a structure path into entity ids.
pub fn parse_path(path: &str) -> Result<Vec<EntityId>> {
    path.split(PATH_SEPARATOR)
        .map(|segment| {
            segment.trim().parse::<EntityId>().map_err(|_| {
                SyncError::Inconsistency(format!(
                    "invalid segment '{}' in structure path '{}'",
                    segment, path
                ))
            })
        })
        .collect()
}

/// Append an entity id to a parent path.
pub fn child_path(parent_path: &str, entity_id: EntityId) -> String {
    format!("{}{}{}", parent_path, PATH_SEPARATOR, entity_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(entity_id: EntityId, parent_id: EntityId, path: &str) -> StructureEntity {
        StructureEntity {
            entity_id,
            parent_id,
            path: path.to_string(),
            link_type_id: None,
            sort_order: 0,
            kind: EntityKind::Item,
        }
    }

    #[test]
    fn ancestor_pairs_walk_up_to_the_channel() {
        let se = position(40, 30, "1/10/20/30/40");
        assert_eq!(
            se.ancestor_pairs().unwrap(),
            vec![(30, 20), (20, 10), (10, 1)]
        );
    }

    #[test]
    fn direct_child_of_channel_has_no_ancestor_pairs() {
        let se = position(10, 1, "1/10");
        assert!(se.ancestor_pairs().unwrap().is_empty());
    }

    #[test]
    fn malformed_path_is_an_inconsistency() {
        let se = position(10, 1, "1/x/10");
        assert!(matches!(
            se.ancestor_pairs(),
            Err(SyncError::Inconsistency(_))
        ));

        let wrong_tail = position(10, 1, "1/11");
        assert!(wrong_tail.ancestor_pairs().is_err());
    }

    #[test]
    fn is_below_respects_segment_boundaries() {
        let se = position(120, 12, "1/12/120");
        assert!(se.is_below("1/12"));
        assert!(se.is_below("1"));
        assert!(!se.is_below("1/1"));
        assert!(!se.is_below("1/12/120"));
        assert_eq!(se.parent_path(), Some("1/12"));
    }
}
