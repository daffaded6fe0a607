//! Deterministic mapping from source identity to catalog codes.

use uuid::Uuid;

use crate::config::ConnectorConfig;
use crate::types::EntityId;

/// A parsed catalog code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogCode {
    Entity(EntityId),
    Sku(String),
}

/// Builds catalog codes.
///
/// Entity codes are `{prefix}{id}`; SKU codes are `{prefix}{sku_prefix}{sku}`.
/// The SKU marker never starts with a digit or `-`, so the two spaces cannot
/// overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeGenerator {
    prefix: String,
    sku_prefix: String,
}

impl CodeGenerator {
    pub fn new(prefix: impl Into<String>, sku_prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            sku_prefix: sku_prefix.into(),
        }
    }

    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self::new(config.code_prefix.clone(), config.sku_code_prefix.clone())
    }

    pub fn entity_code(&self, entity_id: EntityId) -> String {
        format!("{}{}", self.prefix, entity_id)
    }

    pub fn sku_code(&self, sku_id: &str) -> String {
        format!("{}{}{}", self.prefix, self.sku_prefix, sku_id)
    }

    /// Reverse a code produced by this generator.
    pub fn parse(&self, code: &str) -> Option<CatalogCode> {
        let rest = code.strip_prefix(self.prefix.as_str())?;
        if let Some(sku) = rest.strip_prefix(self.sku_prefix.as_str()) {
            return Some(CatalogCode::Sku(sku.to_string()));
        }

        rest.parse::<EntityId>().ok().map(CatalogCode::Entity)
    }
}

/// Stable GUID for an entity within a channel: the channel id fills the
/// high 64 bits and the entity id the low 64 bits, so every id pair maps to
/// a distinct GUID.
pub fn channel_entity_guid(channel_id: EntityId, entity_id: EntityId) -> Uuid {
    Uuid::from_u64_pair(channel_id as u64, entity_id as u64)
}
