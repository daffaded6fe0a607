//! Connector configuration.
//!
//! Loaded from TOML, validated once, then shared read-only by every stage of
//! an operation.

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::model::EntityKind;
use crate::types::{EntityId, Result, SyncError};

/// Name of the display configuration that yields the unmodified file.
pub const ORIGINAL_DISPLAY_CONFIGURATION: &str = "Original";

/// Number of resource records sent per transport call.
pub const RESOURCE_BATCH_SIZE: usize = 200;

/// Pair of catalog language and the PIM culture its values are read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageMapping {
    pub catalog: String,
    pub pim: String,
}

/// How controlled-vocabulary values are written downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CvlDataMode {
    Keys,
    #[default]
    Values,
    KeysAndValues,
}

/// Separator between key and value in [`CvlDataMode::KeysAndValues`].
pub const CVL_KEY_DELIMITER: &str = "||";

/// Endpoint paths of the downstream import API, relative to `base_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub import_catalog: String,
    pub import_resources: String,
    pub post_import: String,
    pub import_update_completed: String,
    pub delete_completed: String,
    pub delete_catalog: String,
    pub delete_catalog_node: String,
    pub delete_catalog_entry: String,
    pub delete_relation: String,
    pub delete_association: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            import_catalog: "inriverdataimport/importcatalogxml".to_string(),
            import_resources: "inriverdataimport/importresources".to_string(),
            post_import: "inriverdataimport/notifypostimport".to_string(),
            import_update_completed: "inriverdataimport/importupdatecompleted".to_string(),
            delete_completed: "inriverdataimport/deletecompleted".to_string(),
            delete_catalog: "inriverdataimport/deletecatalog".to_string(),
            delete_catalog_node: "inriverdataimport/deletecatalognode".to_string(),
            delete_catalog_entry: "inriverdataimport/deletecatalogentry".to_string(),
            delete_relation: "inriverdataimport/deleterelation".to_string(),
            delete_association: "inriverdataimport/deleteassociation".to_string(),
        }
    }
}

/// Settings for the HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub endpoints: Endpoints,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: None,
            timeout_secs: 300,
            endpoints: Endpoints::default(),
        }
    }
}

/// Connector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Id of the channel entity being exported
    pub channel_id: EntityId,
    /// Root of the staging area; every operation writes below a timestamped folder
    pub resources_root: PathBuf,
    /// File name for the catalog document, derived from the channel when unset
    pub catalog_file_name: Option<String>,
    /// Catalog languages in output order
    pub language_mapping: Vec<LanguageMapping>,
    pub default_language: String,
    pub default_currency: String,
    pub weight_base: String,
    /// Entity kinds included in a full export
    pub export_enabled_entity_types: Vec<EntityKind>,
    /// Explode items into one variation per embedded SKU
    pub items_to_skus: bool,
    /// Keep the item itself as an entry next to its SKU variations
    pub use_three_levels_in_commerce: bool,
    pub sku_field: String,
    pub sku_data_element: String,
    /// Prefix applied to every catalog code
    pub code_prefix: String,
    /// Marker placed between `code_prefix` and an SKU id
    pub sku_code_prefix: String,
    /// Field type ids never exported
    pub skip_fields: Vec<String>,
    pub cvl_data_mode: CvlDataMode,
    /// Display configurations rendered for image resources
    pub resource_configurations: Vec<String>,
    /// File extension per display configuration
    pub resource_configuration_extensions: BTreeMap<String, String>,
    /// Folder per display configuration or mime type
    pub mime_type_folders: BTreeMap<String, String>,
    pub transport: TransportConfig,
    pub log_level: String,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            channel_id: 0,
            resources_root: std::env::temp_dir().join("channel-sync"),
            catalog_file_name: None,
            language_mapping: vec![LanguageMapping {
                catalog: "en".to_string(),
                pim: "en".to_string(),
            }],
            default_language: "en".to_string(),
            default_currency: "USD".to_string(),
            weight_base: "kgs".to_string(),
            export_enabled_entity_types: vec![
                EntityKind::ChannelNode,
                EntityKind::Product,
                EntityKind::Item,
                EntityKind::Bundle,
                EntityKind::Package,
                EntityKind::Resource,
            ],
            items_to_skus: false,
            use_three_levels_in_commerce: false,
            sku_field: "SKUs".to_string(),
            sku_data_element: "SkuData".to_string(),
            code_prefix: String::new(),
            sku_code_prefix: "SKU-".to_string(),
            skip_fields: Vec::new(),
            cvl_data_mode: CvlDataMode::default(),
            resource_configurations: vec![ORIGINAL_DISPLAY_CONFIGURATION.to_string()],
            resource_configuration_extensions: BTreeMap::new(),
            mime_type_folders: BTreeMap::new(),
            transport: TransportConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl ConnectorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ConnectorConfig =
            toml::from_str(content).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.language_mapping.is_empty() {
            return Err(SyncError::Config(
                "language_mapping must contain at least one language".to_string(),
            ));
        }

        // SKU codes must never look like plain entity codes.
        match self.sku_code_prefix.chars().next() {
            None => {
                return Err(SyncError::Config(
                    "sku_code_prefix must not be empty".to_string(),
                ))
            }
            Some(c) if c.is_ascii_digit() || c == '-' => {
                return Err(SyncError::Config(format!(
                    "sku_code_prefix '{}' must not start with a digit or '-'",
                    self.sku_code_prefix
                )))
            }
            Some(_) => {}
        }

        if self.resource_configurations.is_empty() {
            return Err(SyncError::Config(
                "resource_configurations must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn is_export_enabled(&self, kind: EntityKind) -> bool {
        self.export_enabled_entity_types.contains(&kind)
    }

    pub fn skip_field(&self, field_type_id: &str) -> bool {
        self.skip_fields.iter().any(|f| f == field_type_id)
    }

    /// Lowercased catalog default language.
    pub fn default_catalog_language(&self) -> String {
        self.default_language.to_lowercase()
    }

    /// PIM culture that feeds the default catalog language.
    pub fn default_pim_culture(&self) -> &str {
        self.language_mapping
            .iter()
            .find(|m| m.catalog.eq_ignore_ascii_case(&self.default_language))
            .or_else(|| self.language_mapping.first())
            .map(|m| m.pim.as_str())
            .unwrap_or(self.default_language.as_str())
    }

    /// Comma-separated, lowercased catalog languages in mapping order.
    pub fn catalog_languages(&self) -> String {
        self.language_mapping
            .iter()
            .map(|m| m.catalog.to_lowercase())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml_with_defaults() {
        let config = ConnectorConfig::from_toml_str(
            r#"
            channel_id = 1
            resources_root = "/tmp/staging"
            items_to_skus = true

            [[language_mapping]]
            catalog = "en"
            pim = "en-GB"

            [[language_mapping]]
            catalog = "nb"
            pim = "nb-NO"

            [transport]
            base_url = "https://commerce.example.com"
            api_key = "secret"
            "#,
        )
        .expect("config");

        assert_eq!(config.channel_id, 1);
        assert!(config.items_to_skus);
        assert_eq!(config.sku_field, "SKUs");
        assert_eq!(config.catalog_languages(), "en,nb");
        assert_eq!(config.default_pim_culture(), "en-GB");
        assert_eq!(config.transport.timeout_secs, 300);
        assert_eq!(config.transport.api_key.as_deref(), Some("secret"));
        assert!(config.is_export_enabled(EntityKind::Product));
        assert!(!config.is_export_enabled(EntityKind::Specification));
    }

    #[test]
    fn rejects_sku_prefix_that_could_collide() {
        let mut config = ConnectorConfig::default();
        config.sku_code_prefix = String::new();
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));

        config.sku_code_prefix = "7x".to_string();
        assert!(config.validate().is_err());

        config.sku_code_prefix = "V".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_language_mapping() {
        let config = ConnectorConfig {
            language_mapping: vec![],
            ..ConnectorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let result = ConnectorConfig::from_toml_str("channel_id = \"not a number\"");
        assert!(matches!(result, Err(SyncError::Config(_))));
    }
}
