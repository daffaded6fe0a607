//! Delivery of staged packages to the downstream importer.
//!
//! [`Transport`] is the only seam through which the engine talks to the
//! downstream system. Calls are awaited one at a time; retries and timeouts
//! are the implementation's concern.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::types::EntityId;

/// Event category reported with `import_update_completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportEventKind {
    Publish,
    EntityAdded,
    EntityUpdated,
    LinkAdded,
    LinkUpdated,
}

/// Event category reported with `delete_completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteEventKind {
    EntityDeleted,
    LinkDeleted,
}

/// Entry code a resource is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImportEntryCode {
    pub code: String,
    pub is_main_picture: bool,
}

/// Value of a resource meta field in one language. Vocabulary items are
/// joined with `;`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImportValue {
    pub languagecode: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImportMetaField {
    pub id: String,
    pub values: Vec<ImportValue>,
}

/// One record of a resource import batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImportResource {
    pub resource_id: String,
    pub action: String,
    /// Absolute path of the staged file; absent for deleted resources.
    pub path: Option<String>,
    pub codes: Vec<String>,
    pub entry_codes: Vec<ImportEntryCode>,
    pub meta_fields: Vec<ImportMetaField>,
}

/// Downstream import API.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Import a staged catalog document.
    async fn import_catalog(&self, catalog_path: &Path) -> Result<()>;

    /// Tell the importer a staged document has been delivered.
    async fn notify_post_import(&self, document_path: &Path) -> Result<()>;

    /// Send one batch of resource records.
    async fn post_resource_batch(&self, batch: &[ImportResource]) -> Result<()>;

    async fn import_update_completed(
        &self,
        catalog_name: &str,
        kind: ImportEventKind,
        resources_included: bool,
    ) -> Result<()>;

    async fn delete_completed(&self, catalog_name: &str, kind: DeleteEventKind) -> Result<()>;

    async fn delete_catalog(&self, catalog_id: EntityId) -> Result<()>;

    async fn delete_catalog_node(&self, node_code: &str, catalog_id: EntityId) -> Result<()>;

    async fn delete_catalog_entry(&self, entry_code: &str) -> Result<()>;

    async fn delete_sku(&self, sku_code: &str) -> Result<()>;

    async fn delete_relation(&self, source_code: &str, target_code: &str) -> Result<()>;

    async fn delete_association(
        &self,
        source_code: &str,
        target_code: &str,
        association_type: &str,
    ) -> Result<()>;
}

/// Transport that only logs what would be sent.
#[derive(Debug, Clone, Default)]
pub struct LoggingTransport;

#[async_trait]
impl Transport for LoggingTransport {
    async fn import_catalog(&self, catalog_path: &Path) -> Result<()> {
        info!("[dry-run] import catalog {}", catalog_path.display());
        Ok(())
    }

    async fn notify_post_import(&self, document_path: &Path) -> Result<()> {
        info!("[dry-run] post-import notification for {}", document_path.display());
        Ok(())
    }

    async fn post_resource_batch(&self, batch: &[ImportResource]) -> Result<()> {
        info!("[dry-run] resource batch of {} records", batch.len());
        Ok(())
    }

    async fn import_update_completed(
        &self,
        catalog_name: &str,
        kind: ImportEventKind,
        resources_included: bool,
    ) -> Result<()> {
        info!(
            "[dry-run] import completed for '{}' ({:?}, resources included: {})",
            catalog_name, kind, resources_included
        );
        Ok(())
    }

    async fn delete_completed(&self, catalog_name: &str, kind: DeleteEventKind) -> Result<()> {
        info!("[dry-run] delete completed for '{}' ({:?})", catalog_name, kind);
        Ok(())
    }

    async fn delete_catalog(&self, catalog_id: EntityId) -> Result<()> {
        info!("[dry-run] delete catalog {}", catalog_id);
        Ok(())
    }

    async fn delete_catalog_node(&self, node_code: &str, catalog_id: EntityId) -> Result<()> {
        info!("[dry-run] delete node {} in catalog {}", node_code, catalog_id);
        Ok(())
    }

    async fn delete_catalog_entry(&self, entry_code: &str) -> Result<()> {
        info!("[dry-run] delete entry {}", entry_code);
        Ok(())
    }

    async fn delete_sku(&self, sku_code: &str) -> Result<()> {
        info!("[dry-run] delete sku {}", sku_code);
        Ok(())
    }

    async fn delete_relation(&self, source_code: &str, target_code: &str) -> Result<()> {
        info!("[dry-run] delete relation {} -> {}", source_code, target_code);
        Ok(())
    }

    async fn delete_association(
        &self,
        source_code: &str,
        target_code: &str,
        association_type: &str,
    ) -> Result<()> {
        info!(
            "[dry-run] delete association {} -> {} ({})",
            source_code, target_code, association_type
        );
        Ok(())
    }
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use super::*;
    use crate::config::TransportConfig;
    use anyhow::{bail, Context};
    use serde_json::json;
    use std::time::Duration;
    use tracing::debug;

    /// JSON-over-HTTP transport authenticated with an `apikey` header.
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: reqwest::Client,
        config: TransportConfig,
    }

    impl HttpTransport {
        pub fn new(config: TransportConfig) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .context("Failed to build HTTP client")?;
            Ok(Self { client, config })
        }

        fn url(&self, endpoint: &str) -> String {
            format!(
                "{}/{}",
                self.config.base_url.trim_end_matches('/'),
                endpoint.trim_start_matches('/')
            )
        }

        async fn post<T: Serialize + ?Sized>(&self, endpoint: &str, body: &T) -> Result<()> {
            let url = self.url(endpoint);
            debug!("POST {}", url);

            let mut request = self.client.post(&url).json(body);
            if let Some(key) = &self.config.api_key {
                request = request.header("apikey", key);
            }

            let response = request
                .send()
                .await
                .with_context(|| format!("Request to {} failed", url))?;

            if response.status().is_success() {
                Ok(())
            } else {
                let status = response.status();
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                bail!("{} returned {}: {}", url, status, error_text)
            }
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn import_catalog(&self, catalog_path: &Path) -> Result<()> {
            self.post(
                &self.config.endpoints.import_catalog,
                &catalog_path.display().to_string(),
            )
            .await
        }

        async fn notify_post_import(&self, document_path: &Path) -> Result<()> {
            self.post(
                &self.config.endpoints.post_import,
                &document_path.display().to_string(),
            )
            .await
        }

        async fn post_resource_batch(&self, batch: &[ImportResource]) -> Result<()> {
            self.post(&self.config.endpoints.import_resources, batch).await
        }

        async fn import_update_completed(
            &self,
            catalog_name: &str,
            kind: ImportEventKind,
            resources_included: bool,
        ) -> Result<()> {
            let body = json!({
                "CatalogName": catalog_name,
                "EventType": kind,
                "ResourcesIncluded": resources_included,
            });
            self.post(&self.config.endpoints.import_update_completed, &body)
                .await
        }

        async fn delete_completed(&self, catalog_name: &str, kind: DeleteEventKind) -> Result<()> {
            let body = json!({
                "CatalogName": catalog_name,
                "EventType": kind,
            });
            self.post(&self.config.endpoints.delete_completed, &body).await
        }

        async fn delete_catalog(&self, catalog_id: EntityId) -> Result<()> {
            self.post(&self.config.endpoints.delete_catalog, &catalog_id)
                .await
        }

        async fn delete_catalog_node(&self, node_code: &str, catalog_id: EntityId) -> Result<()> {
            let body = json!({ "CatalogId": catalog_id, "Code": node_code });
            self.post(&self.config.endpoints.delete_catalog_node, &body)
                .await
        }

        async fn delete_catalog_entry(&self, entry_code: &str) -> Result<()> {
            self.post(&self.config.endpoints.delete_catalog_entry, entry_code)
                .await
        }

        async fn delete_sku(&self, sku_code: &str) -> Result<()> {
            self.post(&self.config.endpoints.delete_catalog_entry, sku_code)
                .await
        }

        async fn delete_relation(&self, source_code: &str, target_code: &str) -> Result<()> {
            let body = json!({ "SourceCode": source_code, "TargetCode": target_code });
            self.post(&self.config.endpoints.delete_relation, &body).await
        }

        async fn delete_association(
            &self,
            source_code: &str,
            target_code: &str,
            association_type: &str,
        ) -> Result<()> {
            let body = json!({
                "SourceCode": source_code,
                "TargetCode": target_code,
                "AssociationType": association_type,
            });
            self.post(&self.config.endpoints.delete_association, &body)
                .await
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn joins_base_url_and_endpoint() {
            let transport = HttpTransport::new(TransportConfig {
                base_url: "https://commerce.example.com/api/".into(),
                ..TransportConfig::default()
            })
            .unwrap();
            assert_eq!(
                transport.url("/inriverdataimport/deletecatalog"),
                "https://commerce.example.com/api/inriverdataimport/deletecatalog"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_records_use_downstream_field_names() {
        let record = ImportResource {
            resource_id: "5000".into(),
            action: "added".into(),
            path: Some("/staging/20240101-000000/Original/shoe.jpg".into()),
            codes: vec!["SKU-A".into()],
            entry_codes: vec![ImportEntryCode {
                code: "SKU-A".into(),
                is_main_picture: true,
            }],
            meta_fields: vec![ImportMetaField {
                id: "ResourceFilename".into(),
                values: vec![ImportValue {
                    languagecode: "en".into(),
                    data: "shoe.jpg".into(),
                }],
            }],
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["ResourceId"], "5000");
        assert_eq!(json["EntryCodes"][0]["IsMainPicture"], true);
        assert_eq!(json["MetaFields"][0]["Values"][0]["Languagecode"], "en");
    }

    #[tokio::test]
    async fn logging_transport_accepts_everything() {
        let transport = LoggingTransport;
        transport.post_resource_batch(&[]).await.unwrap();
        transport
            .import_update_completed("Web", ImportEventKind::Publish, true)
            .await
            .unwrap();
    }
}
