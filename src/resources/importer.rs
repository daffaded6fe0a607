//! Manifest entries to import records, delivered in fixed-size batches.

use std::path::Path;
use tracing::debug;

use super::manifest::{ResourceAction, ResourceManifest};
use crate::config::RESOURCE_BATCH_SIZE;
use crate::document::records::DataPayload;
use crate::transport::{ImportEntryCode, ImportMetaField, ImportResource, ImportValue, Transport};
use crate::types::{Result, SyncError};

/// Import records for a manifest. `base_path` is the staging folder the
/// manifest paths are relative to.
pub fn import_records(manifest: &ResourceManifest, base_path: &Path) -> Vec<ImportResource> {
    manifest
        .resources
        .iter()
        .map(|entry| {
            let entry_codes: Vec<ImportEntryCode> = entry
                .parents
                .iter()
                .filter(|p| !p.code.is_empty())
                .map(|p| ImportEntryCode {
                    code: p.code.clone(),
                    is_main_picture: p.is_main_picture,
                })
                .collect();

            let (path, meta_fields) = if entry.action == ResourceAction::Deleted {
                (None, Vec::new())
            } else {
                let path = entry
                    .paths
                    .iter()
                    .flatten()
                    .next()
                    .map(|p| base_path.join(p.trim_start_matches("./")).display().to_string());
                let meta_fields = entry
                    .fields
                    .iter()
                    .flatten()
                    .map(|field| ImportMetaField {
                        id: field.name.clone(),
                        values: field
                            .data
                            .iter()
                            .map(|d| ImportValue {
                                languagecode: d.language.clone(),
                                data: match &d.payload {
                                    DataPayload::Value(v) => v.clone(),
                                    DataPayload::Items(items) => items.join(";"),
                                },
                            })
                            .collect(),
                    })
                    .collect();
                (path, meta_fields)
            };

            ImportResource {
                resource_id: entry.code.clone(),
                action: entry.action.to_string(),
                path,
                codes: entry_codes.iter().map(|c| c.code.clone()).collect(),
                entry_codes,
                meta_fields,
            }
        })
        .collect()
}

/// Send records in batches of [`RESOURCE_BATCH_SIZE`], one at a time.
///
/// The first failing batch aborts the rest. Returns the number of batches
/// sent.
pub async fn send_batches(transport: &dyn Transport, records: &[ImportResource]) -> Result<usize> {
    if records.is_empty() {
        debug!("No resources to import, no action taken");
        return Ok(0);
    }

    let mut sent = 0;
    for (index, batch) in records.chunks(RESOURCE_BATCH_SIZE).enumerate() {
        let start = index * RESOURCE_BATCH_SIZE;
        debug!(
            "Sending resources {}-{} out of {}",
            start,
            start + batch.len(),
            records.len()
        );
        transport
            .post_resource_batch(batch)
            .await
            .map_err(|e| SyncError::transport(format!("sending resource batch {}", index + 1), e))?;
        sent += 1;
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::records::{DataRecord, MetaFieldRecord};
    use crate::resources::manifest::{ParentEntry, ResourceEntry};
    use crate::test_utils::RecordingTransport;

    fn entry(code: usize) -> ResourceEntry {
        ResourceEntry {
            code: code.to_string(),
            action: ResourceAction::Added,
            fields: Some(vec![MetaFieldRecord {
                name: "ResourceTags".into(),
                data_type: "LongString".into(),
                data: vec![DataRecord::items("en", vec!["red".into(), "blue".into()])],
            }]),
            paths: Some(vec!["./Original/shoe.jpg".into()]),
            parents: vec![ParentEntry {
                code: "SKU-A".into(),
                is_main_picture: true,
            }],
        }
    }

    fn manifest(n: usize) -> ResourceManifest {
        ResourceManifest {
            schema: None,
            resources: (0..n).map(entry).collect(),
        }
    }

    #[test]
    fn records_resolve_paths_and_join_items() {
        let records = import_records(&manifest(1), Path::new("/staging/20240101-000000"));
        let record = &records[0];
        assert_eq!(
            record.path.as_deref(),
            Some("/staging/20240101-000000/Original/shoe.jpg")
        );
        assert_eq!(record.codes, vec!["SKU-A"]);
        assert_eq!(record.meta_fields[0].values[0].data, "red;blue");
    }

    #[test]
    fn deleted_records_have_no_path_or_fields() {
        let manifest = ResourceManifest {
            schema: None,
            resources: vec![ResourceEntry::deleted("5000")],
        };
        let records = import_records(&manifest, Path::new("/staging"));
        assert_eq!(records[0].action, "deleted");
        assert!(records[0].path.is_none());
        assert!(records[0].meta_fields.is_empty());
    }

    #[tokio::test]
    async fn batches_are_ceil_of_count_over_batch_size() {
        for n in [0usize, 1, 199, 200, 201, 450] {
            let transport = RecordingTransport::default();
            let records = import_records(&manifest(n), Path::new("/staging"));
            let sent = send_batches(&transport, &records).await.unwrap();

            let sizes = transport.batch_sizes();
            assert_eq!(sent, n.div_ceil(RESOURCE_BATCH_SIZE));
            assert_eq!(sizes.len(), sent);
            assert!(sizes.iter().all(|s| *s <= RESOURCE_BATCH_SIZE));
            assert_eq!(sizes.iter().sum::<usize>(), n);
        }
    }

    #[tokio::test]
    async fn failing_batch_aborts_the_rest() {
        let transport = RecordingTransport::default().fail_on_batch(2);
        let records = import_records(&manifest(450), Path::new("/staging"));
        let result = send_batches(&transport, &records).await;

        assert!(matches!(result, Err(SyncError::Transport { .. })));
        assert_eq!(transport.batch_sizes(), vec![200]);
    }
}
