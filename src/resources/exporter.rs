//! Resource binaries to staging, resources to manifest entries.

use indexmap::IndexSet;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::manifest::{
    ParentEntry, ResourceAction, ResourceEntry, ResourceManifest, ResourceMetaFieldDefinition,
};
use super::staging::{sanitize_segment, StagingArea};
use crate::codes::CodeGenerator;
use crate::config::{ConnectorConfig, ORIGINAL_DISPLAY_CONFIGURATION};
use crate::document::mapping::{downstream_data_type, meta_field_length, CatalogMapper};
use crate::export_set::ExportSet;
use crate::graph::BinaryStore;
use crate::model::{CatalogModel, Entity, EntityKind};
use crate::types::{EntityId, ResourceFailure};

pub const RESOURCE_FILE_ID_FIELD: &str = "ResourceFileId";
pub const RESOURCE_FILENAME_FIELD: &str = "ResourceFilename";
pub const RESOURCE_MIME_TYPE_FIELD: &str = "ResourceMimeType";

const FALLBACK_EXTENSION: &str = "jpg";
const FALLBACK_FOLDER: &str = "files";

/// Stages resource binaries and describes resources for the manifest.
pub struct ResourceExporter<'a> {
    config: &'a ConnectorConfig,
    model: &'a CatalogModel,
    mapper: CatalogMapper<'a>,
    store: &'a dyn BinaryStore,
}

impl<'a> ResourceExporter<'a> {
    pub fn new(
        config: &'a ConnectorConfig,
        model: &'a CatalogModel,
        codes: &'a CodeGenerator,
        store: &'a dyn BinaryStore,
    ) -> Self {
        Self {
            config,
            model,
            mapper: CatalogMapper::new(config, model, codes),
            store,
        }
    }

    pub fn file_id(&self, resource: &Entity) -> Option<i64> {
        resource.value(RESOURCE_FILE_ID_FIELD).and_then(|v| v.as_i64())
    }

    fn file_name_value(resource: &Entity) -> Option<String> {
        resource
            .value(RESOURCE_FILENAME_FIELD)
            .map(|v| v.flat())
            .filter(|name| !name.trim().is_empty())
    }

    fn is_image(&self, resource: &Entity) -> bool {
        Self::file_name_value(resource)
            .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext.to_string()))
            .map(|ext| self.model.is_image_extension(&ext))
            .unwrap_or(false)
    }

    /// Renditions staged for a resource: the configured display
    /// configurations for images, else the original only.
    pub fn display_configurations(&self, resource: &Entity) -> Vec<String> {
        if self.is_image(resource) {
            return self.config.resource_configurations.clone();
        }
        debug!(
            "No image configuration found for resource {}; using {}",
            resource.id, ORIGINAL_DISPLAY_CONFIGURATION
        );
        vec![ORIGINAL_DISPLAY_CONFIGURATION.to_string()]
    }

    /// File name of one rendition. Non-original renditions take the
    /// extension configured for them, else `.jpg`.
    pub fn file_name(&self, resource: &Entity, file_id: i64, display_configuration: &str) -> String {
        let fallback = format!("[{}].{}", file_id, FALLBACK_EXTENSION);
        match self.declared_file_name(resource, display_configuration) {
            Some(name) => sanitize_segment(&name, &fallback),
            None => fallback,
        }
    }

    fn declared_file_name(&self, resource: &Entity, display_configuration: &str) -> Option<String> {
        let declared = Self::file_name_value(resource)?;
        let declared_path = Path::new(&declared);
        let stem = declared_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| declared.clone());

        let extension = if display_configuration == ORIGINAL_DISPLAY_CONFIGURATION {
            declared_path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
        } else {
            Some(
                self.config
                    .resource_configuration_extensions
                    .get(display_configuration)
                    .filter(|e| !e.is_empty())
                    .cloned()
                    .unwrap_or_else(|| FALLBACK_EXTENSION.to_string()),
            )
        };

        Some(match extension {
            Some(ext) => format!("{}.{}", stem, ext.trim_start_matches('.')),
            None => stem,
        })
    }

    /// Staging folder of one rendition, reduced to a single safe path
    /// segment.
    pub fn folder(&self, resource: &Entity, display_configuration: &str) -> String {
        sanitize_segment(&self.raw_folder(resource, display_configuration), FALLBACK_FOLDER)
    }

    fn raw_folder(&self, resource: &Entity, display_configuration: &str) -> String {
        let folders = &self.config.mime_type_folders;
        if let Some(folder) = folders.get(display_configuration) {
            return folder.clone();
        }
        if !display_configuration.is_empty() && self.is_image(resource) {
            return display_configuration.to_string();
        }

        let mime = resource
            .value(RESOURCE_MIME_TYPE_FIELD)
            .map(|v| v.flat())
            .filter(|m| m.contains('/'));
        match mime {
            Some(mime) => match folders.get(&mime) {
                Some(folder) => folder.clone(),
                None => mime
                    .split_once('/')
                    .map(|(_, subtype)| subtype.to_string())
                    .unwrap_or(mime),
            },
            None => display_configuration.to_string(),
        }
    }

    /// Relative manifest paths `./{folder}/{file}`, one per rendition.
    pub fn paths(&self, resource: &Entity) -> Vec<String> {
        let Some(file_id) = self.file_id(resource) else {
            return Vec::new();
        };
        self.display_configurations(resource)
            .iter()
            .map(|dc| {
                format!(
                    "./{}/{}",
                    self.folder(resource, dc),
                    self.file_name(resource, file_id, dc)
                )
            })
            .collect()
    }

    /// Entry codes of every parent the resource hangs below in the export
    /// set, expanded through SKU explosion. The first code of a parent whose
    /// main picture is this file is flagged.
    pub fn parents(&self, resource: &Entity, export: &ExportSet) -> Vec<ParentEntry> {
        let parent_ids: IndexSet<EntityId> =
            export.positions_of(resource.id).map(|p| p.parent_id).collect();
        let file_id = self.file_id(resource);

        let mut seen: IndexSet<String> = IndexSet::new();
        let mut parents = Vec::new();
        let mut main_picture_flagged = false;

        for link in resource
            .inbound_links
            .iter()
            .filter(|l| parent_ids.contains(&l.source.id))
        {
            let Some(parent) = export.entity(link.source.id) else {
                debug!(
                    "Parent {} of resource {} is not loaded; skipping",
                    link.source.id, resource.id
                );
                continue;
            };
            if !parent.kind.is_entry() {
                continue;
            }

            let is_main = file_id.is_some() && parent.main_picture_file_id == file_id;
            for code in self.mapper.resource_parent_codes(parent) {
                if !seen.insert(code.clone()) {
                    continue;
                }
                let is_main_picture = is_main && !main_picture_flagged;
                main_picture_flagged |= is_main_picture;
                parents.push(ParentEntry {
                    code,
                    is_main_picture,
                });
            }
        }
        parents
    }

    /// Manifest entry for a resource.
    pub fn entry(&self, resource: &Entity, action: ResourceAction, export: &ExportSet) -> ResourceEntry {
        let fields = resource
            .fields
            .iter()
            .filter(|f| !self.config.skip_field(&f.field_type_id))
            .map(|f| self.mapper.meta_field_value(resource, f))
            .collect();

        ResourceEntry {
            code: self.mapper.codes().entity_code(resource.id),
            action,
            fields: Some(fields),
            paths: Some(self.paths(resource)),
            parents: self.parents(resource, export),
        }
    }

    /// Unlink entry: the resource loses its association with `parent`.
    pub fn unlinked_entry(&self, resource_id: EntityId, parent: &Entity) -> ResourceEntry {
        ResourceEntry {
            code: self.mapper.codes().entity_code(resource_id),
            action: ResourceAction::Unlinked,
            fields: None,
            paths: None,
            parents: self
                .mapper
                .resource_parent_codes(parent)
                .into_iter()
                .map(|code| ParentEntry {
                    code,
                    is_main_picture: false,
                })
                .collect(),
        }
    }

    /// Fetch and write every rendition of a resource.
    pub fn save_files(&self, resource: &Entity, staging: &StagingArea) -> Result<usize, ResourceFailure> {
        let started = Instant::now();
        let file_id = self
            .file_id(resource)
            .ok_or(ResourceFailure::MissingFileId(resource.id))?;

        let mut written = 0;
        for display_configuration in self.display_configurations(resource) {
            let bytes = self
                .store
                .file(file_id, &display_configuration)
                .map_err(|e| ResourceFailure::Fetch {
                    resource: resource.id,
                    message: format!("{:#}", e),
                })?
                .ok_or_else(|| ResourceFailure::MissingBinary {
                    resource: resource.id,
                    file_id,
                    rendition: display_configuration.clone(),
                })?;

            let folder = self.folder(resource, &display_configuration);
            let file_name = self.file_name(resource, file_id, &display_configuration);
            staging
                .write_file(&folder, &file_name, &bytes)
                .map_err(|source| ResourceFailure::Write {
                    resource: resource.id,
                    path: staging.dir().join(&folder).join(&file_name),
                    source,
                })?;
            written += 1;
        }

        debug!(
            "Saving resource {} ({} files) took {:?}",
            resource.id,
            written,
            started.elapsed()
        );
        Ok(written)
    }

    /// Schema rows for the resource entity type.
    pub fn meta_field_definitions(&self) -> Vec<ResourceMetaFieldDefinition> {
        self.model
            .entity_type_for_kind(EntityKind::Resource)
            .map(|et| {
                et.field_types
                    .iter()
                    .filter(|ft| !self.config.skip_field(&ft.id))
                    .map(|ft| ResourceMetaFieldDefinition {
                        name: ft.id.clone(),
                        field_type: downstream_data_type(ft.data_type).to_string(),
                        maximum_length: meta_field_length(ft.data_type),
                        allow_nulls: !ft.mandatory,
                        unique: ft.unique,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Stage every distinct resource of the export set and describe the
    /// ones that were saved. Resources that fail are logged and left out.
    pub fn export(
        &self,
        export: &ExportSet,
        staging: &StagingArea,
        action: ResourceAction,
        include_schema: bool,
    ) -> ResourceManifest {
        let resource_ids: IndexSet<EntityId> = export
            .positions_of_kind(EntityKind::Resource)
            .map(|p| p.entity_id)
            .collect();

        let mut manifest = ResourceManifest {
            schema: include_schema.then(|| self.meta_field_definitions()),
            resources: Vec::with_capacity(resource_ids.len()),
        };

        for id in resource_ids {
            let Some(resource) = export.entity(id) else {
                warn!("Resource {} was not loaded; skipping", id);
                continue;
            };
            match self.save_files(resource, staging) {
                Ok(_) => manifest.resources.push(self.entry(resource, action, export)),
                Err(failure) => warn!("Skipping resource: {}", failure),
            }
        }

        info!(
            "Staged {} resources in {}",
            manifest.len(),
            staging.dir().display()
        );
        manifest
    }
}
