//! Common types used across the synchronization engine.

use std::path::PathBuf;

/// Stable integer identity of an entity in the source graph.
pub type EntityId = i64;

/// Error types for synchronization operations.
///
/// Every variant is fatal for the operation it occurs in. Per-item resource
/// problems are reported through [`ResourceFailure`] instead and never abort
/// an operation.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Structural inconsistency: {0}")]
    Inconsistency(String),

    #[error("Entity {0} was not found in the source graph")]
    NotFound(EntityId),

    #[error("Transport failure while {step}: {message}")]
    Transport { step: String, message: String },

    #[error("Staging failure at {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SyncError {
    /// Wrap a transport error, keeping the full error chain as text.
    pub fn transport(step: impl Into<String>, err: anyhow::Error) -> Self {
        Self::Transport {
            step: step.into(),
            message: format!("{:#}", err),
        }
    }

    /// Wrap an I/O error raised while touching the staging area.
    pub fn staging(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Staging {
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable classification used in connector events.
    pub fn kind(&self) -> FailureKind {
        match self {
            SyncError::Inconsistency(_) | SyncError::NotFound(_) => FailureKind::Inconsistency,
            SyncError::Transport { .. } => FailureKind::Transport,
            SyncError::Staging { .. } | SyncError::Xml(_) => FailureKind::Staging,
            SyncError::Config(_) => FailureKind::Config,
            SyncError::Internal(_) => FailureKind::Internal,
        }
    }
}

/// Classification of a terminal operation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Inconsistency,
    Transport,
    Staging,
    Config,
    Internal,
}

/// A recoverable problem with a single resource.
///
/// The resource is logged and left out of the manifest; the batch continues.
#[derive(Debug, thiserror::Error)]
pub enum ResourceFailure {
    #[error("Resource {0} has no value for ResourceFileId")]
    MissingFileId(EntityId),

    #[error("Resource {resource} (file {file_id}) has no binary for display configuration '{rendition}'")]
    MissingBinary {
        resource: EntityId,
        file_id: i64,
        rendition: String,
    },

    #[error("Could not fetch binary for resource {resource}: {message}")]
    Fetch { resource: EntityId, message: String },

    #[error("Could not write resource {resource} to {path}: {source}")]
    Write {
        resource: EntityId,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;
