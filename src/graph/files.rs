//! Binary store over a local directory tree.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::BinaryStore;

/// Reads renditions laid out as `<root>/<display configuration>/<file id>`.
#[derive(Debug, Clone)]
pub struct DirectoryBinaryStore {
    root: PathBuf,
}

impl DirectoryBinaryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn rendition_path(&self, file_id: i64, display_configuration: &str) -> PathBuf {
        self.root
            .join(display_configuration)
            .join(file_id.to_string())
    }
}

impl BinaryStore for DirectoryBinaryStore {
    fn file(&self, file_id: i64, display_configuration: &str) -> Result<Option<Vec<u8>>> {
        let path = self.rendition_path(file_id, display_configuration);
        if !path.is_file() {
            return Ok(None);
        }
        std::fs::read(&path)
            .map(Some)
            .with_context(|| format!("Failed to read rendition {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_existing_rendition_and_reports_missing_one() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Original")).unwrap();
        std::fs::write(dir.path().join("Original").join("77"), b"jpeg").unwrap();

        let store = DirectoryBinaryStore::new(dir.path());
        assert_eq!(store.file(77, "Original").unwrap(), Some(b"jpeg".to_vec()));
        assert_eq!(store.file(77, "Thumbnail").unwrap(), None);
        assert_eq!(store.file(78, "Original").unwrap(), None);
    }
}
