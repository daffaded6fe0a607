//! Timestamped staging folders for one operation.

use chrono::{DateTime, Utc};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::types::{Result, SyncError};
use crate::xml::Element;

/// File name of the resource manifest inside a staging folder.
pub const MANIFEST_FILE_NAME: &str = "Resources.xml";

const FOLDER_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Staging folder `{root}/{timestamp}` chosen once per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArea {
    root: PathBuf,
    folder: String,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>, started: DateTime<Utc>) -> Self {
        Self {
            root: root.into(),
            folder: started.format(FOLDER_FORMAT).to_string(),
        }
    }

    /// Timestamp folder name.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.folder)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir().join(MANIFEST_FILE_NAME)
    }

    /// Catalog document path for a catalog name, with characters that are
    /// unsafe in file names replaced.
    pub fn catalog_path(&self, catalog_name: &str) -> PathBuf {
        self.dir().join(format!("{}.xml", sanitize_file_name(catalog_name)))
    }

    /// Write one binary below `{folder}/{file_name}`. Both must be plain
    /// relative names; anything that could leave the staging folder is
    /// rejected with `InvalidInput`.
    pub fn write_file(&self, folder: &str, file_name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        if !is_plain_relative(folder) || !is_plain_segment(file_name) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}/{}' escapes the staging folder", folder, file_name),
            ));
        }
        let dir = self.dir().join(folder);
        let path = dir.join(file_name);
        if !path.starts_with(self.dir()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is outside the staging folder", path.display()),
            ));
        }
        std::fs::create_dir_all(&dir)?;
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Save an element tree as a document inside the staging folder.
    pub fn save_document(&self, document: &Element, path: &Path) -> Result<()> {
        if !path.starts_with(self.dir()) {
            return Err(SyncError::Inconsistency(format!(
                "{} is outside the staging folder {}",
                path.display(),
                self.dir().display()
            )));
        }
        document.save(path)?;
        debug!("Saved {}", path.display());
        Ok(())
    }
}

fn is_plain_relative(path: &str) -> bool {
    let mut components = Path::new(path).components().peekable();
    components.peek().is_some() && components.all(|c| matches!(c, Component::Normal(_)))
}

fn is_plain_segment(name: &str) -> bool {
    is_plain_relative(name) && Path::new(name).components().count() == 1
}

/// Replace path separators and reserved characters with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    sanitize_segment(name, "catalog")
}

/// Single path segment safe to join below a staging folder, or `fallback`
/// when nothing usable is left.
pub fn sanitize_segment(name: &str, fallback: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn folder_is_derived_from_start_time() {
        let started = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let staging = StagingArea::new("/staging", started);
        assert_eq!(staging.folder(), "20240309-140507");
        assert_eq!(
            staging.manifest_path(),
            PathBuf::from("/staging/20240309-140507/Resources.xml")
        );
        assert_eq!(
            staging.catalog_path("Web: EU/Nordics"),
            PathBuf::from("/staging/20240309-140507/Web_ EU_Nordics.xml")
        );
    }

    #[test]
    fn writes_files_below_folder() {
        let dir = tempdir().expect("tempdir");
        let staging = StagingArea::new(dir.path(), Utc::now());
        let path = staging
            .write_file("Thumbnail", "shoe.jpg", b"bytes")
            .expect("write");
        assert!(path.starts_with(staging.dir().join("Thumbnail")));
        assert_eq!(std::fs::read(path).unwrap(), b"bytes");
    }

    #[test]
    fn refuses_documents_outside_the_folder() {
        let dir = tempdir().expect("tempdir");
        let staging = StagingArea::new(dir.path(), Utc::now());
        let result = staging.save_document(&Element::new("Catalog"), &dir.path().join("x.xml"));
        assert!(matches!(result, Err(SyncError::Inconsistency(_))));
    }

    #[test]
    fn refuses_files_outside_the_folder() {
        let dir = tempdir().expect("tempdir");
        let staging = StagingArea::new(dir.path(), Utc::now());

        for (folder, file_name) in [
            ("..", "x.jpg"),
            ("a/../..", "x.jpg"),
            ("/tmp", "x.jpg"),
            ("", "x.jpg"),
            ("Original", "../x.jpg"),
            ("Original", "sub/x.jpg"),
        ] {
            let err = staging
                .write_file(folder, file_name, b"bytes")
                .expect_err(folder);
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        }
        assert!(!dir.path().join("x.jpg").exists());
    }

    #[test]
    fn empty_names_fall_back() {
        assert_eq!(sanitize_file_name(" .. "), "catalog");
        assert_eq!(sanitize_segment("..", "files"), "files");
        assert_eq!(sanitize_segment("../../escaped", "files"), "_.._escaped");
    }
}
