use crate::error::{GomodError, Result};
use crate::ports::FileStore;
use crate::utils::path_validator::PathValidator;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Reads and writes repository-relative files below a project root.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = PathValidator::validate_project_path(root)?;
        Ok(Self { root })
    }
}

impl FileStore for LocalFileStore {
    fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let full_path = PathValidator::resolve_relative(&self.root, path)?;
        match fs::read(&full_path) {
            Ok(contents) => {
                // symlinks must not lead outside the project
                PathValidator::validate_file_path(&full_path, &self.root)
                    .map_err(|e| GomodError::Filesystem(e.to_string()))?;
                Ok(Some(contents))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(GomodError::Filesystem(format!("Failed to read '{path}': {err}"))),
        }
    }

    fn write_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        let full_path = PathValidator::resolve_relative(&self.root, path)?;
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                GomodError::Filesystem(format!("Failed to create '{}': {e}", parent.display()))
            })?;
        }
        fs::write(&full_path, contents)
            .map_err(|e| GomodError::Filesystem(format!("Failed to write '{path}': {e}")))
    }
}
