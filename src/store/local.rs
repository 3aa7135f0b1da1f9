//! Local filesystem lead folder store.
//!
//! Maps store paths onto a base directory with `tokio::fs`. This is the
//! development backend (run the full pipeline without a SharePoint tenant)
//! and the store the integration tests exercise.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::store::{join_path, FileEntry, LeadFolderStore, StoreError, LEAD_SUBFOLDERS};

/// Lead folder store over a local directory.
pub struct LocalFolderStore {
    base: PathBuf,
}

impl LocalFolderStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Filesystem path for a store path.
    ///
    /// Store paths are trusted, `/`-separated and relative; `.` and `..`
    /// segments are dropped so a malformed path stays inside the base.
    fn resolve(&self, path: &str) -> PathBuf {
        let mut resolved = self.base.clone();
        for part in path
            .split('/')
            .filter(|p| !p.is_empty() && *p != "." && *p != "..")
        {
            resolved.push(part);
        }
        resolved
    }
}

fn map_io(path: &str, err: io::Error) -> StoreError {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(path.to_string())
    } else {
        StoreError::Unavailable(format!("{path}: {err}"))
    }
}

#[async_trait]
impl LeadFolderStore for LocalFolderStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn ensure_folder_tree(&self, lead_root: &str) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(self.resolve(lead_root))
            .await
            .map_err(|e| map_io(lead_root, e))?;

        for subfolder in LEAD_SUBFOLDERS {
            let path = join_path(lead_root, subfolder);
            tokio::fs::create_dir_all(self.resolve(&path))
                .await
                .map_err(|e| map_io(&path, e))?;
        }

        debug!(lead_root, "Ensured lead folder tree");
        Ok(())
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let resolved = self.resolve(path);
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(path, e))?;
        }
        tokio::fs::write(&resolved, bytes)
            .await
            .map_err(|e| map_io(path, e))
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        tokio::fs::read(self.resolve(path))
            .await
            .map_err(|e| map_io(path, e))
    }

    async fn list_files(&self, folder: &str) -> Result<Vec<FileEntry>, StoreError> {
        self.list_entries(folder, false).await
    }

    async fn list_folders(&self, folder: &str) -> Result<Vec<FileEntry>, StoreError> {
        self.list_entries(folder, true).await
    }
}

impl LocalFolderStore {
    async fn list_entries(&self, folder: &str, dirs: bool) -> Result<Vec<FileEntry>, StoreError> {
        let mut read_dir = tokio::fs::read_dir(self.resolve(folder))
            .await
            .map_err(|e| map_io(folder, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| map_io(folder, e))?
        {
            let file_type = entry.file_type().await.map_err(|e| map_io(folder, e))?;
            if file_type.is_dir() != dirs {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            entries.push(FileEntry {
                path: join_path(folder, &name),
                name,
            });
        }

        // Directory order is platform-dependent; a stable order makes scans
        // and their logs reproducible.
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
