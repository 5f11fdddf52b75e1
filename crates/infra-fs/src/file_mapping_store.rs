// File-per-key MappingStore Implementation

use async_trait::async_trait;
use backy_core::domain::{ExternalId, ToolId};
use backy_core::error::{AppError, Result};
use backy_core::port::MappingStore;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Prefix for in-flight writes; never a valid key
const TEMP_PREFIX: &str = ".tmp-";

fn map_io_error(action: &str, path: &Path, err: std::io::Error) -> AppError {
    AppError::Storage(format!("{} {}: {}", action, path.display(), err))
}

/// Keys become file names, so they must be a single path component
fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && !key.chars().any(|c| matches!(c, '/' | '\\' | '\0'));
    if !valid {
        return Err(AppError::Validation(format!(
            "invalid backup id {:?}",
            key
        )));
    }
    Ok(())
}

/// One file per external id under `dir`; the file body is the tool id.
///
/// Writes go to a temp file in the same directory and are renamed over the
/// target, so a reader sees either the old value or the new one.
pub struct FileMappingStore {
    dir: PathBuf,
}

impl FileMappingStore {
    /// Open the store, creating `dir` if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| map_io_error("Couldn't create ids directory", &dir, e))?;
        info!(dir = %dir.display(), "Mapping store opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, external_id: &str) -> Result<PathBuf> {
        validate_key(external_id)?;
        Ok(self.dir.join(external_id))
    }

    async fn blocking<T, F>(f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| AppError::Internal(format!("storage task failed: {}", e)))?
    }
}

fn read_entry(path: &Path) -> Result<Option<ToolId>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let tool_id = contents.trim();
            if tool_id.is_empty() {
                return Err(AppError::Storage(format!(
                    "empty mapping file {}",
                    path.display()
                )));
            }
            Ok(Some(tool_id.to_string()))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(map_io_error("Couldn't read", path, e)),
    }
}

#[async_trait]
impl MappingStore for FileMappingStore {
    async fn put(&self, external_id: &str, tool_id: &str) -> Result<()> {
        let path = self.entry_path(external_id)?;
        let dir = self.dir.clone();
        let value = tool_id.to_string();

        Self::blocking(move || {
            let mut tmp = tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .tempfile_in(&dir)
                .map_err(|e| map_io_error("Couldn't create temp file in", &dir, e))?;
            tmp.write_all(value.as_bytes())
                .and_then(|_| tmp.as_file().sync_all())
                .map_err(|e| map_io_error("Couldn't write", tmp.path(), e))?;
            tmp.persist(&path)
                .map_err(|e| map_io_error("Couldn't replace", &path, e.error))?;
            Ok(())
        })
        .await?;

        debug!(external_id = %external_id, tool_id = %tool_id, "Mapping saved");
        Ok(())
    }

    async fn get(&self, external_id: &str) -> Result<Option<ToolId>> {
        // No valid key maps to a path-like id, so it can only be unknown
        let Ok(path) = self.entry_path(external_id) else {
            return Ok(None);
        };
        Self::blocking(move || read_entry(&path)).await
    }

    async fn delete(&self, external_id: &str) -> Result<bool> {
        let Ok(path) = self.entry_path(external_id) else {
            return Ok(false);
        };
        let removed = Self::blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io_error("Couldn't remove", &path, e)),
        })
        .await?;

        debug!(external_id = %external_id, removed = %removed, "Mapping deleted");
        Ok(removed)
    }

    async fn entries(&self) -> Result<Vec<(ExternalId, ToolId)>> {
        let dir = self.dir.clone();
        Self::blocking(move || {
            let listing =
                std::fs::read_dir(&dir).map_err(|e| map_io_error("Couldn't list", &dir, e))?;

            let mut entries = Vec::new();
            for item in listing {
                let item = item.map_err(|e| map_io_error("Couldn't list", &dir, e))?;
                let Some(name) = item.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                if validate_key(&name).is_err() {
                    continue;
                }
                match read_entry(&item.path()) {
                    Ok(Some(tool_id)) => entries.push((name, tool_id)),
                    // Removed between listing and read
                    Ok(None) => {}
                    Err(e) => warn!(file = %name, error = %e, "Skipping unreadable mapping"),
                }
            }
            entries.sort();
            Ok(entries)
        })
        .await
    }
}
