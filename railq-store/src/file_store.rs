use async_trait::async_trait;
use railq_core::{KeyValueStore, StoreError};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Key-value store kept as a single JSON object on disk.
///
/// Every call reads the file and every write replaces it in full, so separate
/// processes see each other's writes on their next access.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    io: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Mutex::new(()),
        }
    }

    /// Store at the platform data directory (or `RAILQ_DATA_DIR`).
    pub fn at_default_location() -> Result<Self, StoreError> {
        Ok(Self::new(crate::app_dirs::default_session_file()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| StoreError::Corrupt(format!("{}: {}", self.path.display(), e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(backend_error(&self.path, e)),
        }
    }

    async fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| backend_error(parent, e))?;
            }
        }

        let body = serde_json::to_string_pretty(entries)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        // Write then rename so a crash never leaves a half-written file
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, body)
            .await
            .map_err(|e| backend_error(&staging, e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| backend_error(&self.path, e))?;

        debug!("Wrote {} entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}

fn backend_error(path: &Path, err: std::io::Error) -> StoreError {
    StoreError::Backend(format!("{}: {}", path.display(), err))
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.io.lock().await;
        Ok(self.read_entries().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.io.lock().await;
        let mut entries = self.read_entries().await?;
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.io.lock().await;
        let mut entries = self.read_entries().await?;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.write_entries(&entries).await
    }
}
