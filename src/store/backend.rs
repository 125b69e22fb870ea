//! Persistence media for the configuration store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

use super::record::PersistedProviderConfig;
use crate::error::{HubError, Result};

/// Durable key-value medium holding one record per provider id.
///
/// `save` and `remove` must not return before the change is durable.
#[async_trait]
pub trait ConfigBackend: Send + Sync {
    async fn load_all(&self) -> Result<Vec<PersistedProviderConfig>>;

    async fn save(&self, provider_id: &str, record: &PersistedProviderConfig) -> Result<()>;

    async fn remove(&self, provider_id: &str) -> Result<()>;
}

/// In-process backend; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<String, PersistedProviderConfig>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the backend, as if the records had been written earlier.
    pub fn with_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = PersistedProviderConfig>,
    {
        Self {
            records: RwLock::new(
                records
                    .into_iter()
                    .map(|r| (r.provider_id.clone(), r))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl ConfigBackend for MemoryBackend {
    async fn load_all(&self) -> Result<Vec<PersistedProviderConfig>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn save(&self, provider_id: &str, record: &PersistedProviderConfig) -> Result<()> {
        self.records
            .write()
            .await
            .insert(provider_id.to_string(), record.clone());
        Ok(())
    }

    async fn remove(&self, provider_id: &str) -> Result<()> {
        self.records.write().await.remove(provider_id);
        Ok(())
    }
}

/// One JSON file per provider under `<root>/<namespace>/`.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    pub fn new(root: impl Into<PathBuf>, namespace: &str) -> Self {
        let mut dir = root.into();
        dir.push(sanitize(namespace));
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, provider_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(provider_id)))
    }
}

/// Replace characters that are problematic in file names.
fn sanitize(name: &str) -> String {
    name.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_")
}

/// Write through a temp file in the target directory, fsync, then rename over `path`.
fn write_atomically(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent directory")
    })?;
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl ConfigBackend for JsonFileBackend {
    async fn load_all(&self) -> Result<Vec<PersistedProviderConfig>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            let bytes = fs::read(&path).await?;
            match serde_json::from_slice::<PersistedProviderConfig>(&bytes) {
                Ok(mut record) => {
                    if record.provider_id.is_empty() {
                        record.provider_id = stem;
                    }
                    records.push(record);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Skipping unreadable provider configuration"
                    );
                }
            }
        }
        Ok(records)
    }

    async fn save(&self, provider_id: &str, record: &PersistedProviderConfig) -> Result<()> {
        let path = self.record_path(provider_id);
        let data = serde_json::to_vec_pretty(record)?;
        tokio::task::spawn_blocking(move || write_atomically(&path, &data))
            .await
            .map_err(|e| HubError::Storage(format!("Write task failed: {e}")))??;
        Ok(())
    }

    async fn remove(&self, provider_id: &str) -> Result<()> {
        match fs::remove_file(self.record_path(provider_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
