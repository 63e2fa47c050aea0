use crate::error::{Result, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Durable backend for persisted stores.
///
/// The whole persisted set is read once at startup and written as one map
/// keyed by store id.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read the saved map, `None` when nothing was saved yet.
    async fn get(&self) -> Result<Option<Map<String, Value>>>;

    /// Replace the saved map.
    async fn set(&self, data: Map<String, Value>) -> Result<()>;

    /// Drop everything saved.
    async fn flush(&self) -> Result<()>;
}

/// In-memory storage, for tests and for hosts that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<Option<Map<String, Value>>>,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: Map<String, Value>) -> Self {
        Self {
            data: Mutex::new(Some(data)),
            writes: AtomicUsize::new(0),
        }
    }

    /// What a `get` would return right now.
    pub fn snapshot(&self) -> Option<Map<String, Value>> {
        self.data.lock().clone()
    }

    /// Number of `set` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self) -> Result<Option<Map<String, Value>>> {
        Ok(self.data.lock().clone())
    }

    async fn set(&self, data: Map<String, Value>) -> Result<()> {
        *self.data.lock() = Some(data);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        *self.data.lock() = None;
        Ok(())
    }
}

/// Storage backed by one JSON file, `<dir>/<key>.json`.
///
/// Writes go to a temporary sibling first and are renamed into place.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStorage {
    pub const DEFAULT_KEY: &'static str = "stores";

    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self::with_key(dir, Self::DEFAULT_KEY)
    }

    pub fn with_key(dir: impl AsRef<Path>, key: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{key}.json")),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl Storage for JsonFileStorage {
    async fn get(&self) -> Result<Option<Map<String, Value>>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        match serde_json::from_slice::<Map<String, Value>>(&bytes) {
            Ok(data) => Ok(Some(data)),
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    %error,
                    "corrupt store file, starting empty"
                );
                Ok(Some(Map::new()))
            }
        }
    }

    async fn set(&self, data: Map<String, Value>) -> Result<()> {
        let json = serde_json::to_vec(&data)?;
        let _guard = self.write_lock.lock().await;

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, &json).await?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|error| StoreError::Storage(format!("{}: {error}", self.path.display())))?;

        tracing::trace!(path = %self.path.display(), bytes = json.len(), "stores saved");
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Map<String, Value> {
        Map::from_iter([("prefs".to_string(), json!({ "theme": "dark" }))])
    }

    #[tokio::test]
    async fn memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get().await.unwrap(), None);

        storage.set(sample()).await.unwrap();
        assert_eq!(storage.get().await.unwrap(), Some(sample()));
        assert_eq!(storage.writes(), 1);

        storage.flush().await.unwrap();
        assert_eq!(storage.snapshot(), None);
    }

    #[tokio::test]
    async fn file_storage_missing_file_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path());
        assert_eq!(storage.get().await.unwrap(), None);
        storage.flush().await.unwrap();
    }

    #[tokio::test]
    async fn file_storage_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::with_key(dir.path().join("nested/deeper"), "app");

        storage.set(sample()).await.unwrap();
        assert!(storage.path().ends_with("nested/deeper/app.json"));
        assert_eq!(storage.get().await.unwrap(), Some(sample()));
    }

    #[tokio::test]
    async fn corrupt_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path());
        tokio::fs::write(storage.path(), b"{not json").await.unwrap();

        assert_eq!(storage.get().await.unwrap(), Some(Map::new()));
    }
}
