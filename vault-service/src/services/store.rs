use super::error::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Keyed record storage injected into the registry and the lease controller.
#[async_trait]
pub trait KeyValueStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>, StoreError>;
    async fn put(&self, key: &str, value: V) -> Result<(), StoreError>;
    async fn list(&self) -> Result<Vec<(String, V)>, StoreError>;
}

pub struct InMemoryStore<V> {
    entries: DashMap<String, V>,
}

impl<V> InMemoryStore<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<V> Default for InMemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> KeyValueStore<V> for InMemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, value: V) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(String, V)>, StoreError> {
        let mut items: Vec<(String, V)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(items)
    }
}

/// One JSON object per store, rewritten whole on every put.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous map intact.
pub struct JsonFileStore<V> {
    path: PathBuf,
    guard: Mutex<()>,
    _marker: std::marker::PhantomData<fn() -> V>,
}

impl<V> JsonFileStore<V>
where
    V: Serialize + DeserializeOwned,
{
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }
        Ok(Self {
            path,
            guard: Mutex::new(()),
            _marker: std::marker::PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, V>, StoreError> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, entries: &BTreeMap<String, V>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl<V> KeyValueStore<V> for JsonFileStore<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        let _guard = self.guard.lock().await;
        let mut entries = self.read_all().await?;
        Ok(entries.remove(key))
    }

    async fn put(&self, key: &str, value: V) -> Result<(), StoreError> {
        let _guard = self.guard.lock().await;
        let mut entries = self.read_all().await?;
        entries.insert(key.to_string(), value);
        self.write_all(&entries).await
    }

    async fn list(&self) -> Result<Vec<(String, V)>, StoreError> {
        let _guard = self.guard.lock().await;
        Ok(self.read_all().await?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_in_memory_put_get_list() {
        let store: InMemoryStore<u32> = InMemoryStore::new();
        assert!(store.get("a").await.unwrap().is_none());

        store.put("b", 2).await.unwrap();
        store.put("a", 1).await.unwrap();
        store.put("a", 3).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(3));
        assert_eq!(
            store.list().await.unwrap(),
            vec![("a".to_string(), 3), ("b".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_json_file_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("leases.json");

        let store: JsonFileStore<Vec<String>> = JsonFileStore::new(&path).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        store
            .put("lease-1", vec!["ai.openai.inference".to_string()])
            .await
            .unwrap();

        let reopened: JsonFileStore<Vec<String>> = JsonFileStore::new(&path).await.unwrap();
        assert_eq!(
            reopened.get("lease-1").await.unwrap(),
            Some(vec!["ai.openai.inference".to_string()])
        );
        assert!(reopened.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_file_store_rejects_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("contracts.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store: JsonFileStore<u32> = JsonFileStore::new(&path).await.unwrap();
        assert!(matches!(
            store.get("x").await,
            Err(StoreError::Serialization(_))
        ));
    }
}
