//! Storage for sheet configuration records.
//!
//! The deployment is a low-traffic personal tool, so the store is a trait
//! with two backends: an in-memory map for tests and development, and a
//! single JSON document on disk for real use.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::sheet_config::SheetConfig;

/// Abstract store for [`SheetConfig`] records.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Inserts a new configuration.
    ///
    /// Each spreadsheet may only be configured once; inserting a second
    /// configuration for the same `spreadsheet_id` fails with
    /// [`Error::AlreadyExists`].
    async fn insert(&self, config: SheetConfig) -> Result<SheetConfig>;

    /// Returns the configuration with the given id, if present.
    async fn get(&self, id: &str) -> Result<Option<SheetConfig>>;

    /// Lists a user's configurations, newest accounting period first.
    async fn list(&self, user_id: &str) -> Result<Vec<SheetConfig>>;
}

fn sort_newest_period_first(configs: &mut [SheetConfig]) {
    configs.sort_by(|a, b| (b.year, b.month).cmp(&(a.year, a.month)));
}

fn check_duplicate_spreadsheet(
    entries: &HashMap<String, SheetConfig>,
    config: &SheetConfig,
) -> Result<()> {
    if entries
        .values()
        .any(|existing| existing.spreadsheet_id == config.spreadsheet_id)
    {
        return Err(Error::already_exists(
            "sheet config for spreadsheet",
            &config.spreadsheet_id,
        ));
    }
    Ok(())
}

/// In-memory config store for tests and development.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    entries: RwLock<HashMap<String, SheetConfig>>,
}

impl MemoryConfigStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn insert(&self, config: SheetConfig) -> Result<SheetConfig> {
        let mut entries = self.entries.write().await;
        check_duplicate_spreadsheet(&entries, &config)?;
        entries.insert(config.id.clone(), config.clone());
        Ok(config)
    }

    async fn get(&self, id: &str) -> Result<Option<SheetConfig>> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<SheetConfig>> {
        let entries = self.entries.read().await;
        let mut configs: Vec<SheetConfig> = entries
            .values()
            .filter(|config| config.user_id == user_id)
            .cloned()
            .collect();
        sort_newest_period_first(&mut configs);
        Ok(configs)
    }
}

/// Config store persisted as one JSON document on disk.
///
/// The whole document is rewritten on every insert; fine for a handful of
/// records, not a database.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, SheetConfig>>,
}

impl JsonFileStore {
    /// Opens the store, loading existing records if the file is present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let configs: Vec<SheetConfig> =
                    serde_json::from_slice(&bytes).map_err(|e| Error::Serialization {
                        message: format!("failed to parse {}: {e}", path.display()),
                    })?;
                configs
                    .into_iter()
                    .map(|config| (config.id.clone(), config))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(Error::storage_with_source(
                    format!("failed to read {}", path.display()),
                    e,
                ));
            }
        };

        tracing::info!(path = %path.display(), configs = entries.len(), "Loaded sheet config store");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    async fn persist(&self, entries: &HashMap<String, SheetConfig>) -> Result<()> {
        let mut configs: Vec<&SheetConfig> = entries.values().collect();
        configs.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let bytes = serde_json::to_vec_pretty(&configs).map_err(|e| Error::Serialization {
            message: format!("failed to serialize config store: {e}"),
        })?;
        tokio::fs::write(&self.path, bytes).await.map_err(|e| {
            Error::storage_with_source(format!("failed to write {}", self.path.display()), e)
        })
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn insert(&self, config: SheetConfig) -> Result<SheetConfig> {
        let mut entries = self.entries.write().await;
        check_duplicate_spreadsheet(&entries, &config)?;
        entries.insert(config.id.clone(), config.clone());
        self.persist(&entries).await?;
        Ok(config)
    }

    async fn get(&self, id: &str) -> Result<Option<SheetConfig>> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<SheetConfig>> {
        let entries = self.entries.read().await;
        let mut configs: Vec<SheetConfig> = entries
            .values()
            .filter(|config| config.user_id == user_id)
            .cloned()
            .collect();
        sort_newest_period_first(&mut configs);
        Ok(configs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(spreadsheet_id: &str, name: &str) -> SheetConfig {
        SheetConfig::new("local", spreadsheet_id, name, "Transactions", "A:H").expect("config")
    }

    #[tokio::test]
    async fn test_memory_insert_and_get() {
        let store = MemoryConfigStore::new();
        let inserted = store
            .insert(config("spread-1", "Chi tiêu 9/2025"))
            .await
            .expect("insert");

        let loaded = store.get(&inserted.id).await.expect("get");
        assert_eq!(loaded, Some(inserted));
    }

    #[tokio::test]
    async fn test_memory_rejects_duplicate_spreadsheet() {
        let store = MemoryConfigStore::new();
        store
            .insert(config("spread-1", "Chi tiêu 9/2025"))
            .await
            .expect("insert");

        let err = store
            .insert(config("spread-1", "Chi tiêu 10/2025"))
            .await
            .expect_err("duplicate spreadsheet must be rejected");
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_memory_list_orders_newest_period_first() {
        let store = MemoryConfigStore::new();
        store
            .insert(config("spread-1", "Chi tiêu 9/2025"))
            .await
            .expect("insert");
        store
            .insert(config("spread-2", "Chi tiêu 12/2024"))
            .await
            .expect("insert");
        store
            .insert(config("spread-3", "Chi tiêu 1/2026"))
            .await
            .expect("insert");

        let periods: Vec<String> = store
            .list("local")
            .await
            .expect("list")
            .iter()
            .map(SheetConfig::display_period)
            .collect();
        assert_eq!(periods, vec!["1/2026", "9/2025", "12/2024"]);
    }

    #[tokio::test]
    async fn test_memory_list_filters_by_user() {
        let store = MemoryConfigStore::new();
        store
            .insert(config("spread-1", "Chi tiêu 9/2025"))
            .await
            .expect("insert");

        assert!(store.list("someone-else").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_json_file_store_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("configs.json");

        let store = JsonFileStore::open(&path).await.expect("open");
        let inserted = store
            .insert(config("spread-1", "Chi tiêu 9/2025"))
            .await
            .expect("insert");

        // Reopen from disk and verify the record survived.
        let reopened = JsonFileStore::open(&path).await.expect("reopen");
        let loaded = reopened.get(&inserted.id).await.expect("get");
        assert_eq!(loaded, Some(inserted));
    }

    #[tokio::test]
    async fn test_json_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path().join("missing.json"))
            .await
            .expect("open");
        assert!(store.list("local").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_json_file_store_rejects_duplicate_spreadsheet() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path().join("configs.json"))
            .await
            .expect("open");
        store
            .insert(config("spread-1", "Chi tiêu 9/2025"))
            .await
            .expect("insert");

        let err = store
            .insert(config("spread-1", "Chi tiêu 10/2025"))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }
}
