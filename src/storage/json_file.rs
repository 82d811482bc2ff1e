use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info};
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::Mutex;

use super::memory::upsert;
use super::{KeyCondition, PersistenceGateway, TableKind, validate_record};
use crate::utils::ensure_directory_exists;

/// One pretty-printed JSON array per table under a directory.
pub struct JsonFileStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles.
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if ensure_directory_exists(&dir).await? {
            info!("Created empty storage at {:?}", dir);
        } else {
            info!("Storage opened at {:?}", dir);
        }
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    fn table_path(&self, table: TableKind) -> PathBuf {
        self.dir.join(format!("{}.json", table.name()))
    }

    async fn load(&self, table: TableKind) -> Result<Vec<Map<String, Value>>> {
        let path = self.table_path(table);
        if !path.exists() {
            debug!("Table file {:?} not found, treating as empty", path);
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn store(&self, table: TableKind, rows: &[Map<String, Value>]) -> Result<()> {
        let json = match serde_json::to_string_pretty(rows) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize {} rows: {}", table, e);
                return Err(e.into());
            }
        };
        fs::write(self.table_path(table), json).await?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for JsonFileStore {
    async fn save(&self, table: TableKind, record: Value, key: &KeyCondition) -> Result<()> {
        let row = validate_record(table, &record)?;
        let _guard = self.lock.lock().await;
        let mut rows = self.load(table).await?;
        upsert(&mut rows, row, key);
        self.store(table, &rows).await?;
        debug!("Saved row to {}", table);
        Ok(())
    }

    async fn query(&self, table: TableKind, key: &KeyCondition) -> Result<Vec<Value>> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load(table)
            .await?
            .into_iter()
            .filter(|row| key.matches(row))
            .map(Value::Object)
            .collect())
    }

    async fn delete(&self, table: TableKind, key: &KeyCondition) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut rows = self.load(table).await?;
        rows.retain(|row| !key.matches(row));
        self.store(table, &rows).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn rows_survive_reopen() {
        let dir = std::env::temp_dir().join(format!("taika-store-{}", std::process::id()));
        let key = KeyCondition::eq("id", 1);
        {
            let store = JsonFileStore::open(&dir).await.unwrap();
            store
                .save(TableKind::AppConfig, json!({"id": 1, "ring_name": "Lounge ring"}), &key)
                .await
                .unwrap();
        }
        let store = JsonFileStore::open(&dir).await.unwrap();
        let rows = store.query(TableKind::AppConfig, &key).await.unwrap();
        assert_eq!(rows, vec![json!({"id": 1, "ring_name": "Lounge ring"})]);

        store.delete(TableKind::AppConfig, &key).await.unwrap();
        assert!(store.query(TableKind::AppConfig, &key).await.unwrap().is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
