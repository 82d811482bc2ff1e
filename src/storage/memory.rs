use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::{KeyCondition, PersistenceGateway, TableKind, validate_record};

/// Keeps every table in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<TableKind, Vec<Map<String, Value>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Shared upsert used by the stores: replaces matching rows or appends.
pub(super) fn upsert(
    rows: &mut Vec<Map<String, Value>>,
    row: Map<String, Value>,
    key: &KeyCondition,
) {
    rows.retain(|existing| !key.matches(existing));
    rows.push(row);
}

#[async_trait]
impl PersistenceGateway for MemoryStore {
    async fn save(&self, table: TableKind, record: Value, key: &KeyCondition) -> Result<()> {
        let row = validate_record(table, &record)?;
        let mut tables = self.tables.lock().await;
        upsert(tables.entry(table).or_default(), row, key);
        Ok(())
    }

    async fn query(&self, table: TableKind, key: &KeyCondition) -> Result<Vec<Value>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| key.matches(row))
                    .map(|row| Value::Object(row.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, table: TableKind, key: &KeyCondition) -> Result<()> {
        if let Some(rows) = self.tables.lock().await.get_mut(&table) {
            rows.retain(|row| !key.matches(row));
        }
        Ok(())
    }
}
