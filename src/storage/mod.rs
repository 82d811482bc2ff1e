//! Persistence of ring configuration.
//! Rows are JSON objects; every table is described by a static [`TableSchema`].

mod json_file;
mod memory;
mod schema;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use schema::{TableKind, TableSchema};

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Equality match on one or more fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyCondition {
    terms: Vec<(String, Value)>,
}

impl KeyCondition {
    /// Matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    pub fn and(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.terms.push((field.to_string(), value.into()));
        self
    }

    pub fn matches(&self, row: &Map<String, Value>) -> bool {
        self.terms
            .iter()
            .all(|(field, value)| row.get(field) == Some(value))
    }
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Replaces the rows matching `key` with `record`, or inserts it.
    async fn save(&self, table: TableKind, record: Value, key: &KeyCondition) -> Result<()>;

    async fn query(&self, table: TableKind, key: &KeyCondition) -> Result<Vec<Value>>;

    async fn delete(&self, table: TableKind, key: &KeyCondition) -> Result<()>;
}

/// Checks that `record` is an object with only known fields and a full primary key.
pub fn validate_record(table: TableKind, record: &Value) -> Result<Map<String, Value>> {
    let schema = table.schema();
    let Value::Object(row) = record else {
        bail!("{} rows must be JSON objects", schema.name);
    };
    if let Some(unknown) = row.keys().find(|k| !schema.fields.contains(&k.as_str())) {
        bail!("{} has no field {}", schema.name, unknown);
    }
    if let Some(missing) = schema.primary_key.iter().find(|k| !row.contains_key(**k)) {
        bail!("{} row is missing key field {}", schema.name, missing);
    }
    Ok(row.clone())
}

/// Saves a serializable value as a row.
pub async fn save_row<T: Serialize + ?Sized>(
    store: &dyn PersistenceGateway,
    table: TableKind,
    value: &T,
    key: &KeyCondition,
) -> Result<()> {
    store.save(table, serde_json::to_value(value)?, key).await
}

/// Loads and deserializes the rows matching `key`.
pub async fn load_rows<T: DeserializeOwned>(
    store: &dyn PersistenceGateway,
    table: TableKind,
    key: &KeyCondition,
) -> Result<Vec<T>> {
    store
        .query(table, key)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(Into::into))
        .collect()
}

/// Loads the first row matching `key`, if any.
pub async fn load_row<T: DeserializeOwned>(
    store: &dyn PersistenceGateway,
    table: TableKind,
    key: &KeyCondition,
) -> Result<Option<T>> {
    Ok(load_rows(store, table, key).await?.into_iter().next())
}
