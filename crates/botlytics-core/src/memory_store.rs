//! In-memory ordered store backend.
//!
//! `BTreeMap` row storage preserves the lexicographic row-key ordering the
//! codec relies on. Tables and partitions materialize lazily on first
//! write, mirroring how the remote collaborator creates tables on demand.
//! Intended for tests and the CLI; not durable.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;

use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::store::{FieldMap, OrderedStore, merge_fields};

type Rows = BTreeMap<String, FieldMap>;
type Partitions = HashMap<String, Rows>;

/// Non-durable [`OrderedStore`] over nested maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Partitions>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held in `table`, across partitions.
    pub async fn row_count(&self, table: &str) -> usize {
        let tables = self.tables.lock().await;
        tables
            .get(table)
            .map_or(0, |partitions| partitions.values().map(BTreeMap::len).sum())
    }
}

impl OrderedStore for MemoryStore {
    fn create_if_absent(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        fields: FieldMap,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        async move {
            let mut tables = self.tables.lock().await;
            let rows = tables
                .entry(table.to_string())
                .or_default()
                .entry(partition_key.to_string())
                .or_default();
            if rows.contains_key(row_key) {
                return Err(StoreError::Conflict);
            }
            rows.insert(row_key.to_string(), fields);
            Ok(())
        }
    }

    fn get_one(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> impl Future<Output = Result<FieldMap, StoreError>> + Send {
        async move {
            let tables = self.tables.lock().await;
            tables
                .get(table)
                .and_then(|partitions| partitions.get(partition_key))
                .and_then(|rows| rows.get(row_key))
                .cloned()
                .ok_or(StoreError::NotFound)
        }
    }

    fn merge_update(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        fields: FieldMap,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        async move {
            let mut tables = self.tables.lock().await;
            let row = tables
                .get_mut(table)
                .and_then(|partitions| partitions.get_mut(partition_key))
                .and_then(|rows| rows.get_mut(row_key))
                .ok_or(StoreError::NotFound)?;
            merge_fields(row, fields);
            Ok(())
        }
    }

    fn upsert_replace(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        fields: FieldMap,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        async move {
            let mut tables = self.tables.lock().await;
            tables
                .entry(table.to_string())
                .or_default()
                .entry(partition_key.to_string())
                .or_default()
                .insert(row_key.to_string(), fields);
            Ok(())
        }
    }

    fn scan_range(
        &self,
        table: &str,
        partition_key: &str,
        from_key: &str,
        to_key: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<(String, FieldMap)>, StoreError>> + Send {
        async move {
            if from_key > to_key {
                return Ok(Vec::new());
            }
            let tables = self.tables.lock().await;
            let Some(rows) = tables
                .get(table)
                .and_then(|partitions| partitions.get(partition_key))
            else {
                return Ok(Vec::new());
            };
            Ok(rows
                .range(from_key.to_string()..=to_key.to_string())
                .take(limit)
                .map(|(key, fields)| (key.clone(), fields.clone()))
                .collect())
        }
    }
}
