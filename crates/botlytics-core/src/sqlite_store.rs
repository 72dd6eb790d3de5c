//! SQLite-backed ordered store.
//!
//! A single `rows` table keyed `(table_name, partition_key, row_key)` holds
//! every logical table; field bags are stored as JSON text. The composite
//! primary key gives the per-partition lexicographic row-key ordering the
//! codec needs, so `scan_range` is a plain `BETWEEN ... ORDER BY`.
//!
//! The connection sits behind an async mutex; every call is a short,
//! index-backed statement, so the lock is never held long and the
//! surrounding task model (one task per interaction) stays responsive.

use std::future::Future;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::store::{FieldMap, OrderedStore, merge_fields};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS rows (
    table_name    TEXT NOT NULL,
    partition_key TEXT NOT NULL,
    row_key       TEXT NOT NULL,
    fields        TEXT NOT NULL,
    PRIMARY KEY (table_name, partition_key, row_key)
);
";

/// Durable [`OrderedStore`] over a local SQLite database.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(unavailable)?;
        Self::init(conn)
    }

    /// Fully in-memory database, handy for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(unavailable)?;
        conn.execute_batch(SCHEMA).map_err(unavailable)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn unavailable(err: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn encode_fields(fields: &FieldMap) -> Result<String, StoreError> {
    serde_json::to_string(fields)
        .map_err(|e| StoreError::Unavailable(format!("field encoding failed: {e}")))
}

fn decode_fields(raw: &str) -> Result<FieldMap, StoreError> {
    serde_json::from_str(raw)
        .map_err(|e| StoreError::Unavailable(format!("stored fields corrupt: {e}")))
}

impl OrderedStore for SqliteStore {
    fn create_if_absent(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        fields: FieldMap,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        async move {
            let encoded = encode_fields(&fields)?;
            let conn = self.conn.lock().await;
            let inserted = conn
                .execute(
                    "INSERT INTO rows (table_name, partition_key, row_key, fields)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (table_name, partition_key, row_key) DO NOTHING",
                    params![table, partition_key, row_key, encoded],
                )
                .map_err(unavailable)?;
            if inserted == 0 {
                return Err(StoreError::Conflict);
            }
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
            let conn = self.conn.lock().await;
            let raw: Option<String> = conn
                .query_row(
                    "SELECT fields FROM rows
                     WHERE table_name = ?1 AND partition_key = ?2 AND row_key = ?3",
                    params![table, partition_key, row_key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(unavailable)?;
            match raw {
                Some(raw) => decode_fields(&raw),
                None => Err(StoreError::NotFound),
            }
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
            let mut conn = self.conn.lock().await;
            let tx = conn.transaction().map_err(unavailable)?;
            let raw: Option<String> = tx
                .query_row(
                    "SELECT fields FROM rows
                     WHERE table_name = ?1 AND partition_key = ?2 AND row_key = ?3",
                    params![table, partition_key, row_key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(unavailable)?;
            let Some(raw) = raw else {
                return Err(StoreError::NotFound);
            };
            let mut row = decode_fields(&raw)?;
            merge_fields(&mut row, fields);
            let encoded = encode_fields(&row)?;
            tx.execute(
                "UPDATE rows SET fields = ?4
                 WHERE table_name = ?1 AND partition_key = ?2 AND row_key = ?3",
                params![table, partition_key, row_key, encoded],
            )
            .map_err(unavailable)?;
            tx.commit().map_err(unavailable)
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
            let encoded = encode_fields(&fields)?;
            let conn = self.conn.lock().await;
            conn.execute(
                "INSERT INTO rows (table_name, partition_key, row_key, fields)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (table_name, partition_key, row_key)
                 DO UPDATE SET fields = excluded.fields",
                params![table, partition_key, row_key, encoded],
            )
            .map_err(unavailable)?;
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
            let conn = self.conn.lock().await;
            let mut stmt = conn
                .prepare(
                    "SELECT row_key, fields FROM rows
                     WHERE table_name = ?1 AND partition_key = ?2
                       AND row_key BETWEEN ?3 AND ?4
                     ORDER BY row_key ASC LIMIT ?5",
                )
                .map_err(unavailable)?;
            let mapped = stmt
                .query_map(
                    params![table, partition_key, from_key, to_key, limit as i64],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .map_err(unavailable)?;
            let mut out = Vec::new();
            for item in mapped {
                let (key, raw) = item.map_err(unavailable)?;
                out.push((key, decode_fields(&raw)?));
            }
            Ok(out)
        }
    }
}
