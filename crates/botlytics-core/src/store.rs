//! Ordered partitioned store — the collaborator contract.
//!
//! The orchestrator depends on exactly four write/read primitives, plus the
//! guarantee that [`StoreError::NotFound`] and [`StoreError::Conflict`] are
//! distinguishable from every other failure. Each table offers, per
//! partition, a total lexicographic ordering over string row keys; combined
//! with the inverse-timestamp key layout this makes an ascending range scan
//! a newest-first read.
//!
//! Backends in this crate: [`crate::memory_store::MemoryStore`] and
//! [`crate::sqlite_store::SqliteStore`].

use std::future::Future;

use serde_json::Value;

use crate::error::StoreError;

/// Non-key columns of a row, merged or replaced as a unit of supplied
/// fields. Opaque to the store.
pub type FieldMap = serde_json::Map<String, Value>;

/// Logical table names used by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub users: String,
    pub sessions: String,
    pub interactions: String,
    pub events: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            users: "users".to_string(),
            sessions: "sessions".to_string(),
            interactions: "interactions".to_string(),
            events: "events".to_string(),
        }
    }
}

/// The four store primitives (plus a range scan for newest-first reads).
///
/// Semantics:
/// - `create_if_absent` fails with [`StoreError::Conflict`] when the row
///   already exists.
/// - `get_one` fails with [`StoreError::NotFound`] when it does not.
/// - `merge_update` updates only the supplied fields, leaving others
///   untouched; fails with [`StoreError::NotFound`] when the row is absent.
/// - `upsert_replace` unconditionally creates or replaces the whole row.
///
/// The orchestrator uses only those four; `scan_range` exists for callers
/// building "latest N" reads from [`crate::row_key::lower_bound`] /
/// [`crate::row_key::upper_bound`] pairs.
pub trait OrderedStore: Send + Sync {
    /// Create the row, failing if it already exists.
    fn create_if_absent(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        fields: FieldMap,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Fetch a single row.
    fn get_one(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> impl Future<Output = Result<FieldMap, StoreError>> + Send;

    /// Merge the supplied fields into an existing row.
    fn merge_update(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        fields: FieldMap,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Unconditionally create or replace the row.
    fn upsert_replace(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        fields: FieldMap,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Rows with `from_key <= row_key <= to_key`, in ascending key order
    /// (newest first under the inverse-timestamp layout), up to `limit`.
    fn scan_range(
        &self,
        table: &str,
        partition_key: &str,
        from_key: &str,
        to_key: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<(String, FieldMap)>, StoreError>> + Send;
}

/// Merge `incoming` into `existing`, field by field (last write wins per
/// field).
pub(crate) fn merge_fields(existing: &mut FieldMap, incoming: FieldMap) {
    for (key, value) in incoming {
        existing.insert(key, value);
    }
}
