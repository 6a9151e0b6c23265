//! Local Entity Store (spec §4.A): an ordered, byte-keyed KV abstraction.
//!
//! Grounded on the teacher's `storage::traits` (`Store` / `Transaction`
//! async trait pair) and on `sled` itself, adopted from the pack's
//! `tsturzl-sled` example as the concrete embedded engine -- the teacher's
//! own SQLite-backed `storage` doesn't give the ordered byte-range scans
//! the Reconciler needs for cursor-based sync.
pub mod keyspace;
pub mod sled_store;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage engine error: {0}")]
    Engine(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),
}

/// A single, ordered, byte-keyed collection of entries within the store
/// (one per entity kind plus one for sync state -- see `keyspace`).
pub trait KvStore: Send + Sync {
    fn get(&self, tree: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, tree: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    fn delete(&self, tree: &str, key: &[u8]) -> Result<(), StoreError>;

    /// Iterate a tree in ascending key order, starting strictly after
    /// `from` when given (used to resume from a cursor).
    fn iter_from(
        &self,
        tree: &str,
        from: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Apply `ops` to `tree` and persist `cursor_value` under
    /// `keyspace::SYNC_STATE`/`keyspace::SINGLETON_KEY` as a single atomic
    /// transaction (spec §4.A `OpenTransaction`/`Commit`): the entity
    /// writes and the cursor advance they belong to land together or not at
    /// all, so a crash between them never leaves a partial cursor advance
    /// (spec §4.F step 2c, invariant P6).
    fn commit_with_cursor(
        &self,
        tree: &str,
        ops: Vec<BatchOp>,
        cursor_value: &[u8],
    ) -> Result<(), StoreError>;

    /// Durably flush pending writes (spec §4.A: cursor advances must be
    /// flushed before the next batch is fetched).
    fn flush(&self) -> Result<(), StoreError>;
}

pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Serialize a value with the store's canonical encoding (spec §4.A:
/// deterministic, so values read back byte-identical to what a previous
/// process wrote).
pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(StoreError::from)
}

pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(StoreError::from)
}
