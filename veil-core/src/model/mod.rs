//! Data model (spec §3): collections, files, cursors, and the user record.
pub mod collection;
pub mod cursor;
pub mod file;
pub mod ids;
pub mod state;
pub mod user;

use serde::{Deserialize, Serialize};

/// Local sync bookkeeping shared by both entity kinds (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    LocalOnly,
    CloudOnly,
    Synced,
    ModifiedLocally,
}

/// The sync-contract capability shared by `Collection` and `File` (spec §9:
/// "model this as a capability set ... rather than inheritance"). Anything
/// the Reconciler needs to compare, independent of entity kind, lives here.
pub trait SyncEnvelope {
    fn version(&self) -> u64;
    fn state(&self) -> state::EntityState;
    fn tombstone_version(&self) -> u64;
    fn modified_at(&self) -> chrono::DateTime<chrono::Utc>;
}
