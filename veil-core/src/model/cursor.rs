//! Incremental-sync cursors (spec §4.E): an opaque `(modified_at, id)` pair
//! per entity kind, persisted locally between sync runs.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CollectionId, FileId};

/// A cursor over one entity kind's change stream. Ascending order on
/// `(last_modified, last_id)`, tie-broken lexicographically on id
/// (spec §4.E) so a page boundary that splits same-timestamp entities is
/// still resumable without skipping or repeating one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor<Id> {
    pub last_modified: DateTime<Utc>,
    pub last_id: Id,
}

impl<Id: Ord + Clone> SyncCursor<Id> {
    pub fn new(last_modified: DateTime<Utc>, last_id: Id) -> Self {
        Self {
            last_modified,
            last_id,
        }
    }

    /// Whether `(modified_at, id)` lies strictly after this cursor, i.e.
    /// should be included in the next page.
    pub fn is_after(&self, modified_at: DateTime<Utc>, id: &Id) -> bool {
        (modified_at, id) > (self.last_modified, &self.last_id)
    }
}

/// The two independently-advancing cursors plus their ids, persisted as
/// one record per spec §3's `SyncState`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncState {
    pub last_collection_sync: Option<DateTime<Utc>>,
    pub last_collection_id: Option<CollectionId>,
    pub last_file_sync: Option<DateTime<Utc>>,
    pub last_file_id: Option<FileId>,
}

impl SyncState {
    pub fn collection_cursor(&self) -> Option<SyncCursor<CollectionId>> {
        match (&self.last_collection_sync, &self.last_collection_id) {
            (Some(ts), Some(id)) => Some(SyncCursor::new(*ts, id.clone())),
            _ => None,
        }
    }

    pub fn file_cursor(&self) -> Option<SyncCursor<FileId>> {
        match (&self.last_file_sync, &self.last_file_id) {
            (Some(ts), Some(id)) => Some(SyncCursor::new(*ts, id.clone())),
            _ => None,
        }
    }

    pub fn advance_collections(&mut self, modified_at: DateTime<Utc>, id: CollectionId) {
        self.last_collection_sync = Some(modified_at);
        self.last_collection_id = Some(id);
    }

    pub fn advance_files(&mut self, modified_at: DateTime<Utc>, id: FileId) {
        self.last_file_sync = Some(modified_at);
        self.last_file_id = Some(id);
    }
}
