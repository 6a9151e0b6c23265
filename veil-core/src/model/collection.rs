//! Collection: a hierarchical, encrypted container of files (spec §3).
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CollectionId, UserId};
use super::state::EntityState;
use super::{SyncEnvelope, SyncStatus};
use crate::crypto::Sealed;

/// Historical collection-key cap (spec §9: "suggested: 16").
pub const PREVIOUS_KEYS_CAP: usize = 16;

/// Maximum ancestor chain depth (invariant 3: "document as 64").
pub const MAX_ANCESTOR_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    Folder,
    Album,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    ReadOnly,
    ReadWrite,
    Admin,
}

/// A single historical wrapping of a rotated collection key (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyWrapping {
    pub key_version: u32,
    pub sealed: Sealed,
    pub rotated_at: String,
    pub rotated_reason: String,
    pub algorithm: String,
}

/// An access grant linking a recipient to this collection (GLOSSARY:
/// "Membership").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: UserId,
    pub permission_level: PermissionLevel,
    /// The collection key sealed for this recipient (sealed-box, or the
    /// owner's own symmetric wrapping for the owner's own membership).
    pub sealed_key_for_recipient: Vec<u8>,
    pub is_inherited: bool,
    pub inherited_from_id: Option<CollectionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub owner_id: UserId,
    pub created_by_user_id: UserId,
    pub modified_by_user_id: UserId,

    pub parent_id: Option<CollectionId>,
    /// Root -> leaf, never containing this collection's own id (invariant 3).
    pub ancestor_ids: Vec<CollectionId>,

    pub collection_type: CollectionType,

    pub encrypted_name: Sealed,
    /// The current per-collection symmetric key, sealed for the owner under
    /// the owner's master key.
    pub encrypted_collection_key: Sealed,
    pub previous_keys: Vec<KeyWrapping>,

    pub members: Vec<Membership>,

    pub state: EntityState,
    pub version: u64,
    pub tombstone_version: u64,
    pub tombstone_expiry: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub sync_status: SyncStatus,

    /// Populated only after the key chain has been traversed; never
    /// serialized to the KV store or the wire.
    #[serde(skip)]
    pub name: Option<String>,
}

impl SyncEnvelope for Collection {
    fn version(&self) -> u64 {
        self.version
    }
    fn state(&self) -> EntityState {
        self.state
    }
    fn tombstone_version(&self) -> u64 {
        self.tombstone_version
    }
    fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CollectionError {
    #[error("ancestor_ids must not contain the collection's own id")]
    SelfReferentialAncestry,
    #[error("ancestor depth {0} exceeds the maximum of {MAX_ANCESTOR_DEPTH}")]
    AncestorDepthExceeded(usize),
    #[error("moving into {target} would create a cycle through {moving}")]
    CycleDetected {
        moving: CollectionId,
        target: CollectionId,
    },
    #[error("user {0} already has a membership on this collection")]
    DuplicateMembership(UserId),
}

impl Collection {
    /// Invariant 3: ancestor_ids well-formedness.
    pub fn validate_ancestry(&self) -> Result<(), CollectionError> {
        if self.ancestor_ids.contains(&self.id) {
            return Err(CollectionError::SelfReferentialAncestry);
        }
        if self.ancestor_ids.len() > MAX_ANCESTOR_DEPTH {
            return Err(CollectionError::AncestorDepthExceeded(
                self.ancestor_ids.len(),
            ));
        }
        Ok(())
    }

    /// Invariant 4: a non-owner principal appears in `members` at most once.
    pub fn add_membership(&mut self, membership: Membership) -> Result<(), CollectionError> {
        if self
            .members
            .iter()
            .any(|m| m.user_id == membership.user_id)
        {
            return Err(CollectionError::DuplicateMembership(membership.user_id));
        }
        self.members.push(membership);
        Ok(())
    }

    pub fn remove_membership(&mut self, user_id: &UserId) {
        self.members.retain(|m| &m.user_id != user_id);
    }

    /// Pre-check against cyclic descendant graphs (spec §9): a move of
    /// `self` under `target` is illegal if `target`'s ancestor chain
    /// already contains `self`'s id.
    pub fn check_move_is_acyclic(
        &self,
        target_ancestor_ids: &[CollectionId],
        target_id: &CollectionId,
    ) -> Result<(), CollectionError> {
        if target_ancestor_ids.contains(&self.id) || target_id == &self.id {
            return Err(CollectionError::CycleDetected {
                moving: self.id.clone(),
                target: target_id.clone(),
            });
        }
        Ok(())
    }

    /// Record a key rotation, evicting the oldest historical wrapping once
    /// the cap (spec §9, suggested 16) is exceeded.
    pub fn rotate_key(&mut self, new_encrypted_key: Sealed, reason: &str, rotated_at: &str) {
        let previous_version = self
            .previous_keys
            .last()
            .map(|w| w.key_version + 1)
            .unwrap_or(1);

        let retiring = KeyWrapping {
            key_version: previous_version,
            sealed: std::mem::replace(&mut self.encrypted_collection_key, new_encrypted_key),
            rotated_at: rotated_at.to_string(),
            rotated_reason: reason.to_string(),
            algorithm: "xchacha20poly1305".to_string(),
        };
        self.previous_keys.push(retiring);

        if self.previous_keys.len() > PREVIOUS_KEYS_CAP {
            // Oldest-first eviction; `previous_keys` is maintained in
            // ascending rotation order, so the front is oldest.
            self.previous_keys.remove(0);
        }
    }
}
