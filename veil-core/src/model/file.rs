//! File: an encrypted object stored within a collection (spec §3).
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CollectionId, FileId, UserId};
use super::state::EntityState;
use super::{SyncEnvelope, SyncStatus};
use crate::crypto::Sealed;

/// Where plaintext bytes for this file currently live on the local device
/// (spec §3, GLOSSARY "StorageMode").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Only the encrypted blob is held locally; plaintext must be
    /// re-derived through the key chain before use.
    EncryptedOnly,
    /// Only a decrypted copy is held locally (e.g. freshly imported,
    /// not yet uploaded).
    DecryptedOnly,
    /// Both an encrypted blob and a decrypted copy are cached locally.
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub id: FileId,
    pub collection_id: CollectionId,
    pub owner_id: UserId,
    pub created_by_user_id: UserId,
    pub modified_by_user_id: UserId,

    pub encrypted_file_key: Sealed,
    /// Arbitrary file metadata (original filename, mime type, size, ...)
    /// sealed under `file_key`, not `collection_key` -- only someone who
    /// has already unwrapped the file key can read it.
    pub encrypted_metadata: Sealed,

    pub storage_mode: StorageMode,
    /// Path to the encrypted blob on local disk, if `storage_mode` holds one.
    pub encrypted_blob_path: Option<String>,
    /// Path to a decrypted cache copy on local disk, if `storage_mode` holds one.
    pub decrypted_blob_path: Option<String>,
    pub content_hash: Option<String>,
    pub size_bytes: Option<u64>,

    pub state: EntityState,
    pub version: u64,
    pub tombstone_version: u64,
    pub tombstone_expiry: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub sync_status: SyncStatus,

    /// Populated only after the file key chain has been traversed; never
    /// serialized to the KV store or the wire.
    #[serde(skip)]
    pub decrypted_metadata: Option<Vec<u8>>,
}

impl SyncEnvelope for File {
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
pub enum FileError {
    #[error("storage_mode {0:?} requires an encrypted_blob_path")]
    MissingEncryptedPath(StorageMode),
    #[error("storage_mode {0:?} requires a decrypted_blob_path")]
    MissingDecryptedPath(StorageMode),
}

impl File {
    /// `storage_mode` implies which local paths must be present (spec §3).
    pub fn validate_storage_paths(&self) -> Result<(), FileError> {
        match self.storage_mode {
            StorageMode::EncryptedOnly => {
                if self.encrypted_blob_path.is_none() {
                    return Err(FileError::MissingEncryptedPath(self.storage_mode));
                }
            }
            StorageMode::DecryptedOnly => {
                if self.decrypted_blob_path.is_none() {
                    return Err(FileError::MissingDecryptedPath(self.storage_mode));
                }
            }
            StorageMode::Hybrid => {
                if self.encrypted_blob_path.is_none() {
                    return Err(FileError::MissingEncryptedPath(self.storage_mode));
                }
                if self.decrypted_blob_path.is_none() {
                    return Err(FileError::MissingDecryptedPath(self.storage_mode));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed() -> Sealed {
        Sealed {
            ciphertext: vec![1, 2, 3],
            nonce: [0u8; 24],
        }
    }

    fn file(mode: StorageMode) -> File {
        File {
            id: FileId::from("f1"),
            collection_id: CollectionId::from("c1"),
            owner_id: UserId::from("u1"),
            created_by_user_id: UserId::from("u1"),
            modified_by_user_id: UserId::from("u1"),
            encrypted_file_key: sealed(),
            encrypted_metadata: sealed(),
            storage_mode: mode,
            encrypted_blob_path: None,
            decrypted_blob_path: None,
            content_hash: None,
            size_bytes: None,
            state: EntityState::Active,
            version: 1,
            tombstone_version: 0,
            tombstone_expiry: None,
            created_at: Utc::now(),
            modified_at: Utc::now(),
            sync_status: SyncStatus::Synced,
            decrypted_metadata: None,
        }
    }

    #[test]
    fn encrypted_only_requires_encrypted_path() {
        let f = file(StorageMode::EncryptedOnly);
        assert!(f.validate_storage_paths().is_err());
    }

    #[test]
    fn hybrid_requires_both_paths() {
        let mut f = file(StorageMode::Hybrid);
        f.encrypted_blob_path = Some("/tmp/e".into());
        assert!(f.validate_storage_paths().is_err());
        f.decrypted_blob_path = Some("/tmp/d".into());
        assert!(f.validate_storage_paths().is_ok());
    }
}
