//! Cloud DTO Client (spec §4.C): the boundary between this crate and the
//! backend's sync API.
//!
//! Grounded on the teacher's `bae_cloud_api.rs` (JSON DTOs over `reqwest`,
//! bearer auth, one refresh-and-retry on 401) and `retry.rs` (exponential
//! backoff for transient network failures).
pub mod fake;
pub mod http;
pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::model::ids::{CollectionId, FileId};

/// One page of changed collections or files, as the cloud returns them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePage<T> {
    pub items: Vec<T>,
    /// `true` when this page exhausted everything newer than the cursor
    /// that was sent.
    pub is_last_page: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionDto {
    pub id: CollectionId,
    pub owner_id: String,
    pub created_by_user_id: String,
    pub modified_by_user_id: String,
    pub parent_id: Option<CollectionId>,
    pub ancestor_ids: Vec<CollectionId>,
    pub collection_type: String,
    pub encrypted_name: EncryptedPayloadDto,
    pub encrypted_collection_key: EncryptedPayloadDto,
    pub previous_keys: Vec<KeyWrappingDto>,
    pub members: Vec<MembershipDto>,
    pub state: String,
    pub version: u64,
    pub tombstone_version: u64,
    pub tombstone_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDto {
    pub id: FileId,
    pub collection_id: CollectionId,
    pub owner_id: String,
    pub created_by_user_id: String,
    pub modified_by_user_id: String,
    pub encrypted_file_key: EncryptedPayloadDto,
    pub encrypted_metadata: EncryptedPayloadDto,
    pub content_hash: Option<String>,
    pub size_bytes: Option<u64>,
    pub state: String,
    pub version: u64,
    pub tombstone_version: u64,
    pub tombstone_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedPayloadDto {
    pub ciphertext: String,
    pub nonce: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyWrappingDto {
    pub key_version: u32,
    pub sealed: EncryptedPayloadDto,
    pub rotated_at: String,
    pub rotated_reason: String,
    pub algorithm: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipDto {
    pub user_id: String,
    pub permission_level: String,
    pub sealed_key_for_recipient: String,
    pub is_inherited: bool,
    pub inherited_from_id: Option<CollectionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
}

/// Everything the Sync Orchestrator and the Sharing Coordinator need from
/// the backend (spec §4.C). Implemented once for production (`http`) and
/// once as an in-memory fake for tests.
#[async_trait]
pub trait CloudClient: Send + Sync {
    async fn login(&self, email: &str, password_hash: &str) -> Result<LoginResponse, SyncError>;
    async fn refresh(&self, refresh_token: &str) -> Result<LoginResponse, SyncError>;

    async fn pull_collections(
        &self,
        cursor: Option<(DateTime<Utc>, CollectionId)>,
        page_size: usize,
    ) -> Result<ChangePage<CollectionDto>, SyncError>;

    async fn pull_files(
        &self,
        cursor: Option<(DateTime<Utc>, FileId)>,
        page_size: usize,
    ) -> Result<ChangePage<FileDto>, SyncError>;

    async fn push_collection(&self, collection: CollectionDto) -> Result<CollectionDto, SyncError>;
    async fn push_file(&self, file: FileDto) -> Result<FileDto, SyncError>;

    /// `POST /collections/:id/share` (spec §4.G step 4).
    async fn share_collection(
        &self,
        collection_id: &CollectionId,
        recipient_id: &str,
        permission_level: &str,
        sealed_collection_key: Vec<u8>,
        share_with_descendants: bool,
    ) -> Result<(), SyncError>;

    /// `POST /collections/:id/unshare`.
    async fn unshare_collection(
        &self,
        collection_id: &CollectionId,
        recipient_id: &str,
    ) -> Result<(), SyncError>;
}
