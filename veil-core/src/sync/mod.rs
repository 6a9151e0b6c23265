//! The Sync Orchestrator (spec §4.F): drives batched, cursor-resumable
//! pull-and-reconcile loops for collections and files, under a soft
//! wall-clock deadline and a cooperative cancellation token.
//!
//! Grounded on the teacher's `sync::service`/`sync::session` (the
//! batch-loop-with-deadline shape) and `sync::pull` (cursor paging).
pub mod convert;

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cloud::CloudClient;
use crate::config::Config;
use crate::crypto::{aead, chain, Key32};
use crate::error::SyncError;
use crate::model::collection::Collection;
use crate::model::cursor::SyncState;
use crate::model::file::File;
use crate::model::ids::{CollectionId, FileId};
use crate::reconcile::{reconcile, ReconcileOutcome};
use crate::store::{decode, encode, keyspace, BatchOp, KvStore};

/// Per-entity-kind outcome tally for one sync run (spec §8 scenarios 1-3
/// name these counters `added`/`updated`/`deleted` explicitly).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub added: u64,
    pub updated: u64,
    pub deleted: u64,
    pub no_op: u64,
    pub conflicts: u64,
    pub batches: u32,
}

impl SyncReport {
    fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Applied => self.added += 1,
            ReconcileOutcome::Updated => self.updated += 1,
            ReconcileOutcome::Tombstoned => self.deleted += 1,
            ReconcileOutcome::NoOp => self.no_op += 1,
            ReconcileOutcome::Conflict => self.conflicts += 1,
        }
    }
}

pub struct Orchestrator {
    store: Arc<dyn KvStore>,
    cloud: Arc<dyn CloudClient>,
    config: Config,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn KvStore>, cloud: Arc<dyn CloudClient>, config: Config) -> Self {
        Self {
            store,
            cloud,
            config,
        }
    }

    fn load_sync_state(&self) -> Result<SyncState, SyncError> {
        match self
            .store
            .get(keyspace::SYNC_STATE, keyspace::SINGLETON_KEY)?
        {
            Some(bytes) => Ok(decode(&bytes)?),
            None => Ok(SyncState::default()),
        }
    }

    /// Batch-pull and reconcile collections until a page reports
    /// `is_last_page`, the deadline elapses, or `max_batches` is reached
    /// (spec §4.F). `master_key` unwraps each collection's own key so its
    /// name can be decrypted as it is materialized (spec §4.B, §8 scenario 4).
    pub async fn sync_collections(
        &self,
        master_key: &Key32,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let deadline = Instant::now() + self.config.soft_deadline();
        let mut state = self.load_sync_state()?;
        let mut report = SyncReport::default();

        loop {
            if cancel.is_cancelled() {
                info!("sync_collections cancelled");
                break;
            }
            if Instant::now() >= deadline {
                warn!("sync_collections hit its soft deadline, stopping early");
                break;
            }
            if report.batches >= self.config.max_batches {
                warn!(max_batches = self.config.max_batches, "batch cap reached");
                break;
            }

            let cursor = state
                .collection_cursor()
                .map(|c| (c.last_modified, c.last_id));
            let page = self
                .cloud
                .pull_collections(cursor, self.config.page_size)
                .await?;
            report.batches += 1;

            // Accumulated in memory only; nothing durable changes until the
            // single `commit_with_cursor` call below lands them together
            // with the cursor advance (spec §4.A, §4.F step 2c, invariant P6).
            let mut ops = Vec::with_capacity(page.items.len());
            let mut batch_state = state.clone();
            for dto in &page.items {
                match self.plan_collection(dto, master_key, &mut report) {
                    Ok(Some(op)) => ops.push(op),
                    Ok(None) => {}
                    Err(SyncError::Decrypt(e)) => {
                        warn!(id = %dto.id, error = %e, "skipping collection, decrypt failed");
                    }
                    Err(SyncError::State(e)) => {
                        warn!(id = %dto.id, error = %e, "skipping collection, invalid state");
                    }
                    Err(e) if !e.is_fatal() => {
                        warn!(id = %dto.id, error = %e, "skipping collection");
                    }
                    Err(e) => return Err(e),
                }
                batch_state.advance_collections(dto.modified_at, dto.id.clone());
            }

            // Re-checked here, not just at the top of the loop: a cancel
            // requested while this page was being pulled or reconciled must
            // still discard the whole batch rather than commit it (spec §5
            // "the in-flight batch is discarded (transaction rolled back)").
            if cancel.is_cancelled() {
                info!("sync_collections cancelled before committing the batch, discarding it");
                break;
            }

            self.store.commit_with_cursor(
                keyspace::COLLECTIONS,
                ops,
                &encode(&batch_state)?,
            )?;
            self.store.flush()?;
            state = batch_state;

            if page.is_last_page {
                break;
            }
        }

        debug!(?report, "sync_collections finished");
        Ok(report)
    }

    /// Decide what, if anything, this collection DTO should write, and
    /// decrypt its name when it is about to be materialized (spec §4.E
    /// steps 2-3: "fetch, decrypt, and materialize").
    fn plan_collection(
        &self,
        dto: &crate::cloud::CollectionDto,
        master_key: &Key32,
        report: &mut SyncReport,
    ) -> Result<Option<BatchOp>, SyncError> {
        let mut remote = convert::dto_to_collection(dto)?;
        let key = dto.id.as_str().as_bytes().to_vec();
        let local_bytes = self.store.get(keyspace::COLLECTIONS, &key)?;
        let local: Option<Collection> = local_bytes.map(|b| decode(&b)).transpose()?;

        let outcome = reconcile(local.as_ref(), &remote);
        match outcome {
            ReconcileOutcome::Applied | ReconcileOutcome::Updated => {
                self.decrypt_collection_name(&mut remote, master_key)?;
                report.record(outcome);
                Ok(Some(BatchOp::Put(key, encode(&remote)?)))
            }
            ReconcileOutcome::Tombstoned => {
                report.record(outcome);
                Ok(Some(BatchOp::Delete(key)))
            }
            ReconcileOutcome::NoOp | ReconcileOutcome::Conflict => {
                report.record(outcome);
                Ok(None)
            }
        }
    }

    /// `master_key -> collection_key -> name` (spec §4.B), trying the
    /// current collection key then each historical wrapping newest-to-oldest
    /// (invariant 6) before giving up.
    fn decrypt_collection_name(
        &self,
        collection: &mut Collection,
        master_key: &Key32,
    ) -> Result<(), SyncError> {
        let candidates = chain::collection_key_candidates(
            master_key,
            &collection.encrypted_collection_key,
            &collection.previous_keys,
        );
        let plaintext = chain::open_with_fallback(&collection.encrypted_name, &candidates)?;
        collection.name = Some(String::from_utf8_lossy(&plaintext).into_owned());
        Ok(())
    }

    /// Batch-pull and reconcile files, mirroring `sync_collections`.
    /// `master_key` reaches each file's metadata via its owning collection's
    /// key, which `full_sync` guarantees is already materialized locally.
    pub async fn sync_files(
        &self,
        master_key: &Key32,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let deadline = Instant::now() + self.config.soft_deadline();
        let mut state = self.load_sync_state()?;
        let mut report = SyncReport::default();

        loop {
            if cancel.is_cancelled() {
                info!("sync_files cancelled");
                break;
            }
            if Instant::now() >= deadline {
                warn!("sync_files hit its soft deadline, stopping early");
                break;
            }
            if report.batches >= self.config.max_batches {
                warn!(max_batches = self.config.max_batches, "batch cap reached");
                break;
            }

            let cursor = state.file_cursor().map(|c| (c.last_modified, c.last_id));
            let page = self
                .cloud
                .pull_files(cursor, self.config.page_size)
                .await?;
            report.batches += 1;

            let mut ops = Vec::with_capacity(page.items.len());
            let mut batch_state = state.clone();
            for dto in &page.items {
                match self.plan_file(dto, master_key, &mut report) {
                    Ok(Some(op)) => ops.push(op),
                    Ok(None) => {}
                    Err(SyncError::Decrypt(e)) => {
                        warn!(id = %dto.id, error = %e, "skipping file, decrypt failed");
                    }
                    Err(e) if !e.is_fatal() => {
                        warn!(id = %dto.id, error = %e, "skipping file");
                    }
                    Err(e) => return Err(e),
                }
                batch_state.advance_files(dto.modified_at, dto.id.clone());
            }

            if cancel.is_cancelled() {
                info!("sync_files cancelled before committing the batch, discarding it");
                break;
            }

            self.store
                .commit_with_cursor(keyspace::FILES, ops, &encode(&batch_state)?)?;
            self.store.flush()?;
            state = batch_state;

            if page.is_last_page {
                break;
            }
        }

        debug!(?report, "sync_files finished");
        Ok(report)
    }

    fn plan_file(
        &self,
        dto: &crate::cloud::FileDto,
        master_key: &Key32,
        report: &mut SyncReport,
    ) -> Result<Option<BatchOp>, SyncError> {
        let mut remote = convert::dto_to_file(dto)?;
        let key = dto.id.as_str().as_bytes().to_vec();
        let local_bytes = self.store.get(keyspace::FILES, &key)?;
        let local: Option<File> = local_bytes.map(|b| decode(&b)).transpose()?;

        let outcome = reconcile(local.as_ref(), &remote);
        match outcome {
            ReconcileOutcome::Applied | ReconcileOutcome::Updated => {
                self.decrypt_file_metadata(&mut remote, master_key)?;
                report.record(outcome);
                Ok(Some(BatchOp::Put(key, encode(&remote)?)))
            }
            ReconcileOutcome::Tombstoned => {
                report.record(outcome);
                Ok(Some(BatchOp::Delete(key)))
            }
            ReconcileOutcome::NoOp | ReconcileOutcome::Conflict => {
                report.record(outcome);
                Ok(None)
            }
        }
    }

    /// `master_key -> collection_key -> file_key -> metadata` (spec §4.B).
    /// The owning collection must already be materialized locally -- true
    /// for any run reached through `full_sync`, which syncs collections
    /// first for exactly this reason.
    fn decrypt_file_metadata(&self, file: &mut File, master_key: &Key32) -> Result<(), SyncError> {
        let collection_bytes = self
            .store
            .get(keyspace::COLLECTIONS, file.collection_id.as_str().as_bytes())?
            .ok_or_else(|| {
                SyncError::Validation(format!(
                    "no local collection {} to derive a key for file {}",
                    file.collection_id, file.id
                ))
            })?;
        let collection: Collection = decode(&collection_bytes)?;

        let candidates = chain::collection_key_candidates(
            master_key,
            &collection.encrypted_collection_key,
            &collection.previous_keys,
        );
        let file_key = chain::unwrap_file_key(&candidates, &file.encrypted_file_key)?;
        let plaintext = aead::open(&file_key, &file.encrypted_metadata)?;
        file.decrypted_metadata = Some(plaintext.to_vec());
        Ok(())
    }

    /// Collections first, then files (spec §4.F: a file can't usefully be
    /// materialized before the collection that owns its key chain exists).
    pub async fn full_sync(
        &self,
        master_key: &Key32,
        cancel: &CancellationToken,
    ) -> Result<(SyncReport, SyncReport), SyncError> {
        let collections = self.sync_collections(master_key, cancel).await?;
        let files = self.sync_files(master_key, cancel).await?;
        Ok((collections, files))
    }

    pub fn get_collection(
        &self,
        id: &CollectionId,
    ) -> Result<Option<crate::model::collection::Collection>, SyncError> {
        let bytes = self.store.get(keyspace::COLLECTIONS, id.as_str().as_bytes())?;
        bytes.map(|b| decode(&b)).transpose().map_err(Into::into)
    }

    pub fn get_file(&self, id: &FileId) -> Result<Option<crate::model::file::File>, SyncError> {
        let bytes = self.store.get(keyspace::FILES, id.as_str().as_bytes())?;
        bytes.map(|b| decode(&b)).transpose().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::fake::FakeCloudClient;
    use crate::cloud::{CollectionDto, FileDto};
    use crate::store::sled_store::SledStore;
    use chrono::Utc;
    use zeroize::Zeroizing;

    fn config() -> Config {
        Config {
            cloud_base_url: "https://example.invalid".to_string(),
            data_dir: std::path::PathBuf::from("/tmp/unused"),
            page_size: 50,
            max_batches: 100,
            soft_deadline_secs: 300,
            http_timeout_secs: 30,
        }
    }

    fn master_key() -> Key32 {
        Zeroizing::new([3u8; 32])
    }

    /// A collection DTO whose name and collection key genuinely decrypt
    /// under `master_key`, matching what `FakeCloudClient` would serve for
    /// a real account.
    fn dummy_collection_dto(id: &str, version: u64, master_key: &Key32, name: &[u8]) -> CollectionDto {
        let collection_key: Key32 = Zeroizing::new([5u8; 32]);
        let encrypted_collection_key = aead::seal(master_key, collection_key.as_ref());
        let encrypted_name = aead::seal(&collection_key, name);
        CollectionDto {
            id: CollectionId::from(id),
            owner_id: "u1".to_string(),
            created_by_user_id: "u1".to_string(),
            modified_by_user_id: "u1".to_string(),
            parent_id: None,
            ancestor_ids: vec![],
            collection_type: "album".to_string(),
            encrypted_name: convert::sealed_to_dto(&encrypted_name),
            encrypted_collection_key: convert::sealed_to_dto(&encrypted_collection_key),
            previous_keys: vec![],
            members: vec![],
            state: "active".to_string(),
            version,
            tombstone_version: 0,
            tombstone_expiry: None,
            created_at: Utc::now(),
            modified_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sync_collections_applies_a_single_page() {
        let store = Arc::new(SledStore::temporary().unwrap());
        let cloud = Arc::new(FakeCloudClient::new());
        let master_key = master_key();
        cloud.seed_collection(dummy_collection_dto("c1", 1, &master_key, b"vacation"));

        let orchestrator = Orchestrator::new(store, cloud, config());
        let cancel = CancellationToken::new();
        let report = orchestrator
            .sync_collections(&master_key, &cancel)
            .await
            .unwrap();

        assert_eq!(report.added, 1);
        assert!(orchestrator
            .get_collection(&CollectionId::from("c1"))
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn re_syncing_unchanged_collection_is_a_no_op() {
        let store = Arc::new(SledStore::temporary().unwrap());
        let cloud = Arc::new(FakeCloudClient::new());
        let master_key = master_key();
        cloud.seed_collection(dummy_collection_dto("c1", 1, &master_key, b"vacation"));

        let orchestrator = Orchestrator::new(store, cloud, config());
        let cancel = CancellationToken::new();
        orchestrator
            .sync_collections(&master_key, &cancel)
            .await
            .unwrap();
        let second = orchestrator.sync_collections(&master_key, &cancel).await.unwrap();

        // The cursor already advanced past c1, so the second run sees nothing new.
        assert_eq!(second.added, 0);
        assert_eq!(second.no_op, 0);
    }

    #[tokio::test]
    async fn a_collection_that_fails_to_decrypt_is_skipped_not_materialized() {
        let store = Arc::new(SledStore::temporary().unwrap());
        let cloud = Arc::new(FakeCloudClient::new());
        let master_key = master_key();
        // Sealed under a key the account's master_key cannot unwrap.
        let wrong_key: Key32 = Zeroizing::new([9u8; 32]);
        cloud.seed_collection(dummy_collection_dto("c1", 1, &wrong_key, b"vacation"));

        let orchestrator = Orchestrator::new(store, cloud, config());
        let cancel = CancellationToken::new();
        let report = orchestrator
            .sync_collections(&master_key, &cancel)
            .await
            .unwrap();

        assert_eq!(report.added, 0);
        assert!(orchestrator
            .get_collection(&CollectionId::from("c1"))
            .unwrap()
            .is_none());
    }

    /// Spec §8 scenario 4: a file whose key was sealed under a since-rotated
    /// collection key must still decrypt during sync by falling back to
    /// `previous_keys` (invariant 6).
    #[tokio::test]
    async fn scenario_4_sync_files_decrypts_through_a_rotated_collection_key() {
        let store = Arc::new(SledStore::temporary().unwrap());
        let cloud = Arc::new(FakeCloudClient::new());
        let master_key = master_key();

        let v1: Key32 = Zeroizing::new([11u8; 32]);
        let v2: Key32 = Zeroizing::new([22u8; 32]);
        let sealed_v1 = aead::seal(&master_key, v1.as_ref());
        let sealed_v2 = aead::seal(&master_key, v2.as_ref());

        cloud.seed_collection(CollectionDto {
            id: CollectionId::from("c1"),
            owner_id: "u1".to_string(),
            created_by_user_id: "u1".to_string(),
            modified_by_user_id: "u1".to_string(),
            parent_id: None,
            ancestor_ids: vec![],
            collection_type: "album".to_string(),
            encrypted_name: convert::sealed_to_dto(&aead::seal(&v2, b"vacation")),
            encrypted_collection_key: convert::sealed_to_dto(&sealed_v2),
            previous_keys: vec![crate::cloud::KeyWrappingDto {
                key_version: 1,
                sealed: convert::sealed_to_dto(&sealed_v1),
                rotated_at: "2026-01-01T00:00:00Z".to_string(),
                rotated_reason: "manual".to_string(),
                algorithm: "xchacha20poly1305".to_string(),
            }],
            members: vec![],
            state: "active".to_string(),
            version: 1,
            tombstone_version: 0,
            tombstone_expiry: None,
            created_at: Utc::now(),
            modified_at: Utc::now(),
        });

        // The file's key was sealed under v1, before rotation to v2.
        let file_key: Key32 = Zeroizing::new([33u8; 32]);
        let encrypted_file_key = aead::seal(&v1, file_key.as_ref());
        let encrypted_metadata = aead::seal(&file_key, b"holiday.jpg");

        cloud.seed_file(FileDto {
            id: FileId::from("f1"),
            collection_id: CollectionId::from("c1"),
            owner_id: "u1".to_string(),
            created_by_user_id: "u1".to_string(),
            modified_by_user_id: "u1".to_string(),
            encrypted_file_key: convert::sealed_to_dto(&encrypted_file_key),
            encrypted_metadata: convert::sealed_to_dto(&encrypted_metadata),
            content_hash: None,
            size_bytes: Some(1024),
            state: "active".to_string(),
            version: 1,
            tombstone_version: 0,
            tombstone_expiry: None,
            created_at: Utc::now(),
            modified_at: Utc::now(),
        });

        let orchestrator = Orchestrator::new(store, cloud, config());
        let cancel = CancellationToken::new();
        let (collections, files) = orchestrator.full_sync(&master_key, &cancel).await.unwrap();

        // `plan_file` only emits a write once `decrypt_file_metadata`
        // succeeds, so `added == 1` here is only reachable if the v1
        // fallback candidate actually unwrapped the file key and the
        // metadata decrypted under it.
        assert_eq!(collections.added, 1);
        assert_eq!(files.added, 1);
        assert!(orchestrator
            .get_file(&FileId::from("f1"))
            .unwrap()
            .is_some());
    }
}
