//! An in-memory `CloudClient` for exercising the Reconciler and Orchestrator
//! without a network (spec §4.C: "implementations must be substitutable").
#![cfg(any(test, feature = "test-utils"))]
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ChangePage, CloudClient, CollectionDto, FileDto, LoginResponse};
use crate::error::SyncError;
use crate::model::ids::{CollectionId, FileId};

#[derive(Default)]
pub struct FakeCloudClient {
    collections: Mutex<Vec<CollectionDto>>,
    files: Mutex<Vec<FileDto>>,
}

impl FakeCloudClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_collection(&self, dto: CollectionDto) {
        self.collections.lock().unwrap().push(dto);
    }

    pub fn seed_file(&self, dto: FileDto) {
        self.files.lock().unwrap().push(dto);
    }
}

fn page<T: Clone + PageKey>(
    items: &[T],
    cursor: Option<(DateTime<Utc>, String)>,
    page_size: usize,
) -> ChangePage<T> {
    let mut matching: Vec<T> = items
        .iter()
        .filter(|item| match &cursor {
            Some((ts, id)) => (item.modified_at(), item.id()) > (*ts, id.clone()),
            None => true,
        })
        .cloned()
        .collect();
    matching.sort_by_key(|item| (item.modified_at(), item.id()));

    let is_last_page = matching.len() <= page_size;
    matching.truncate(page_size);
    ChangePage {
        items: matching,
        is_last_page,
    }
}

trait PageKey {
    fn modified_at(&self) -> DateTime<Utc>;
    fn id(&self) -> String;
}

impl PageKey for CollectionDto {
    fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }
    fn id(&self) -> String {
        self.id.0.clone()
    }
}

impl PageKey for FileDto {
    fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }
    fn id(&self) -> String {
        self.id.0.clone()
    }
}

#[async_trait]
impl CloudClient for FakeCloudClient {
    async fn login(&self, _email: &str, _password_hash: &str) -> Result<LoginResponse, SyncError> {
        Ok(LoginResponse {
            access_token: "fake-access".to_string(),
            access_token_expires_at: Utc::now() + chrono::Duration::hours(1),
            refresh_token: "fake-refresh".to_string(),
            refresh_token_expires_at: Utc::now() + chrono::Duration::days(30),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<LoginResponse, SyncError> {
        self.login("", "").await
    }

    async fn pull_collections(
        &self,
        cursor: Option<(DateTime<Utc>, CollectionId)>,
        page_size: usize,
    ) -> Result<ChangePage<CollectionDto>, SyncError> {
        let items = self.collections.lock().unwrap().clone();
        Ok(page(
            &items,
            cursor.map(|(ts, id)| (ts, id.0)),
            page_size,
        ))
    }

    async fn pull_files(
        &self,
        cursor: Option<(DateTime<Utc>, FileId)>,
        page_size: usize,
    ) -> Result<ChangePage<FileDto>, SyncError> {
        let items = self.files.lock().unwrap().clone();
        Ok(page(&items, cursor.map(|(ts, id)| (ts, id.0)), page_size))
    }

    async fn push_collection(&self, collection: CollectionDto) -> Result<CollectionDto, SyncError> {
        let mut items = self.collections.lock().unwrap();
        items.retain(|c| c.id != collection.id);
        items.push(collection.clone());
        Ok(collection)
    }

    async fn push_file(&self, file: FileDto) -> Result<FileDto, SyncError> {
        let mut items = self.files.lock().unwrap();
        items.retain(|f| f.id != file.id);
        items.push(file.clone());
        Ok(file)
    }

    async fn share_collection(
        &self,
        _collection_id: &CollectionId,
        _recipient_id: &str,
        _permission_level: &str,
        _sealed_collection_key: Vec<u8>,
        _share_with_descendants: bool,
    ) -> Result<(), SyncError> {
        Ok(())
    }

    async fn unshare_collection(
        &self,
        _collection_id: &CollectionId,
        _recipient_id: &str,
    ) -> Result<(), SyncError> {
        Ok(())
    }
}
