//! Production `CloudClient`, backed by `reqwest` (spec §4.C).
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Serialize;

use super::{
    ChangePage, CloudClient, CollectionDto, FileDto, LoginResponse,
};
use crate::error::SyncError;
use crate::model::ids::{CollectionId, FileId};

use super::retry::with_backoff;

/// Bearer-token state shared across calls, refreshed in place on 401
/// (spec §4.D).
struct Session {
    access_token: String,
}

pub struct HttpCloudClient {
    client: Client,
    base_url: String,
    session: RwLock<Option<Session>>,
    max_retry_attempts: u32,
}

impl HttpCloudClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            session: RwLock::new(None),
            max_retry_attempts: 3,
        })
    }

    pub fn set_access_token(&self, token: String) {
        *self.session.write().expect("session lock poisoned") = Some(Session {
            access_token: token,
        });
    }

    fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .expect("session lock poisoned")
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        let url = self.url(path);
        let token = self.access_token();
        with_backoff(
            self.max_retry_attempts,
            is_retryable,
            || {
                let client = &self.client;
                let token = token.clone();
                let url = url.clone();
                async move {
                    let mut request = client.get(&url);
                    if let Some(token) = &token {
                        request = request.bearer_auth(token);
                    }
                    send_json(request).await
                }
            },
        )
        .await
    }

    async fn post_json<B: Serialize + Sync, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SyncError> {
        let url = self.url(path);
        let token = self.access_token();
        with_backoff(
            self.max_retry_attempts,
            is_retryable,
            || {
                let client = &self.client;
                let token = token.clone();
                let url = url.clone();
                async move {
                    let mut request = client.post(&url).json(body);
                    if let Some(token) = &token {
                        request = request.bearer_auth(token);
                    }
                    send_json(request).await
                }
            },
        )
        .await
    }
}

async fn send_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, SyncError> {
    let response = request
        .send()
        .await
        .map_err(|e| SyncError::Network(e.to_string()))?;

    match response.status() {
        StatusCode::UNAUTHORIZED => Err(SyncError::Auth("access token rejected".to_string())),
        status if status.is_success() => response
            .json::<T>()
            .await
            .map_err(|e| SyncError::Network(format!("malformed response body: {e}"))),
        status => Err(SyncError::Network(format!("unexpected status {status}"))),
    }
}

fn is_retryable(err: &SyncError) -> bool {
    matches!(err, SyncError::Network(_))
}

#[async_trait]
impl CloudClient for HttpCloudClient {
    async fn login(&self, email: &str, password_hash: &str) -> Result<LoginResponse, SyncError> {
        #[derive(Serialize)]
        struct LoginRequest<'a> {
            email: &'a str,
            password_hash: &'a str,
        }
        self.post_json(
            "/v1/auth/login",
            &LoginRequest {
                email,
                password_hash,
            },
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<LoginResponse, SyncError> {
        #[derive(Serialize)]
        struct RefreshRequest<'a> {
            refresh_token: &'a str,
        }
        self.post_json("/v1/auth/refresh", &RefreshRequest { refresh_token })
            .await
    }

    async fn pull_collections(
        &self,
        cursor: Option<(DateTime<Utc>, CollectionId)>,
        page_size: usize,
    ) -> Result<ChangePage<CollectionDto>, SyncError> {
        let path = pull_path("/v1/collections/changes", &cursor, page_size);
        self.get_json(&path).await
    }

    async fn pull_files(
        &self,
        cursor: Option<(DateTime<Utc>, FileId)>,
        page_size: usize,
    ) -> Result<ChangePage<FileDto>, SyncError> {
        let path = pull_path("/v1/files/changes", &cursor, page_size);
        self.get_json(&path).await
    }

    async fn push_collection(&self, collection: CollectionDto) -> Result<CollectionDto, SyncError> {
        self.post_json("/v1/collections", &collection).await
    }

    async fn push_file(&self, file: FileDto) -> Result<FileDto, SyncError> {
        self.post_json("/v1/files", &file).await
    }

    async fn share_collection(
        &self,
        collection_id: &CollectionId,
        recipient_id: &str,
        permission_level: &str,
        sealed_collection_key: Vec<u8>,
        share_with_descendants: bool,
    ) -> Result<(), SyncError> {
        #[derive(Serialize)]
        struct ShareRequest<'a> {
            recipient_id: &'a str,
            permission_level: &'a str,
            encrypted_collection_key: String,
            share_with_descendants: bool,
        }
        let body = ShareRequest {
            recipient_id,
            permission_level,
            encrypted_collection_key: base64::engine::general_purpose::STANDARD
                .encode(sealed_collection_key),
            share_with_descendants,
        };
        let path = format!("/v1/collections/{}/share", collection_id.as_str());
        self.post_json(&path, &body).await
    }

    async fn unshare_collection(
        &self,
        collection_id: &CollectionId,
        recipient_id: &str,
    ) -> Result<(), SyncError> {
        #[derive(Serialize)]
        struct UnshareRequest<'a> {
            recipient_id: &'a str,
        }
        let path = format!("/v1/collections/{}/unshare", collection_id.as_str());
        self.post_json(&path, &UnshareRequest { recipient_id }).await
    }
}

fn pull_path<Id: AsRef<str>>(
    base: &str,
    cursor: &Option<(DateTime<Utc>, Id)>,
    page_size: usize,
) -> String {
    match cursor {
        Some((ts, id)) => format!(
            "{base}?after_modified_at={}&after_id={}&page_size={page_size}",
            ts.to_rfc3339(),
            id.as_ref()
        ),
        None => format!("{base}?page_size={page_size}"),
    }
}
