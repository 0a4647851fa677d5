//! Backblaze B2 storage implementation
//!
//! Talks to the B2 native API (v2). The adapter keeps two caches: the
//! account authorization (token + API URL) and the bucket descriptor. Any
//! failed remote call clears both, so the next request re-authorizes from
//! scratch. Nothing is retried.

use crate::error::{AppError, AppResult};
use crate::remote::{describe_failure, payload, read_json, string_at, string_field};
use crate::session::{Session, SessionCache};
use crate::storage::traits::ObjectStorage;
use crate::storage::types::{
    content_type_for, extension_of, Bucket, DeleteConfirmation, UploadRequest, UploadResult,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

const SERVICE: &str = "Backblaze B2";

/// Backblaze B2 configuration
#[derive(Debug, Clone)]
pub struct BackblazeConfig {
    /// Application key id
    pub key_id: String,
    /// Application key secret
    pub application_key: String,
    pub bucket_name: String,
    /// When set, the bucket is used as-is and never looked up remotely
    pub bucket_id: Option<String>,
    /// Authorization endpoint base (defaults to https://api.backblazeb2.com)
    pub api_url: String,
    /// Host serving public bucket downloads
    pub public_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for BackblazeConfig {
    fn default() -> Self {
        Self {
            key_id: String::new(),
            application_key: String::new(),
            bucket_name: String::new(),
            bucket_id: None,
            api_url: "https://api.backblazeb2.com".to_string(),
            public_url: "https://f003.backblazeb2.com".to_string(),
            timeout_secs: 30,
        }
    }
}

/// One-time upload target returned by `b2_get_upload_url`.
#[derive(Debug, Clone)]
struct UploadTarget {
    url: String,
    token: String,
}

/// Backblaze B2 storage adapter
pub struct BackblazeStorage {
    config: BackblazeConfig,
    client: Client,
    session: SessionCache<Session>,
    bucket: SessionCache<Bucket>,
}

impl BackblazeStorage {
    pub fn new(config: BackblazeConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            session: SessionCache::new("b2 session"),
            bucket: SessionCache::new("b2 bucket"),
        })
    }

    /// Cached account authorization, authorizing first if needed.
    pub async fn ensure_session(&self) -> AppResult<Session> {
        self.session.get_or_try_init(|| self.authorize()).await
    }

    /// Cached bucket descriptor, resolving it first if needed.
    pub async fn resolve_bucket(&self, session: &Session) -> AppResult<Bucket> {
        self.bucket
            .get_or_try_init(|| self.lookup_bucket(session))
            .await
    }

    /// Forget the cached authorization and bucket.
    pub async fn invalidate(&self) {
        self.session.invalidate().await;
        self.bucket.invalidate().await;
    }

    async fn authorize(&self) -> AppResult<Session> {
        let url = format!(
            "{}/b2api/v2/b2_authorize_account",
            self.config.api_url.trim_end_matches('/')
        );

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.config.key_id, Some(&self.config.application_key))
            .send()
            .await
            .map_err(|e| AppError::auth(SERVICE, e.to_string()))?;
        let (status, body) = read_json(response)
            .await
            .map_err(|e| AppError::auth(SERVICE, e.to_string()))?;

        if !status.is_success() {
            error!("B2 authentication error: {}", describe_failure(status, &body));
            return Err(AppError::auth(SERVICE, describe_failure(status, &body)));
        }

        let token = string_field(&body, "authorizationToken")
            .ok_or_else(|| AppError::auth(SERVICE, "response has no authorizationToken"))?;
        // v2 reports apiUrl at the top level, v3 nests it under apiInfo
        let api_url = string_field(&body, "apiUrl")
            .or_else(|| string_at(&body, "/apiInfo/storageApi/apiUrl"))
            .ok_or_else(|| AppError::auth(SERVICE, "response has no apiUrl"))?;

        let mut session = Session::new(token, api_url.trim_end_matches('/'));
        if let Some(account_id) = string_field(&body, "accountId") {
            session = session.with_account_id(account_id);
        }

        info!(
            "Successfully authenticated with Backblaze B2 (api_url={})",
            session.api_url
        );
        Ok(session)
    }

    async fn lookup_bucket(&self, session: &Session) -> AppResult<Bucket> {
        if let Some(bucket_id) = &self.config.bucket_id {
            debug!("Using configured bucket id {}", bucket_id);
            return Ok(Bucket {
                id: bucket_id.clone(),
                name: self.config.bucket_name.clone(),
            });
        }

        let body = self
            .api_call(
                session,
                "b2_list_buckets",
                &json!({ "accountId": session.account_id }),
            )
            .await
            .map_err(|e| AppError::config(format!("failed to list buckets: {}", e)))?;

        let buckets = parse_buckets(&body);
        let bucket = find_bucket(&buckets, &self.config.bucket_name)?;
        info!("Found bucket: {} ({})", bucket.name, bucket.id);
        Ok(bucket)
    }

    /// POST to a B2 API endpoint with the session token.
    ///
    /// Non-2xx responses become an `Err` carrying a readable description.
    async fn api_call(
        &self,
        session: &Session,
        endpoint: &str,
        body: &Value,
    ) -> Result<Value, String> {
        let url = format!("{}/b2api/v2/{}", session.api_url, endpoint);
        let response = self
            .client
            .post(&url)
            .header("Authorization", &session.token)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("{} request failed: {}", endpoint, e))?;
        let (status, body) = read_json(response)
            .await
            .map_err(|e| format!("{} response unreadable: {}", endpoint, e))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(format!("{} returned {}", endpoint, describe_failure(status, &body)))
        }
    }

    async fn upload_url(&self, session: &Session, bucket: &Bucket) -> AppResult<UploadTarget> {
        let body = self
            .api_call(session, "b2_get_upload_url", &json!({ "bucketId": bucket.id }))
            .await
            .map_err(AppError::upload)?;

        match (
            string_field(&body, "uploadUrl"),
            string_field(&body, "authorizationToken"),
        ) {
            (Some(url), Some(token)) => Ok(UploadTarget {
                url: url.to_string(),
                token: token.to_string(),
            }),
            _ => {
                error!("Invalid upload URL response: {}", body);
                Err(AppError::upload(
                    "Could not get valid upload URL and authorization token",
                ))
            }
        }
    }

    async fn send_file(
        &self,
        target: &UploadTarget,
        key: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> AppResult<Value> {
        let response = self
            .client
            .post(&target.url)
            .header("Authorization", &target.token)
            .header("X-Bz-File-Name", key)
            .header("Content-Type", content_type)
            .header("X-Bz-Content-Sha1", "do_not_verify")
            .body(content)
            .send()
            .await
            .map_err(|e| AppError::upload(format!("upload request failed: {}", e)))?;
        let (status, body) = read_json(response)
            .await
            .map_err(|e| AppError::upload(format!("upload response unreadable: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::upload(describe_failure(status, &body)));
        }
        Ok(body)
    }

    async fn upload_spooled(&self, request: &UploadRequest) -> AppResult<UploadResult> {
        request.validate()?;

        let session = self.ensure_session().await?;
        let bucket = self.resolve_bucket(&session).await?;

        let content = tokio::fs::read(request.file.path()).await.map_err(|e| {
            AppError::upload(format!(
                "failed to read temporary file {}: {}",
                request.file.path().display(),
                e
            ))
        })?;
        let size = content.len() as u64;
        let key = storage_key(&request.category, &request.original_name);
        let content_type = content_type_for(&request.original_name);

        info!("Uploading file: {} ({}, {} bytes)", key, content_type, size);

        let target = self.upload_url(&session, &bucket).await?;
        let body = self.send_file(&target, &key, &content_type, content).await?;

        let remote_id = string_field(&body, "fileId").ok_or_else(|| {
            AppError::upload(format!("upload response has no fileId: {}", payload(&body)))
        })?;

        info!("File uploaded successfully: {}", key);

        Ok(UploadResult {
            url: public_url(&self.config.public_url, &bucket.name, &key),
            key,
            remote_id: remote_id.to_string(),
            size,
            content_type,
        })
    }

    async fn delete_by_key(&self, key: &str) -> AppResult<DeleteConfirmation> {
        let session = self.ensure_session().await?;
        let bucket = self.resolve_bucket(&session).await?;

        let listing = self
            .api_call(
                &session,
                "b2_list_file_names",
                &json!({
                    "bucketId": bucket.id,
                    "startFileName": key,
                    "prefix": key,
                    "maxFileCount": 1,
                }),
            )
            .await
            .map_err(AppError::delete)?;

        let remote_id = find_file_id(&listing, key)
            .ok_or_else(|| AppError::not_found(format!("File \"{}\" not found", key)))?;

        self.api_call(
            &session,
            "b2_delete_file_version",
            &json!({ "fileName": key, "fileId": remote_id }),
        )
        .await
        .map_err(AppError::delete)?;

        info!("File deleted successfully: {}", key);

        Ok(DeleteConfirmation {
            key: key.to_string(),
            message: format!("File {} deleted successfully", key),
            remote_id,
        })
    }
}

#[async_trait]
impl ObjectStorage for BackblazeStorage {
    async fn upload(&self, request: UploadRequest) -> AppResult<UploadResult> {
        let result = self.upload_spooled(&request).await;
        // Removes the local copy.
        drop(request);

        if let Err(e) = &result {
            if !e.is_validation() {
                error!("File upload error: {}", e);
                self.invalidate().await;
            }
        }
        result
    }

    async fn delete(&self, key: &str) -> AppResult<DeleteConfirmation> {
        let key = key.trim().trim_start_matches('/');
        if key.is_empty() {
            return Err(AppError::validation("File name is required"));
        }

        let result = self.delete_by_key(key).await;
        match &result {
            Err(e) if e.is_not_found() => info!("Delete skipped: {}", e),
            Err(e) => {
                error!("File deletion error: {}", e);
                self.invalidate().await;
            }
            Ok(_) => {}
        }
        result
    }
}

/// Remote key for a new upload: `category/<uuid><original extension>`.
pub fn storage_key(category: &str, original_name: &str) -> String {
    format!(
        "{}/{}{}",
        category,
        Uuid::new_v4(),
        extension_of(original_name).unwrap_or_default()
    )
}

pub fn public_url(base: &str, bucket_name: &str, key: &str) -> String {
    format!("{}/file/{}/{}", base.trim_end_matches('/'), bucket_name, key)
}

fn parse_buckets(body: &Value) -> Vec<Bucket> {
    payload(body)
        .get("buckets")
        .and_then(Value::as_array)
        .map(|buckets| {
            buckets
                .iter()
                .filter_map(|b| {
                    Some(Bucket {
                        id: b.get("bucketId")?.as_str()?.to_string(),
                        name: b.get("bucketName")?.as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn find_bucket(buckets: &[Bucket], name: &str) -> AppResult<Bucket> {
    buckets
        .iter()
        .find(|b| b.name == name)
        .cloned()
        .ok_or_else(|| {
            let available: Vec<&str> = buckets.iter().map(|b| b.name.as_str()).collect();
            AppError::config(format!(
                "Bucket \"{}\" not found. Available buckets: {}",
                name,
                available.join(", ")
            ))
        })
}

/// File id of the listed entry whose name is exactly `key`.
fn find_file_id(listing: &Value, key: &str) -> Option<String> {
    payload(listing)
        .get("files")?
        .as_array()?
        .iter()
        .find(|f| f.get("fileName").and_then(Value::as_str) == Some(key))
        .and_then(|f| f.get("fileId"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
