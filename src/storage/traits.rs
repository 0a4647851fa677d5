//! Object storage trait definitions

use crate::error::AppResult;
use crate::storage::types::{DeleteConfirmation, UploadRequest, UploadResult};
use async_trait::async_trait;

/// Remote image storage used by the upload and delete routes.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Push a spooled file to remote storage.
    ///
    /// The request is validated before any remote call. The local
    /// temporary copy in `request.file` is removed once the request is
    /// dropped, including when this future is cancelled.
    ///
    /// # Returns
    /// * `UploadResult` - Public URL, storage key, remote id, size and content type
    async fn upload(&self, request: UploadRequest) -> AppResult<UploadResult>;

    /// Delete a previously uploaded file by its storage key.
    ///
    /// Fails with a not-found error when no file with exactly this key exists.
    async fn delete(&self, key: &str) -> AppResult<DeleteConfirmation>;
}
