//! Storage types and upload validation
//!
//! Shared by the HTTP layer, which validates uploads before spooling them
//! to disk, and by storage adapters, which validate again before any
//! remote call.

use crate::error::{AppError, AppResult};
use crate::storage::spool::SpooledFile;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

/// Largest accepted upload. Files of this size or bigger are rejected.
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Maximum number of files in one multi-file upload.
pub const MAX_FILES_PER_REQUEST: usize = 10;

pub const DEFAULT_CATEGORY: &str = "products";

/// Accepted image extensions (lowercase, without the dot).
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpeg", "jpg", "png", "webp"];

/// A file waiting to be pushed to remote storage.
///
/// `file` is the local temporary copy; it is removed when the request is
/// dropped, whatever the outcome of the upload.
#[derive(Debug)]
pub struct UploadRequest {
    pub file: SpooledFile,
    pub original_name: String,
    /// Size declared by the client.
    pub size: u64,
    /// MIME type declared by the client, if any.
    pub declared_type: Option<String>,
    pub category: String,
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    /// Public URL the file is served from.
    pub url: String,
    /// Storage key, `category/<uuid><ext>`.
    pub key: String,
    /// Identifier assigned by the remote service.
    pub remote_id: String,
    pub size: u64,
    pub content_type: String,
}

/// Resolved remote container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteConfirmation {
    pub key: String,
    pub remote_id: String,
    pub message: String,
}

fn category_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid category regex"))
}

/// Original extension including the leading dot, case preserved.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext))
}

/// Content type for a file name, falling back to `application/octet-stream`.
pub fn content_type_for(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .to_string()
}

/// Category to file an upload under; blank means the default.
pub fn resolve_category(category: Option<&str>) -> AppResult<String> {
    let category = match category.map(str::trim) {
        None | Some("") => return Ok(DEFAULT_CATEGORY.to_string()),
        Some(category) => category,
    };
    if !category_pattern().is_match(category) {
        return Err(AppError::validation(format!(
            "Invalid category \"{}\": only letters, digits, '-' and '_' are allowed",
            category
        )));
    }
    Ok(category.to_string())
}

/// Reject anything that is not a small jpeg/jpg/png/webp image.
pub fn validate_upload(name: &str, size: u64, declared_type: Option<&str>) -> AppResult<()> {
    const IMAGES_ONLY: &str = "Only image files (jpeg, jpg, png, webp) are allowed!";

    let extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::validation(IMAGES_ONLY));
    }

    if let Some(mime) = declared_type {
        let mime = mime.to_ascii_lowercase();
        let subtype = mime.strip_prefix("image/").unwrap_or_default();
        if !ALLOWED_EXTENSIONS.contains(&subtype) {
            return Err(AppError::validation(IMAGES_ONLY));
        }
    }

    if size >= MAX_UPLOAD_BYTES {
        return Err(AppError::validation(format!(
            "File \"{}\" is too large: {} bytes (limit is {} bytes)",
            name, size, MAX_UPLOAD_BYTES
        )));
    }

    Ok(())
}

impl UploadRequest {
    pub fn validate(&self) -> AppResult<()> {
        validate_upload(&self.original_name, self.size, self.declared_type.as_deref())
    }
}
