//! Image upload and delete routes.

use crate::api::{ApiError, ApiResponse, AppState};
use crate::error::{AppError, AppResult};
use crate::storage::spool;
use crate::storage::types::{
    resolve_category, validate_upload, DeleteConfirmation, UploadRequest, UploadResult,
    MAX_FILES_PER_REQUEST,
};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    Json,
};
use futures::future::join_all;
use std::path::Path as FsPath;
use tracing::info;

/// A file received in a multipart form, not yet on disk.
struct IncomingFile {
    name: String,
    content_type: Option<String>,
    content: Bytes,
}

struct UploadForm {
    files: Vec<IncomingFile>,
    category: String,
}

/// Collect up to `max_files` files from `file_field` plus the optional
/// `category` field, validating every file before returning.
async fn read_form(
    multipart: Result<Multipart, MultipartRejection>,
    file_field: &str,
    max_files: usize,
) -> AppResult<UploadForm> {
    let mut multipart =
        multipart.map_err(|e| AppError::validation(format!("Invalid multipart request: {}", e)))?;

    let mut files = Vec::new();
    let mut category = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Invalid multipart request: {}", e)))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some(name) if name == file_field => {
                if files.len() == max_files {
                    return Err(AppError::validation(format!(
                        "Too many files: at most {} allowed in \"{}\"",
                        max_files, file_field
                    )));
                }
                let name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let content = field.bytes().await.map_err(|e| {
                    AppError::validation(format!("Failed to read uploaded file: {}", e))
                })?;
                files.push(IncomingFile {
                    name,
                    content_type,
                    content,
                });
            }
            Some("category") => {
                let text = field.text().await.map_err(|e| {
                    AppError::validation(format!("Failed to read category field: {}", e))
                })?;
                category = Some(text);
            }
            _ => {}
        }
    }

    for file in &files {
        validate_upload(
            &file.name,
            file.content.len() as u64,
            file.content_type.as_deref(),
        )?;
    }

    Ok(UploadForm {
        files,
        category: resolve_category(category.as_deref())?,
    })
}

/// Write every file to the upload directory.
///
/// If one write fails, dropping the requests built so far removes their
/// files again.
async fn spool_all(dir: &FsPath, form: UploadForm) -> AppResult<Vec<UploadRequest>> {
    let mut requests = Vec::with_capacity(form.files.len());
    for file in form.files {
        let spooled = spool::spool(dir, &file.name, &file.content).await?;
        requests.push(UploadRequest {
            file: spooled,
            size: file.content.len() as u64,
            original_name: file.name,
            declared_type: file.content_type,
            category: form.category.clone(),
        });
    }
    Ok(requests)
}

/// `POST /api/storage/upload` with a single `image` file.
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ApiResponse<UploadResult>>, ApiError> {
    let form = read_form(multipart, "image", 1)
        .await
        .map_err(|e| state.reject(e))?;
    if form.files.is_empty() {
        return Err(state.reject(AppError::validation("No image file provided")));
    }

    let request = spool_all(&state.upload_dir, form)
        .await
        .map_err(|e| state.reject(e))?
        .remove(0);

    let result = state
        .storage
        .upload(request)
        .await
        .map_err(|e| state.reject(e))?;

    Ok(ApiResponse::ok("File uploaded successfully", result))
}

/// `POST /api/storage/upload-multiple` with up to ten `images` files.
///
/// Uploads run concurrently. Every file's temporary copy is cleaned up by
/// its own upload, so a failing sibling never leaves files behind.
pub async fn upload_multiple(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ApiResponse<Vec<UploadResult>>>, ApiError> {
    let form = read_form(multipart, "images", MAX_FILES_PER_REQUEST)
        .await
        .map_err(|e| state.reject(e))?;
    if form.files.is_empty() {
        return Err(state.reject(AppError::validation("No image files provided")));
    }

    let requests = spool_all(&state.upload_dir, form)
        .await
        .map_err(|e| state.reject(e))?;

    let uploads = requests
        .into_iter()
        .map(|request| state.storage.upload(request));
    let results = join_all(uploads)
        .await
        .into_iter()
        .collect::<AppResult<Vec<_>>>()
        .map_err(|e| state.reject(e))?;

    info!("{} files uploaded", results.len());
    Ok(ApiResponse::ok(
        format!("{} files uploaded successfully", results.len()),
        results,
    ))
}

/// `DELETE /api/storage/delete/{key}`; the key may contain `/`.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> Result<Json<ApiResponse<DeleteConfirmation>>, ApiError> {
    let confirmation = state
        .storage
        .delete(&file_name)
        .await
        .map_err(|e| state.reject(e))?;

    Ok(ApiResponse::ok("File deleted successfully", confirmation))
}
