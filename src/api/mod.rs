//! HTTP surface
//!
//! Routes are thin: they validate the request shape, hand off to the
//! storage or payment adapter, and wrap the outcome in the
//! `{success, message, data}` envelope.

pub mod health;
pub mod mpesa;
pub mod storage;

use crate::error::AppError;
use crate::payments::PaymentProvider;
use crate::storage::types::{MAX_FILES_PER_REQUEST, MAX_UPLOAD_BYTES};
use crate::storage::ObjectStorage;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, warn};

/// Headroom for multipart framing and form fields on top of file bytes.
const BODY_OVERHEAD_BYTES: usize = 1024 * 1024;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn ObjectStorage>,
    pub payments: Arc<dyn PaymentProvider>,
    /// Directory incoming files are spooled to before upload
    pub upload_dir: PathBuf,
    /// Include error details in responses (development only)
    pub expose_errors: bool,
}

impl AppState {
    pub fn reject(&self, error: AppError) -> ApiError {
        ApiError {
            error,
            expose_details: self.expose_errors,
        }
    }
}

/// Success envelope: `{ success: true, message, data }`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data,
        })
    }
}

/// Failure response: `{ success: false, message }`, plus `error` with the
/// full detail when running in development.
#[derive(Debug)]
pub struct ApiError {
    error: AppError,
    expose_details: bool,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.error {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.error);
        } else {
            warn!("Request rejected ({}): {}", status.as_u16(), self.error);
        }

        let mut body = json!({
            "success": false,
            "message": self.error.public_message(),
        });
        if self.expose_details {
            body["error"] = json!(self.error.to_string());
        }

        (status, Json(body)).into_response()
    }
}

/// Build the application router with all middleware attached.
pub fn router(state: AppState, frontend_url: Option<&str>) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(cors_layer(frontend_url));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/storage/upload", post(storage::upload))
        .route("/api/storage/upload-multiple", post(storage::upload_multiple))
        .route("/api/storage/delete/*file_name", delete(storage::delete_file))
        .route("/api/mpesa/initiate", post(mpesa::initiate))
        .route("/api/mpesa/status", post(mpesa::status))
        .route("/api/mpesa/callback", post(mpesa::callback))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(
            MAX_UPLOAD_BYTES as usize * MAX_FILES_PER_REQUEST + BODY_OVERHEAD_BYTES,
        ))
        .layer(middleware)
        .with_state(state)
}

fn cors_layer(frontend_url: Option<&str>) -> CorsLayer {
    let origin = match frontend_url.map(HeaderValue::from_str) {
        Some(Ok(origin)) => AllowOrigin::exact(origin),
        Some(Err(e)) => {
            warn!("Ignoring unparseable FRONTEND_URL for CORS: {}", e);
            AllowOrigin::any()
        }
        None => AllowOrigin::any(),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "message": "Route not found" })),
    )
}
