//! Router tests with mocked storage and payment adapters.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use loris_backend::api::{router, AppState};
use loris_backend::error::{AppError, AppResult};
use loris_backend::payments::{PaymentInitiation, PaymentProvider, PaymentRequest};
use loris_backend::storage::{DeleteConfirmation, ObjectStorage, UploadRequest, UploadResult};
use mockall::mock;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

mock! {
    pub Storage {}

    #[async_trait::async_trait]
    impl ObjectStorage for Storage {
        async fn upload(&self, request: UploadRequest) -> AppResult<UploadResult>;
        async fn delete(&self, key: &str) -> AppResult<DeleteConfirmation>;
    }
}

mock! {
    pub Payments {}

    #[async_trait::async_trait]
    impl PaymentProvider for Payments {
        async fn initiate_payment(&self, request: PaymentRequest) -> AppResult<PaymentInitiation>;
        async fn query_status(&self, tracking_id: &str) -> AppResult<Value>;
    }
}

const BOUNDARY: &str = "loris-test-boundary";

struct Harness {
    app: Router,
    upload_dir: TempDir,
}

fn harness(storage: MockStorage, payments: MockPayments, expose_errors: bool) -> Harness {
    let upload_dir = TempDir::new().unwrap();
    let state = AppState {
        storage: Arc::new(storage),
        payments: Arc::new(payments),
        upload_dir: upload_dir.path().to_path_buf(),
        expose_errors,
    };
    Harness {
        app: router(state, Some("http://localhost:3000")),
        upload_dir,
    }
}

fn idle() -> Harness {
    harness(MockStorage::new(), MockPayments::new(), false)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// `(field, file name, content type, bytes)` parts plus plain text fields.
fn multipart_post(
    uri: &str,
    files: &[(&str, &str, &str, &[u8])],
    fields: &[(&str, &str)],
) -> Request<Body> {
    let mut body = Vec::new();
    for (field, file_name, content_type, content) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: {}\r\n\r\n",
                BOUNDARY, field, file_name, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn uploaded(request: &UploadRequest) -> UploadResult {
    let key = format!("{}/{}", request.category, request.original_name);
    UploadResult {
        url: format!("https://f003.backblazeb2.com/file/loris/{}", key),
        key,
        remote_id: format!("4_z{}", request.original_name),
        size: request.size,
        content_type: "image/png".to_string(),
    }
}

#[tokio::test]
async fn test_health_check() {
    let h = idle();
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["message"], "Server is running");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_security_headers_and_request_id() {
    let h = idle();
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();

    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let h = idle();
    let request = Request::get("/api/nothing-here").body(Body::empty()).unwrap();
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "success": false, "message": "Route not found" }));
}

#[tokio::test]
async fn test_single_upload() {
    let mut storage = MockStorage::new();
    storage
        .expect_upload()
        .withf(|request| {
            request.original_name == "shoe.png"
                && request.category == "banners"
                && request.size == 4
                && request.file.path().exists()
        })
        .times(1)
        .returning(|request| Ok(uploaded(&request)));
    let h = harness(storage, MockPayments::new(), false);

    let request = multipart_post(
        "/api/storage/upload",
        &[("image", "shoe.png", "image/png", &b"\x89PNG"[..])],
        &[("category", "banners")],
    );
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "File uploaded successfully");
    assert_eq!(body["data"]["key"], "banners/shoe.png");
    assert_eq!(body["data"]["remoteId"], "4_zshoe.png");
    assert_eq!(body["data"]["contentType"], "image/png");
    assert_eq!(std::fs::read_dir(h.upload_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_upload_defaults_category() {
    let mut storage = MockStorage::new();
    storage
        .expect_upload()
        .withf(|request| request.category == "products")
        .times(1)
        .returning(|request| Ok(uploaded(&request)));
    let h = harness(storage, MockPayments::new(), false);

    let request = multipart_post(
        "/api/storage/upload",
        &[("image", "shoe.jpg", "image/jpeg", &b"jpeg"[..])],
        &[],
    );
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["key"], "products/shoe.jpg");
}

#[tokio::test]
async fn test_upload_without_file_is_400() {
    let mut storage = MockStorage::new();
    storage.expect_upload().times(0);
    let h = harness(storage, MockPayments::new(), false);

    let request = multipart_post("/api/storage/upload", &[], &[("category", "products")]);
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "No image file provided");
}

#[tokio::test]
async fn test_non_image_upload_is_rejected_before_storage() {
    let mut storage = MockStorage::new();
    storage.expect_upload().times(0);
    let h = harness(storage, MockPayments::new(), false);

    let request = multipart_post(
        "/api/storage/upload",
        &[("image", "notes.txt", "text/plain", &b"hello"[..])],
        &[],
    );
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Only image files (jpeg, jpg, png, webp) are allowed!"
    );
    assert_eq!(std::fs::read_dir(h.upload_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_invalid_category_is_rejected() {
    let mut storage = MockStorage::new();
    storage.expect_upload().times(0);
    let h = harness(storage, MockPayments::new(), false);

    let request = multipart_post(
        "/api/storage/upload",
        &[("image", "shoe.png", "image/png", &b"png"[..])],
        &[("category", "../etc")],
    );
    let (status, _) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_multiple() {
    let mut storage = MockStorage::new();
    storage
        .expect_upload()
        .times(3)
        .returning(|request| Ok(uploaded(&request)));
    let h = harness(storage, MockPayments::new(), false);

    let request = multipart_post(
        "/api/storage/upload-multiple",
        &[
            ("images", "a.png", "image/png", &b"a"[..]),
            ("images", "b.webp", "image/webp", &b"b"[..]),
            ("images", "c.jpeg", "image/jpeg", &b"c"[..]),
        ],
        &[],
    );
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "3 files uploaded successfully");
    let keys: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, ["products/a.png", "products/b.webp", "products/c.jpeg"]);
}

#[tokio::test]
async fn test_upload_multiple_rejects_eleven_files() {
    let mut storage = MockStorage::new();
    storage.expect_upload().times(0);
    let h = harness(storage, MockPayments::new(), false);

    let files: Vec<(&str, &str, &str, &[u8])> = (0..11)
        .map(|_| ("images", "x.png", "image/png", &b"x"[..]))
        .collect();
    let request = multipart_post("/api/storage/upload-multiple", &files, &[]);
    let (status, _) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_multiple_fails_if_any_upload_fails() {
    let mut storage = MockStorage::new();
    storage
        .expect_upload()
        .times(2)
        .returning(|request| {
            if request.original_name == "b.png" {
                Err(AppError::upload("HTTP 503: service unavailable"))
            } else {
                Ok(uploaded(&request))
            }
        });
    let h = harness(storage, MockPayments::new(), false);

    let request = multipart_post(
        "/api/storage/upload-multiple",
        &[
            ("images", "a.png", "image/png", &b"a"[..]),
            ("images", "b.png", "image/png", &b"b"[..]),
        ],
        &[],
    );
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Failed to upload file to storage");
    assert!(body.get("error").is_none());
    assert_eq!(std::fs::read_dir(h.upload_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_delete_passes_nested_key() {
    let mut storage = MockStorage::new();
    storage
        .expect_delete()
        .withf(|key| key == "products/shoe.png")
        .times(1)
        .returning(|key| {
            Ok(DeleteConfirmation {
                key: key.to_string(),
                remote_id: "4_zshoe".to_string(),
                message: "File deleted successfully".to_string(),
            })
        });
    let h = harness(storage, MockPayments::new(), false);

    let request = Request::delete("/api/storage/delete/products/shoe.png")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "File deleted successfully");
    assert_eq!(body["data"]["key"], "products/shoe.png");
    assert_eq!(body["data"]["remoteId"], "4_zshoe");
}

#[tokio::test]
async fn test_delete_missing_file_is_404() {
    let mut storage = MockStorage::new();
    storage
        .expect_delete()
        .times(1)
        .returning(|key| Err(AppError::not_found(format!("File \"{}\" not found", key))));
    let h = harness(storage, MockPayments::new(), false);

    let request = Request::delete("/api/storage/delete/products/gone.png")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "File \"products/gone.png\" not found");
}

#[tokio::test]
async fn test_error_detail_only_in_development() {
    for expose_errors in [false, true] {
        let mut storage = MockStorage::new();
        storage
            .expect_delete()
            .returning(|_| Err(AppError::delete("HTTP 401: bad_auth_token")));
        let h = harness(storage, MockPayments::new(), expose_errors);

        let request = Request::delete("/api/storage/delete/products/a.png")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&h.app, request).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Failed to delete file from storage");
        if expose_errors {
            assert_eq!(body["error"], "Delete failed: HTTP 401: bad_auth_token");
        } else {
            assert!(body.get("error").is_none());
        }
    }
}

#[tokio::test]
async fn test_initiate_payment() {
    let mut payments = MockPayments::new();
    payments
        .expect_initiate_payment()
        .withf(|request| {
            request.phone_number == "0712345678"
                && request.amount == 250.0
                && request.order_ref == "ORD-9"
        })
        .times(1)
        .returning(|_| {
            Ok(PaymentInitiation {
                tracking_id: "ws_CO_1".to_string(),
                raw_status: json!({ "CheckoutRequestID": "ws_CO_1", "ResponseCode": "0" }),
            })
        });
    let h = harness(MockStorage::new(), payments, false);

    let request = json_post(
        "/api/mpesa/initiate",
        json!({ "phoneNumber": "0712345678", "amount": "250", "orderId": "ORD-9" }),
    );
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "STK push initiated successfully");
    assert_eq!(body["data"]["trackingId"], "ws_CO_1");
    assert_eq!(body["data"]["rawStatus"]["ResponseCode"], "0");
}

#[tokio::test]
async fn test_initiate_missing_fields_is_400() {
    let mut payments = MockPayments::new();
    payments.expect_initiate_payment().times(0);
    let h = harness(MockStorage::new(), payments, false);

    for body in [
        json!({ "amount": 100, "orderId": "ORD1" }),
        json!({ "phoneNumber": "0712345678", "orderId": "ORD1" }),
        json!({ "phoneNumber": "0712345678", "amount": 100 }),
        json!({ "phoneNumber": "", "amount": 100, "orderId": "ORD1" }),
    ] {
        let (status, response) = send(&h.app, json_post("/api/mpesa/initiate", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response["message"],
            "Phone number, amount, and order ID are required"
        );
    }
}

#[tokio::test]
async fn test_initiate_surfaces_gateway_message() {
    let mut payments = MockPayments::new();
    payments.expect_initiate_payment().returning(|_| {
        Err(AppError::payment_rejected(
            "HTTP 400: Bad Request - Invalid PhoneNumber",
            "Bad Request - Invalid PhoneNumber",
        ))
    });
    let h = harness(MockStorage::new(), payments, false);

    let request = json_post(
        "/api/mpesa/initiate",
        json!({ "phoneNumber": "0712345678", "amount": 10, "orderId": "ORD1" }),
    );
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Bad Request - Invalid PhoneNumber");
}

#[tokio::test]
async fn test_status_query() {
    let mut payments = MockPayments::new();
    payments
        .expect_query_status()
        .withf(|id| id == "ws_CO_1")
        .times(1)
        .returning(|_| {
            Ok(json!({
                "ResultCode": "0",
                "ResultDesc": "The service request is processed successfully.",
            }))
        });
    let h = harness(MockStorage::new(), payments, false);

    let request = json_post("/api/mpesa/status", json!({ "checkoutRequestID": "ws_CO_1" }));
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Transaction status retrieved");
    assert_eq!(body["data"]["ResultCode"], "0");
}

#[tokio::test]
async fn test_status_without_id_is_400() {
    let mut payments = MockPayments::new();
    payments.expect_query_status().times(0);
    let h = harness(MockStorage::new(), payments, false);

    let (status, body) = send(&h.app, json_post("/api/mpesa/status", json!({}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Checkout request ID is required");
}

#[tokio::test]
async fn test_callback_is_always_acknowledged() {
    let h = idle();
    let ack = json!({ "ResultCode": 0, "ResultDesc": "Callback received successfully" });

    let completed = json!({
        "Body": { "stkCallback": {
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_1",
            "ResultCode": 0,
            "ResultDesc": "The service request is processed successfully.",
            "CallbackMetadata": { "Item": [
                { "Name": "Amount", "Value": 1.0 },
                { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                { "Name": "PhoneNumber", "Value": 254712345678u64 }
            ]}
        }}
    });
    let cancelled = json!({
        "Body": { "stkCallback": {
            "MerchantRequestID": "29115-34620561-2",
            "CheckoutRequestID": "ws_CO_2",
            "ResultCode": 1032,
            "ResultDesc": "Request cancelled by user"
        }}
    });

    for payload in [
        completed.to_string(),
        cancelled.to_string(),
        "not json".to_string(),
        String::new(),
    ] {
        let request = Request::post("/api/mpesa/callback")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload))
            .unwrap();
        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, ack);
    }
}
