//! M-Pesa payment routes.

use crate::api::{ApiError, ApiResponse, AppState};
use crate::error::AppError;
use crate::payments::types::{parse_callback, CallbackAck, PaymentInitiation, PaymentRequest};
use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection},
        State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateBody {
    #[serde(default)]
    pub phone_number: Option<Value>,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub order_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    #[serde(rename = "checkoutRequestID", default)]
    pub checkout_request_id: Option<String>,
}

/// String or number, as text. Empty strings count as missing.
fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// JSON number or numeric string.
fn amount_of(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    AppError::validation(format!("Invalid JSON body: {}", rejection.body_text()))
}

/// `POST /api/mpesa/initiate` with `{ phoneNumber, amount, orderId }`.
pub async fn initiate(
    State(state): State<AppState>,
    body: Result<Json<InitiateBody>, JsonRejection>,
) -> Result<Json<ApiResponse<PaymentInitiation>>, ApiError> {
    let Json(body) = body.map_err(|e| state.reject(json_rejection(e)))?;

    let request = match (
        text_of(body.phone_number.as_ref()),
        amount_of(body.amount.as_ref()),
        text_of(body.order_id.as_ref()),
    ) {
        (Some(phone_number), Some(amount), Some(order_ref)) => PaymentRequest {
            phone_number,
            amount,
            order_ref,
        },
        _ => {
            return Err(state.reject(AppError::validation(
                "Phone number, amount, and order ID are required",
            )))
        }
    };

    let initiation = state
        .payments
        .initiate_payment(request)
        .await
        .map_err(|e| state.reject(e))?;

    Ok(ApiResponse::ok("STK push initiated successfully", initiation))
}

/// `POST /api/mpesa/status` with `{ checkoutRequestID }`.
pub async fn status(
    State(state): State<AppState>,
    body: Result<Json<StatusBody>, JsonRejection>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    let Json(body) = body.map_err(|e| state.reject(json_rejection(e)))?;

    let tracking_id = body
        .checkout_request_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| state.reject(AppError::validation("Checkout request ID is required")))?;

    let raw = state
        .payments
        .query_status(&tracking_id)
        .await
        .map_err(|e| state.reject(e))?;

    Ok(ApiResponse::ok("Transaction status retrieved", raw))
}

/// `POST /api/mpesa/callback`, called by the gateway.
///
/// Always acknowledges with 200 so the gateway stops redelivering;
/// problems with the payload are only logged.
pub async fn callback(body: Result<Bytes, BytesRejection>) -> (StatusCode, Json<CallbackAck>) {
    match body {
        Ok(raw) => match parse_callback(&raw) {
            Ok(summary) if summary.is_success() => info!(
                merchant_request_id = ?summary.merchant_request_id,
                checkout_request_id = %summary.checkout_request_id,
                amount = ?summary.amount,
                receipt = ?summary.receipt_number,
                phone = ?summary.phone_number,
                "M-PESA payment completed"
            ),
            Ok(summary) => info!(
                merchant_request_id = ?summary.merchant_request_id,
                checkout_request_id = %summary.checkout_request_id,
                result_code = summary.result_code,
                result_desc = ?summary.result_desc,
                "M-PESA payment not completed"
            ),
            Err(e) => warn!(
                "Error processing M-PESA callback ({} bytes): {}",
                raw.len(),
                e
            ),
        },
        Err(e) => warn!("Failed to read M-PESA callback body: {}", e),
    }

    (StatusCode::OK, Json(CallbackAck::received()))
}
