//! M-Pesa (Safaricom Daraja) payment provider implementation
//!
//! Lipa Na M-Pesa Online (STK push) initiation and status queries. Every
//! request carries a bearer token from the OAuth endpoint plus a password
//! derived from the shortcode, passkey and a fresh timestamp. The token is
//! cached until a call fails; nothing is retried.

use crate::error::{AppError, AppResult};
use crate::payments::phone::parse_msisdn;
use crate::payments::traits::PaymentProvider;
use crate::payments::types::{PaymentInitiation, PaymentRequest};
use crate::remote::{describe_failure, read_json, string_field};
use crate::session::{Session, SessionCache};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info};

const SERVICE: &str = "M-Pesa";

/// Daraja timestamps are East Africa Time (UTC+3).
const EAT_OFFSET_HOURS: i64 = 3;

/// Largest single STK push Daraja accepts, in shillings.
pub const MAX_AMOUNT: u64 = 250_000;

const TOKEN_PATH: &str = "/oauth/v1/generate?grant_type=client_credentials";
const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";
const STK_QUERY_PATH: &str = "/mpesa/stkpushquery/v1/query";

/// M-Pesa provider configuration
#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    /// Paybill / till number
    pub shortcode: String,
    /// Lipa Na M-Pesa Online passkey
    pub passkey: String,
    /// Where Daraja delivers the payment result
    pub callback_url: String,
    /// Daraja base URL (defaults to the sandbox)
    pub base_url: String,
    /// Account reference shown to the customer
    pub account_reference: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for MpesaConfig {
    fn default() -> Self {
        Self {
            consumer_key: String::new(),
            consumer_secret: String::new(),
            shortcode: String::new(),
            passkey: String::new(),
            callback_url: "https://your-backend-url.railway.app/api/mpesa/callback".to_string(),
            base_url: "https://sandbox.safaricom.co.ke".to_string(),
            account_reference: "Loris Kenya".to_string(),
            timeout_secs: 30,
        }
    }
}

/// M-Pesa payment provider
pub struct MpesaProvider {
    config: MpesaConfig,
    client: Client,
    session: SessionCache<Session>,
}

impl MpesaProvider {
    pub fn new(config: MpesaConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            session: SessionCache::new("mpesa token"),
        })
    }

    /// Cached OAuth token, fetching one first if needed.
    pub async fn ensure_session(&self) -> AppResult<Session> {
        self.session.get_or_try_init(|| self.fetch_token()).await
    }

    pub async fn invalidate(&self) {
        self.session.invalidate().await;
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn fetch_token(&self) -> AppResult<Session> {
        let url = format!("{}{}", self.base_url(), TOKEN_PATH);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await
            .map_err(|e| AppError::auth(SERVICE, e.to_string()))?;
        let (status, body) = read_json(response)
            .await
            .map_err(|e| AppError::auth(SERVICE, e.to_string()))?;

        if !status.is_success() {
            error!("Error generating OAuth token: {}", describe_failure(status, &body));
            return Err(AppError::auth(SERVICE, describe_failure(status, &body)));
        }

        let token = string_field(&body, "access_token")
            .ok_or_else(|| AppError::auth(SERVICE, "response has no access_token"))?;

        info!("Obtained M-Pesa OAuth token");
        Ok(Session::new(token, self.base_url()))
    }

    /// Authenticated JSON POST to a Daraja endpoint.
    async fn post(&self, session: &Session, path: &str, body: &Value) -> AppResult<Value> {
        let url = format!("{}{}", session.api_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&session.token)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::payment(format!("{} request failed: {}", path, e)))?;
        let (status, body) = read_json(response)
            .await
            .map_err(|e| AppError::payment(format!("{} response unreadable: {}", path, e)))?;

        if status.is_success() {
            return Ok(body);
        }

        let detail = describe_failure(status, &body);
        Err(match string_field(&body, "errorMessage") {
            Some(remote) => AppError::payment_rejected(detail, remote),
            None => AppError::payment(detail),
        })
    }

    async fn submit_stk_push(
        &self,
        phone: &str,
        amount: u64,
        order_ref: &str,
    ) -> AppResult<PaymentInitiation> {
        let session = self.ensure_session().await?;
        let (timestamp, password) =
            credentials(&self.config.shortcode, &self.config.passkey, Utc::now());

        let body = json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": password,
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": amount,
            "PartyA": phone,
            "PartyB": self.config.shortcode,
            "PhoneNumber": phone,
            "CallBackURL": self.config.callback_url,
            "AccountReference": self.config.account_reference,
            "TransactionDesc": format!("Payment for order {}", order_ref),
        });

        let response = self.post(&session, STK_PUSH_PATH, &body).await?;
        let tracking_id = string_field(&response, "CheckoutRequestID")
            .ok_or_else(|| {
                AppError::payment(format!(
                    "STK push response has no CheckoutRequestID: {}",
                    response
                ))
            })?
            .to_string();

        info!(
            "STK push initiated: order={}, checkout_request_id={}",
            order_ref, tracking_id
        );

        Ok(PaymentInitiation {
            tracking_id,
            raw_status: response,
        })
    }

    async fn submit_status_query(&self, tracking_id: &str) -> AppResult<Value> {
        let session = self.ensure_session().await?;
        let (timestamp, password) =
            credentials(&self.config.shortcode, &self.config.passkey, Utc::now());

        let body = json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": password,
            "Timestamp": timestamp,
            "CheckoutRequestID": tracking_id,
        });

        let response = self.post(&session, STK_QUERY_PATH, &body).await?;
        info!("Transaction status retrieved: checkout_request_id={}", tracking_id);
        Ok(response)
    }
}

#[async_trait]
impl PaymentProvider for MpesaProvider {
    async fn initiate_payment(&self, request: PaymentRequest) -> AppResult<PaymentInitiation> {
        let phone = parse_msisdn(&request.phone_number)?;
        let amount = rounded_amount(request.amount)?;
        let order_ref = request.order_ref.trim();
        if order_ref.is_empty() {
            return Err(AppError::validation("Order ID is required"));
        }

        info!("Initiating M-Pesa payment: {} KES for order {}", amount, order_ref);

        let result = self.submit_stk_push(&phone, amount, order_ref).await;
        if let Err(e) = &result {
            error!("STK Push error: {}", e);
            self.invalidate().await;
        }
        result
    }

    async fn query_status(&self, tracking_id: &str) -> AppResult<Value> {
        let tracking_id = tracking_id.trim();
        if tracking_id.is_empty() {
            return Err(AppError::validation("Checkout request ID is required"));
        }

        let result = self.submit_status_query(tracking_id).await;
        if let Err(e) = &result {
            error!("Status check error: {}", e);
            self.invalidate().await;
        }
        result
    }
}

/// `YYYYMMDDHHMMSS` in East Africa Time.
pub fn timestamp(now: DateTime<Utc>) -> String {
    (now + ChronoDuration::hours(EAT_OFFSET_HOURS))
        .format("%Y%m%d%H%M%S")
        .to_string()
}

/// Base64 of `shortcode + passkey + timestamp`.
pub fn password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", shortcode, passkey, timestamp))
}

/// Fresh `(timestamp, password)` pair for one request.
pub fn credentials(shortcode: &str, passkey: &str, now: DateTime<Utc>) -> (String, String) {
    let ts = timestamp(now);
    let pw = password(shortcode, passkey, &ts);
    (ts, pw)
}

/// Round to whole shillings within `1..=MAX_AMOUNT`.
pub fn rounded_amount(amount: f64) -> AppResult<u64> {
    if !amount.is_finite() {
        return Err(AppError::validation("Amount must be a number"));
    }
    let rounded = amount.round();
    if rounded < 1.0 {
        return Err(AppError::validation("Amount must be at least 1"));
    }
    if rounded > MAX_AMOUNT as f64 {
        return Err(AppError::validation(format!(
            "Amount must not exceed {}",
            MAX_AMOUNT
        )));
    }
    Ok(rounded as u64)
}
