//! Payment provider trait definitions
//!
//! Defines the common interface that payment providers implement.

use crate::error::AppResult;
use crate::payments::types::{PaymentInitiation, PaymentRequest};
use async_trait::async_trait;

/// Trait for payment provider implementations
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Initiate a payment prompt on the customer's phone
    ///
    /// # Arguments
    /// * `request` - Phone number, amount and order reference
    ///
    /// # Returns
    /// * `PaymentInitiation` - Remote tracking id plus the gateway's raw response
    async fn initiate_payment(&self, request: PaymentRequest) -> AppResult<PaymentInitiation>;

    /// Query the state of a previously initiated payment
    ///
    /// The gateway's response is returned unmodified; interpreting its
    /// result codes is left to the caller.
    async fn query_status(&self, tracking_id: &str) -> AppResult<serde_json::Value>;
}
