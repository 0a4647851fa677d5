//! Payment provider types and data structures

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payment request for initiating an STK push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Customer phone number, any accepted local or international form
    pub phone_number: String,
    /// Amount in whole currency units; rounded before submission
    pub amount: f64,
    /// Merchant order reference
    pub order_ref: String,
}

/// Result of a successful payment initiation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiation {
    /// Remote handle used to query status later (`CheckoutRequestID`)
    pub tracking_id: String,
    /// Gateway response, unmodified
    pub raw_status: Value,
}

/// Acknowledgement returned to the gateway for every callback delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: u8,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl CallbackAck {
    pub fn received() -> Self {
        Self {
            result_code: 0,
            result_desc: "Callback received successfully".to_string(),
        }
    }
}

/// Callback delivery envelope: `{ "Body": { "stkCallback": { ... } } }`
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub result_code: i64,
    #[serde(default)]
    pub result_desc: Option<String>,
    #[serde(default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<Value>,
}

/// Flattened view of a callback, for logging and downstream relay.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackSummary {
    pub merchant_request_id: Option<String>,
    pub checkout_request_id: String,
    pub result_code: i64,
    pub result_desc: Option<String>,
    pub amount: Option<f64>,
    pub receipt_number: Option<String>,
    pub phone_number: Option<String>,
}

impl CallbackSummary {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }
}

impl From<StkCallback> for CallbackSummary {
    fn from(callback: StkCallback) -> Self {
        let items = callback
            .callback_metadata
            .map(|m| m.items)
            .unwrap_or_default();
        let item = |name: &str| {
            items
                .iter()
                .find(|i| i.name == name)
                .and_then(|i| i.value.clone())
        };

        Self {
            amount: item("Amount").and_then(|v| v.as_f64()),
            receipt_number: item("MpesaReceiptNumber")
                .and_then(|v| v.as_str().map(str::to_string)),
            // delivered as a JSON number
            phone_number: item("PhoneNumber").map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            }),
            merchant_request_id: callback.merchant_request_id,
            checkout_request_id: callback.checkout_request_id,
            result_code: callback.result_code,
            result_desc: callback.result_desc,
        }
    }
}

/// Parse a raw callback delivery.
pub fn parse_callback(raw: &[u8]) -> Result<CallbackSummary, serde_json::Error> {
    let envelope: CallbackEnvelope = serde_json::from_slice(raw)?;
    Ok(envelope.body.stk_callback.into())
}
