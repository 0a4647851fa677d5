//! Payment provider integration module
//!
//! Mobile-money payment initiation and status queries against a remote
//! payment gateway, plus parsing of the gateway's asynchronous callbacks.

pub mod phone;
pub mod providers;
pub mod traits;
pub mod types;

pub use traits::PaymentProvider;
pub use types::{PaymentInitiation, PaymentRequest};
