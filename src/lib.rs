//! Loris backend: image storage and M-Pesa payment gateway.
//!
//! Two adapters sit behind a small axum API. Each adapter caches its own
//! remote session, translates local requests into the remote wire format,
//! and normalizes remote responses and failures into [`error::AppError`].

pub mod api;
pub mod config;
pub mod error;
pub mod payments;
pub mod remote;
pub mod session;
pub mod storage;
