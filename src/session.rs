//! Cached remote sessions
//!
//! Each adapter owns its own [`SessionCache`] instances. A cache is filled
//! lazily on first use and cleared by the adapter whenever a downstream call
//! fails, so the next request starts again from a fresh handshake. There is
//! no expiry timer: staleness is only discovered through a failed call.

use crate::error::AppResult;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::debug;

/// Short-lived authorization obtained from a remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    /// Base URL subsequent API calls must be sent to.
    pub api_url: String,
    /// Account the token was issued for, when the service reports one.
    pub account_id: Option<String>,
}

impl Session {
    pub fn new(token: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: api_url.into(),
            account_id: None,
        }
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }
}

/// Single-slot cache with single-flight initialization.
///
/// The slot lock is held while the initializer runs, so callers racing on
/// an empty slot wait for one handshake instead of each issuing their own.
pub struct SessionCache<T> {
    name: &'static str,
    slot: Mutex<Option<T>>,
}

impl<T: Clone> SessionCache<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached value, running `init` first if the slot is empty.
    ///
    /// A failed `init` leaves the slot empty.
    pub async fn get_or_try_init<F, Fut>(&self, init: F) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(value) = slot.as_ref() {
            return Ok(value.clone());
        }

        debug!("{} cache empty, initializing", self.name);
        let value = init().await?;
        *slot = Some(value.clone());
        Ok(value)
    }

    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        if slot.take().is_some() {
            debug!("{} cache invalidated", self.name);
        }
    }
}
