use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Errors surfaced by the storage and payment adapters.
///
/// `Display` carries the full detail for logs; [`AppError::public_message`]
/// is what a client is allowed to see outside development mode.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    Validation { message: String },

    #[error("Authentication with {service} failed: {message}")]
    Auth {
        service: &'static str,
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{message}")]
    NotFound { message: String },

    #[error("Upload failed: {message}")]
    Upload { message: String },

    #[error("Delete failed: {message}")]
    Delete { message: String },

    #[error("Payment request failed: {message}")]
    Payment {
        message: String,
        remote_message: Option<String>,
    },
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn auth(service: &'static str, message: impl Into<String>) -> Self {
        Self::Auth {
            service,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn upload(message: impl Into<String>) -> Self {
        Self::Upload {
            message: message.into(),
        }
    }

    pub fn delete(message: impl Into<String>) -> Self {
        Self::Delete {
            message: message.into(),
        }
    }

    pub fn payment(message: impl Into<String>) -> Self {
        Self::Payment {
            message: message.into(),
            remote_message: None,
        }
    }

    /// Payment failure carrying the gateway's own explanation, which is
    /// relayed to the client as-is.
    pub fn payment_rejected(message: impl Into<String>, remote_message: impl Into<String>) -> Self {
        Self::Payment {
            message: message.into(),
            remote_message: Some(remote_message.into()),
        }
    }

    /// Message safe to return to API clients.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation { message } | Self::NotFound { message } => message.clone(),
            Self::Auth { service, .. } => format!("Failed to authenticate with {}", service),
            Self::Config { .. } => "Storage target is not configured correctly".to_string(),
            Self::Upload { .. } => "Failed to upload file to storage".to_string(),
            Self::Delete { .. } => "Failed to delete file from storage".to_string(),
            Self::Payment { remote_message, .. } => remote_message
                .clone()
                .unwrap_or_else(|| "Payment gateway request failed".to_string()),
        }
    }

    /// True when the error was raised before any remote call was made.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
