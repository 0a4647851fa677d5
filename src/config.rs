use crate::payments::providers::MpesaConfig;
use crate::storage::providers::BackblazeConfig;
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: BackblazeConfig,
    pub mpesa: MpesaConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    /// Origin allowed by CORS; `None` allows any origin
    pub frontend_url: Option<String>,
    /// Where incoming files are spooled before upload
    pub upload_dir: PathBuf,
}

impl ServerConfig {
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            environment: "development".to_string(),
            frontend_url: None,
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

/// Environment variables read through the `config` crate.
///
/// Keys are the lowercased variable names (`B2_KEY_ID` -> `b2_key_id`).
struct Settings(::config::Config);

impl Settings {
    fn from_env() -> Result<Self> {
        Self::from_source(::config::Environment::default())
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: ::config::Source + Send + Sync + 'static,
    {
        let settings = ::config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read environment")?;
        Ok(Self(settings))
    }

    fn optional(&self, key: &str) -> Option<String> {
        self.0
            .get_string(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key)
            .with_context(|| format!("{} not set", key.to_uppercase()))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.optional(key) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("{} must be a valid number", key.to_uppercase())),
            None => Ok(default),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_settings(&Settings::from_env()?)
    }

    fn from_settings(env: &Settings) -> Result<Self> {
        let timeout_secs = env.parsed("http_timeout_secs", DEFAULT_TIMEOUT_SECS)?;

        let server = ServerConfig {
            host: env.or("host", "0.0.0.0"),
            port: env.parsed("port", DEFAULT_PORT)?,
            environment: env.or("environment", "development"),
            frontend_url: env.optional("frontend_url"),
            upload_dir: PathBuf::from(env.or("upload_dir", "uploads")),
        };

        let storage_defaults = BackblazeConfig::default();
        let storage = BackblazeConfig {
            key_id: env.required("b2_key_id")?,
            application_key: env.required("b2_application_key")?,
            bucket_name: env.required("b2_bucket_name")?,
            bucket_id: env.optional("b2_bucket_id"),
            api_url: env.or("b2_api_url", &storage_defaults.api_url),
            public_url: env.or("b2_public_url", &storage_defaults.public_url),
            timeout_secs,
        };

        let mpesa_defaults = MpesaConfig::default();
        let mpesa = MpesaConfig {
            consumer_key: env.required("mpesa_consumer_key")?,
            consumer_secret: env.required("mpesa_consumer_secret")?,
            shortcode: env.required("mpesa_shortcode")?,
            passkey: env.required("mpesa_passkey")?,
            callback_url: env.or("mpesa_callback_url", &mpesa_defaults.callback_url),
            base_url: env.or("mpesa_base_url", &mpesa_defaults.base_url),
            account_reference: env.or("mpesa_account_reference", &mpesa_defaults.account_reference),
            timeout_secs,
        };

        let config = Config {
            server,
            storage,
            mpesa,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if self.server.port == 0 {
            return Err(anyhow!("PORT must be greater than 0"));
        }

        if let Some(origin) = &self.server.frontend_url {
            if !is_http_url(origin) {
                return Err(anyhow!("FRONTEND_URL must be an http(s) URL, got {}", origin));
            }
        }

        // Validate remote endpoints
        for (name, url) in [
            ("B2_API_URL", &self.storage.api_url),
            ("B2_PUBLIC_URL", &self.storage.public_url),
            ("MPESA_BASE_URL", &self.mpesa.base_url),
            ("MPESA_CALLBACK_URL", &self.mpesa.callback_url),
        ] {
            if !is_http_url(url) {
                return Err(anyhow!("{} must be an http(s) URL, got {}", name, url));
            }
        }

        if self.storage.bucket_name.trim().is_empty() {
            return Err(anyhow!("B2_BUCKET_NAME cannot be empty"));
        }

        if self.mpesa.shortcode.is_empty()
            || !self.mpesa.shortcode.chars().all(|c| c.is_ascii_digit())
        {
            return Err(anyhow!(
                "MPESA_SHORTCODE must be numeric, got {}",
                self.mpesa.shortcode
            ));
        }

        if self.storage.timeout_secs == 0 || self.mpesa.timeout_secs == 0 {
            return Err(anyhow!("HTTP_TIMEOUT_SECS must be greater than 0"));
        }

        Ok(())
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
