use anyhow::Context;
use loris_backend::api::{self, AppState};
use loris_backend::config::Config;
use loris_backend::payments::providers::MpesaProvider;
use loris_backend::storage::providers::BackblazeStorage;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging before anything can fail
    init_tracing();

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        tracing::error!("Invalid configuration: {:#}", e);
        e
    })?;

    // Log startup info
    tracing::info!("Starting Loris Backend");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!("B2 bucket: {}", config.storage.bucket_name);
    tracing::info!("M-Pesa endpoint: {}", config.mpesa.base_url);

    tokio::fs::create_dir_all(&config.server.upload_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create upload directory {}",
                config.server.upload_dir.display()
            )
        })?;

    let storage = BackblazeStorage::new(config.storage.clone())?;
    let payments = MpesaProvider::new(config.mpesa.clone())?;

    let state = AppState {
        storage: Arc::new(storage),
        payments: Arc::new(payments),
        upload_dir: config.server.upload_dir.clone(),
        expose_errors: config.server.is_development(),
    };

    // Build router
    let app = api::router(state, config.server.frontend_url.as_deref());

    // Start server
    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("HOST must be an IP address, got {}", config.server.host))?;
    let addr = SocketAddr::from((host, config.server.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// JSON logs in production, human-readable otherwise.
///
/// Runs before configuration is loaded, so the environment is read
/// straight from `ENVIRONMENT`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let production = std::env::var("ENVIRONMENT").is_ok_and(|env| env.trim() == "production");
    if production {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
