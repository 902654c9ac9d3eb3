use adapter_manager::api::{create_router, ApiState};
use adapter_manager::registry::build_adapters;
use adapter_manager::{AdapterManager, HttpEventSink};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use switchboard::config::load_config;
use switchboard::credentials::CredentialStore;
use switchboard::cursor::SqliteCursorStore;
use switchboard::dispatch::OperationDispatcher;
use switchboard::executor::{AdapterProfile, ApiRequestExecutor};
use switchboard::rate_limit::RateLimiter;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adapter_manager=info".into()),
        )
        .init();

    info!("Adapter Manager starting...");

    let config_path =
        std::env::var("SWITCHBOARD_CONFIG").unwrap_or_else(|_| "switchboard.toml".to_string());
    let config = Arc::new(load_config(&config_path).context("Failed to load configuration")?);

    let encryption_key = std::env::var("SWITCHBOARD_ENCRYPTION_KEY")
        .context("SWITCHBOARD_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;

    let api_port: u16 = std::env::var("ADAPTER_API_PORT")
        .unwrap_or_else(|_| "3001".to_string())
        .parse()
        .context("ADAPTER_API_PORT must be a valid port number")?;

    info!(
        path = %config_path,
        adapters = config.adapters.len(),
        api_port = api_port,
        "Configuration loaded"
    );

    let credential_store = Arc::new(
        CredentialStore::new(&config.storage.credentials_db, &encryption_key)
            .context("Failed to initialize credential store")?,
    );
    let cursor_store = Arc::new(
        SqliteCursorStore::new(&config.storage.cursors_db)
            .context("Failed to initialize cursor store")?,
    );
    info!("Credential and cursor stores initialized");

    // Outbound side: one rate limiter and executor shared across
    // adapters, one dispatcher per adapter.
    let rate_limiter = Arc::new(RateLimiter::new());
    let mut executor = ApiRequestExecutor::new(Arc::clone(&rate_limiter), Arc::clone(&credential_store));

    let adapters = build_adapters(&config);
    for adapter in &adapters {
        let Some(adapter_config) = config.adapters.get(adapter.name()) else {
            continue;
        };
        executor.register_profile(AdapterProfile {
            adapter_id: adapter.name().to_string(),
            base_url: adapter_config.base_url.clone(),
            api_version: adapter_config.api_version.clone(),
            timeout: adapter_config.timeout(),
        });
        for operation in adapter.operations() {
            rate_limiter.set_limit(
                &operation.rate_key,
                adapter_config.rate_limit.limit,
                std::time::Duration::from_secs(adapter_config.rate_limit.window_secs),
            );
        }
    }

    let executor = Arc::new(executor);
    let mut dispatchers = HashMap::new();
    for adapter in &adapters {
        let mut dispatcher = OperationDispatcher::new(Arc::clone(&executor));
        dispatcher
            .register_all(adapter.operations())
            .context("Failed to register operation table")?;
        dispatchers.insert(adapter.name().to_string(), Arc::new(dispatcher));
    }
    info!(dispatchers = dispatchers.len(), "Operation tables registered");

    // Inbound side: poll schedulers under the manager.
    let sink = Arc::new(HttpEventSink::new(config.sink.url.clone()));
    let mut manager = AdapterManager::new(
        Arc::clone(&config),
        Arc::clone(&credential_store),
        cursor_store,
        sink,
    );
    let started = manager.start().await?;
    info!(schedulers_started = started, "Adapter manager started");

    let api_state = ApiState {
        dispatchers,
        status_map: manager.status_map(),
    };
    let router = create_router(api_state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", api_port))
        .await
        .context("Failed to bind adapter API port")?;
    info!(port = api_port, "Adapter API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Adapter API server error");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    manager.shutdown().await;
    info!("Adapter manager stopped");

    Ok(())
}
