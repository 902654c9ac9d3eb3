use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use switchboard::api::{
    create_adapter_router, create_compatibility_router, create_connection_router,
    create_webhook_router, AdapterApiState, ConnectionAppState, WebhookAppState,
    WebhookPlatformConfig,
};
use switchboard::config::{load_config, Capability, Platform};
use switchboard::credentials::CredentialStore;
use switchboard::event::NormalizedEvent;
use switchboard::webhook::SignatureScheme;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard=info".into()),
        )
        .init();

    info!("Switchboard starting...");

    let config_path =
        std::env::var("SWITCHBOARD_CONFIG").unwrap_or_else(|_| "switchboard.toml".to_string());
    let config = Arc::new(load_config(&config_path).context("Failed to load configuration")?);
    info!(
        path = %config_path,
        adapters = config.adapters.len(),
        "Configuration loaded"
    );

    // Credential store is optional; without the key the status and
    // connection-test endpoints degrade gracefully.
    let credential_store = match std::env::var("SWITCHBOARD_ENCRYPTION_KEY") {
        Ok(key) => Some(Arc::new(
            CredentialStore::new(&config.storage.credentials_db, &key)
                .context("Failed to initialize credential store")?,
        )),
        Err(_) => {
            warn!("SWITCHBOARD_ENCRYPTION_KEY not set; credential storage disabled");
            None
        }
    };

    // Webhook receivers for adapters that declare the capability.
    let mut platforms = HashMap::new();
    for (name, adapter) in &config.adapters {
        if !adapter.supports(Capability::Webhooks) {
            continue;
        }
        let Some(secret) = adapter.signing_secret() else {
            warn!(adapter = %name, "Webhooks capability set but no signing secret; skipping");
            continue;
        };
        let scheme = match adapter.platform {
            Platform::Facebook => SignatureScheme::HubSha256,
            Platform::Tiktok => SignatureScheme::TimestampNonceBody,
        };
        platforms.insert(
            adapter.platform.as_str().to_string(),
            WebhookPlatformConfig {
                platform: adapter.platform,
                scheme,
                secret: secret.to_string(),
                verify_token: adapter.verify_token.clone(),
            },
        );
    }
    info!(platforms = platforms.len(), "Webhook receivers configured");

    // Normalized events are forwarded to the configured sink.
    let (events_tx, events_rx) = mpsc::channel::<NormalizedEvent>(1024);
    let forwarder = tokio::spawn(forward_events(events_rx, config.sink.url.clone()));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_webhook_router(WebhookAppState {
        platforms,
        events: events_tx,
    })
    .merge(create_adapter_router(AdapterApiState {
        config: Arc::clone(&config),
        credential_store: credential_store.clone(),
    }))
    .merge(create_connection_router(ConnectionAppState {
        config: Arc::clone(&config),
        credential_store,
    }))
    .merge(create_compatibility_router())
    .layer(cors);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .context("Failed to bind server address")?;
    info!(addr = %config.server.bind_addr, "Switchboard API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server error");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    forwarder.abort();
    info!("Switchboard stopped");

    Ok(())
}

/// Drains the webhook event channel into the downstream sink. Delivery
/// failures are logged and the event dropped; providers already got
/// their ack and will not redeliver.
async fn forward_events(mut events: mpsc::Receiver<NormalizedEvent>, sink_url: String) {
    let client = reqwest::Client::new();
    while let Some(event) = events.recv().await {
        let correlation_id = event.correlation_id;
        match client.post(&sink_url).json(&event).send().await {
            Ok(response) if response.status().is_success() => {
                info!(%correlation_id, "Event forwarded to sink");
            }
            Ok(response) => {
                warn!(
                    %correlation_id,
                    status = %response.status(),
                    "Sink rejected event"
                );
            }
            Err(e) => {
                warn!(%correlation_id, error = %e, "Failed to forward event");
            }
        }
    }
}
