//! Downstream event delivery.

use anyhow::{Context, Result};
use async_trait::async_trait;
use switchboard::event::NormalizedEvent;
use tracing::debug;

/// Where normalized events go after polling. The HTTP implementation
/// posts to the event ingestion endpoint; tests swap in an in-memory
/// sink.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &NormalizedEvent) -> Result<()>;
}

/// Posts each event as JSON to a fixed URL.
pub struct HttpEventSink {
    url: String,
    http_client: reqwest::Client,
}

impl HttpEventSink {
    pub fn new(url: String) -> Self {
        Self {
            url,
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn emit(&self, event: &NormalizedEvent) -> Result<()> {
        let response = self
            .http_client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .context("Failed to send event to sink")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            anyhow::bail!("Event sink returned status {}: {}", status, body);
        }

        debug!(correlation_id = %event.correlation_id, "Event delivered");
        Ok(())
    }
}
