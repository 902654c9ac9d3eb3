//! Per-adapter polling scheduler.
//!
//! Each polling adapter gets its own scheduler: tick on an interval,
//! refresh the token if it is near expiry, fetch items newer than the
//! stream cursor, emit normalized events, then advance the cursor.
//! The cursor moves only after the whole batch is delivered, so an
//! interrupted tick re-emits from the old position (at-least-once;
//! downstream dedupes by item id).

use crate::adapter::Adapter;
use crate::sink::EventSink;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use switchboard::credentials::TokenRefresher;
use switchboard::cursor::CursorStore;
use switchboard::event::validate;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

const MAX_TICK_RETRIES: u32 = 3;
const BACKOFF_DELAYS_SECS: [u64; 2] = [60, 120];

/// Status information for one polling adapter.
#[derive(Clone, Debug, Default)]
pub struct PollStatus {
    pub last_poll: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub poll_count: u64,
    pub error_count: u64,
    pub events_emitted: u64,
}

/// Polls one adapter's streams on a fixed interval.
pub struct PollScheduler {
    adapter: Arc<dyn Adapter>,
    refresher: Arc<TokenRefresher>,
    cursor_store: Arc<dyn CursorStore>,
    sink: Arc<dyn EventSink>,
    status: Arc<tokio::sync::Mutex<PollStatus>>,
}

impl PollScheduler {
    pub fn new(
        adapter: Arc<dyn Adapter>,
        refresher: Arc<TokenRefresher>,
        cursor_store: Arc<dyn CursorStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            adapter,
            refresher,
            cursor_store,
            sink,
            status: Arc::new(tokio::sync::Mutex::new(PollStatus::default())),
        }
    }

    /// Returns a clone of the status tracker for external monitoring.
    pub fn status(&self) -> Arc<tokio::sync::Mutex<PollStatus>> {
        Arc::clone(&self.status)
    }

    /// Runs one poll tick across all streams. Returns the number of
    /// events emitted.
    ///
    /// Streams are independent: a failing stream aborts the tick, but
    /// streams already completed keep their advanced cursors.
    pub async fn run_once(&self) -> Result<u64> {
        let adapter_id = self.adapter.name().to_string();

        let credentials = self
            .refresher
            .refresh_if_needed(&adapter_id, &self.adapter.oauth_endpoint())
            .await
            .context("Token refresh failed")?;

        let mut emitted = 0u64;
        for stream in self.adapter.streams() {
            let cursor_key = format!("{}:{}", adapter_id, stream);
            let cursor = self
                .cursor_store
                .get(&cursor_key)
                .context("Failed to read poll cursor")?;

            let mut items = self
                .adapter
                .fetch_newer_than(&credentials.access_token, &stream, cursor.as_deref())
                .await
                .with_context(|| format!("Failed to fetch stream '{}'", stream))?;

            if items.is_empty() {
                debug!(adapter = %adapter_id, stream = %stream, "No new items");
                continue;
            }

            // Oldest first so a partial failure leaves a contiguous
            // prefix delivered and the cursor points at its end.
            items.sort_by_key(|item| item.created_time);

            for item in &items {
                let event = self.adapter.normalize(&stream, item);
                // Malformed vendor data must not wedge the stream:
                // drop the item and let the cursor move past it.
                if let Err(e) = validate(&event) {
                    warn!(
                        adapter = %adapter_id,
                        stream = %stream,
                        item = %item.id,
                        error = %e,
                        "Dropping invalid event"
                    );
                    continue;
                }
                self.sink
                    .emit(&event)
                    .await
                    .with_context(|| format!("Failed to emit item '{}'", item.id))?;
                emitted += 1;
            }

            // Advance only after the full batch is delivered.
            let last = &items[items.len() - 1];
            self.cursor_store
                .set(&cursor_key, &last.cursor)
                .context("Failed to advance poll cursor")?;

            info!(
                adapter = %adapter_id,
                stream = %stream,
                items = items.len(),
                cursor = %last.cursor,
                "Stream polled"
            );
        }

        Ok(emitted)
    }

    /// Runs one tick with bounded retries and backoff.
    async fn run_once_with_retry(&self) -> Result<u64> {
        let mut last_error = None;

        for attempt in 0..MAX_TICK_RETRIES {
            match self.run_once().await {
                Ok(emitted) => return Ok(emitted),
                Err(e) => {
                    warn!(
                        adapter = %self.adapter.name(),
                        attempt = attempt + 1,
                        max_retries = MAX_TICK_RETRIES,
                        error = %e,
                        "Poll tick failed, will retry"
                    );
                    last_error = Some(e);
                    if attempt < MAX_TICK_RETRIES - 1 {
                        let delay = BACKOFF_DELAYS_SECS[attempt as usize];
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("poll tick failed")))
    }

    /// Starts the polling loop (non-blocking). Returns a JoinHandle
    /// used for shutdown.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        let poll_interval_secs = self.adapter.poll_interval();
        let adapter_id = self.adapter.name().to_string();

        tokio::spawn(async move {
            info!(
                adapter = %adapter_id,
                interval_secs = poll_interval_secs,
                "Starting poll scheduler"
            );

            let mut ticker = interval(Duration::from_secs(poll_interval_secs));
            let scheduler = self;

            loop {
                ticker.tick().await;

                match scheduler.run_once_with_retry().await {
                    Ok(emitted) => {
                        let mut status = scheduler.status.lock().await;
                        status.last_poll = Some(Utc::now());
                        status.last_error = None;
                        status.poll_count += 1;
                        status.events_emitted += emitted;
                    }
                    Err(e) => {
                        error!(
                            adapter = %adapter_id,
                            error = %e,
                            "Poll tick failed after retries"
                        );
                        let mut status = scheduler.status.lock().await;
                        status.last_error = Some(e.to_string());
                        status.error_count += 1;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests;
