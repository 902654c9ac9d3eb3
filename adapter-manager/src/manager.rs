//! Adapter manager: orchestrates the polling lifecycle.
//!
//! Builds adapters from configuration, starts a poll scheduler for each
//! credentialed polling adapter, and runs a discovery cycle that picks
//! up newly stored credentials, restarts schedulers stuck in an error
//! state, and tears down schedulers whose credentials were deleted.

use crate::adapter::Adapter;
use crate::registry::build_adapters;
use crate::scheduler::{PollScheduler, PollStatus};
use crate::sink::EventSink;
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use switchboard::config::{Capability, SwitchboardConfig};
use switchboard::credentials::{CredentialStore, TokenRefresher};
use switchboard::cursor::CursorStore;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{info, warn};

const DISCOVERY_INTERVAL_SECS: u64 = 60;

type StatusMap = HashMap<String, Arc<tokio::sync::Mutex<PollStatus>>>;

pub struct AdapterManager {
    config: Arc<SwitchboardConfig>,
    credential_store: Arc<CredentialStore>,
    refresher: Arc<TokenRefresher>,
    cursor_store: Arc<dyn CursorStore>,
    sink: Arc<dyn EventSink>,
    discovery_handle: Option<JoinHandle<()>>,
    status_map: Arc<tokio::sync::Mutex<StatusMap>>,
    scheduler_handles: Arc<tokio::sync::Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl AdapterManager {
    pub fn new(
        config: Arc<SwitchboardConfig>,
        credential_store: Arc<CredentialStore>,
        cursor_store: Arc<dyn CursorStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let refresher = Arc::new(TokenRefresher::new(Arc::clone(&credential_store)));
        Self {
            config,
            credential_store,
            refresher,
            cursor_store,
            sink,
            discovery_handle: None,
            status_map: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            scheduler_handles: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }

    /// Returns a clone of the status map for external monitoring.
    pub fn status_map(&self) -> Arc<tokio::sync::Mutex<StatusMap>> {
        Arc::clone(&self.status_map)
    }

    /// Starts schedulers for every credentialed polling adapter, then
    /// spawns the discovery loop. Returns the number of schedulers
    /// started.
    pub async fn start(&mut self) -> Result<usize> {
        info!("Starting adapter manager");

        let adapters = build_adapters(&self.config);
        info!(adapter_count = adapters.len(), "Loaded adapters");

        let mut started = 0;
        for adapter in &adapters {
            if !adapter.capabilities().contains(&Capability::Polling) {
                continue;
            }
            match self.start_scheduler(Arc::clone(adapter)).await {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    adapter = %adapter.name(),
                    error = %e,
                    "Failed to start scheduler"
                ),
            }
        }

        if started == 0 {
            info!("No credentialed polling adapters; waiting for authorization");
        }

        let config = Arc::clone(&self.config);
        let cred_store = Arc::clone(&self.credential_store);
        let refresher = Arc::clone(&self.refresher);
        let cursor_store = Arc::clone(&self.cursor_store);
        let sink = Arc::clone(&self.sink);
        let status_map = Arc::clone(&self.status_map);
        let handles = Arc::clone(&self.scheduler_handles);

        self.discovery_handle = Some(tokio::spawn(async move {
            let mut interval = time::interval(time::Duration::from_secs(DISCOVERY_INTERVAL_SECS));
            interval.tick().await; // initial scan already done above

            loop {
                interval.tick().await;
                run_discovery_cycle(
                    &config,
                    &cred_store,
                    &refresher,
                    &cursor_store,
                    &sink,
                    &status_map,
                    &handles,
                )
                .await;
            }
        }));

        Ok(started)
    }

    /// Starts (or restarts) the scheduler for one adapter. Returns
    /// false when the adapter has no stored credentials yet.
    async fn start_scheduler(&self, adapter: Arc<dyn Adapter>) -> Result<bool> {
        let name = adapter.name().to_string();

        if self
            .credential_store
            .get(&name)
            .context("Failed to read credentials")?
            .is_none()
        {
            return Ok(false);
        }

        let scheduler = PollScheduler::new(
            adapter,
            Arc::clone(&self.refresher),
            Arc::clone(&self.cursor_store),
            Arc::clone(&self.sink),
        );
        let status = scheduler.status();
        let handle = scheduler.start();

        {
            let mut handles = self.scheduler_handles.lock().await;
            if let Some(old) = handles.remove(&name) {
                old.abort();
                info!(adapter = %name, "Aborted existing scheduler before restart");
            }
            handles.insert(name.clone(), handle);
        }
        self.status_map.lock().await.insert(name.clone(), status);

        info!(adapter = %name, "Poll scheduler started");
        Ok(true)
    }

    /// Aborts the discovery loop and all schedulers.
    pub async fn shutdown(&mut self) {
        info!("Shutting down adapter manager");

        if let Some(handle) = self.discovery_handle.take() {
            handle.abort();
        }

        let mut handles = self.scheduler_handles.lock().await;
        let count = handles.len();
        for (_, handle) in handles.drain() {
            handle.abort();
        }
        self.status_map.lock().await.clear();

        info!(scheduler_count = count, "All scheduler tasks aborted");
    }
}

impl Drop for AdapterManager {
    fn drop(&mut self) {
        if let Some(handle) = self.discovery_handle.take() {
            handle.abort();
        }
        // Drop is sync; best-effort abort via try_lock.
        if let Ok(mut handles) = self.scheduler_handles.try_lock() {
            for (_, handle) in handles.drain() {
                handle.abort();
            }
        }
    }
}

/// One discovery iteration: tears down schedulers for deleted
/// credentials, restarts errored ones, and starts schedulers for newly
/// credentialed adapters.
#[allow(clippy::too_many_arguments)]
async fn run_discovery_cycle(
    config: &Arc<SwitchboardConfig>,
    cred_store: &Arc<CredentialStore>,
    refresher: &Arc<TokenRefresher>,
    cursor_store: &Arc<dyn CursorStore>,
    sink: &Arc<dyn EventSink>,
    status_map: &Arc<tokio::sync::Mutex<StatusMap>>,
    handles: &Arc<tokio::sync::Mutex<HashMap<String, JoinHandle<()>>>>,
) {
    let credentialed: HashSet<String> = match cred_store.list_adapters() {
        Ok(names) => names.into_iter().collect(),
        Err(e) => {
            warn!(error = %e, "Discovery: failed to list credentials");
            return;
        }
    };

    let adapters = build_adapters(config);

    let existing: Vec<(String, Arc<tokio::sync::Mutex<PollStatus>>)> = {
        let map = status_map.lock().await;
        map.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
    };

    let mut to_remove = Vec::new();
    let mut to_restart = Vec::new();
    for (name, status_arc) in &existing {
        if !credentialed.contains(name) {
            to_remove.push(name.clone());
        } else if status_arc.lock().await.last_error.is_some() {
            to_restart.push(name.clone());
        }
    }

    for name in &to_remove {
        if let Some(handle) = handles.lock().await.remove(name) {
            handle.abort();
        }
        status_map.lock().await.remove(name);
        info!(adapter = %name, "Scheduler removed (credentials deleted)");
    }

    let running: HashSet<String> = status_map.lock().await.keys().cloned().collect();

    for adapter in adapters {
        let name = adapter.name().to_string();
        let is_polling = adapter.capabilities().contains(&Capability::Polling);
        let needs_start = credentialed.contains(&name)
            && is_polling
            && (!running.contains(&name) || to_restart.contains(&name));
        if !needs_start {
            continue;
        }

        if to_restart.contains(&name) {
            info!(adapter = %name, "Restarting errored scheduler");
        } else {
            info!(adapter = %name, "Starting scheduler for new credentials");
        }

        let scheduler = PollScheduler::new(
            adapter,
            Arc::clone(refresher),
            Arc::clone(cursor_store),
            Arc::clone(sink),
        );
        let status = scheduler.status();
        let handle = scheduler.start();

        {
            let mut handle_map = handles.lock().await;
            if let Some(old) = handle_map.remove(&name) {
                old.abort();
            }
            handle_map.insert(name.clone(), handle);
        }
        status_map.lock().await.insert(name, status);
    }
}
