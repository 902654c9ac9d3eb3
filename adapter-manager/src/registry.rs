//! Adapter registry: builds adapter instances from configuration.

use crate::adapter::Adapter;
use crate::adapters::{FacebookAdapter, TiktokAdapter};
use std::sync::Arc;
use switchboard::config::{Platform, SwitchboardConfig};

/// Constructs one adapter per `[adapters.<name>]` block.
pub fn build_adapters(config: &SwitchboardConfig) -> Vec<Arc<dyn Adapter>> {
    let mut adapters: Vec<Arc<dyn Adapter>> = config
        .adapters
        .iter()
        .map(|(name, adapter_config)| match adapter_config.platform {
            Platform::Facebook => Arc::new(FacebookAdapter::new(
                name.clone(),
                adapter_config.clone(),
            )) as Arc<dyn Adapter>,
            Platform::Tiktok => Arc::new(TiktokAdapter::new(
                name.clone(),
                adapter_config.clone(),
            )) as Arc<dyn Adapter>,
        })
        .collect();
    adapters.sort_by(|a, b| a.name().cmp(b.name()));
    adapters
}
