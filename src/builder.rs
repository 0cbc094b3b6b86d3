//! Floating IP builder - constructs a configured workflow instance
//!
//! This module is used by the `fipctl` binary and the integration tests.

use std::sync::Arc;

use crate::activations::floating_ips::{FloatingIps, Inventory, InventoryError, MemoryBackend};
use crate::config::FloatingIpConfig;

/// Build the floating IP workflow over the configured inventory file
pub async fn build_floating_ips(
    config: &FloatingIpConfig,
) -> Result<FloatingIps<MemoryBackend>, InventoryError> {
    let inventory = Inventory::load(&config.inventory_path).await?;
    tracing::debug!(
        path = %config.inventory_path.display(),
        floating_ips = inventory.floating_ips.len(),
        targets = inventory.targets.len(),
        "BUILDER: inventory loaded"
    );

    let backend = Arc::new(MemoryBackend::new(inventory));
    Ok(FloatingIps::new(backend, config.index_url.clone()))
}

/// Write the backend's current inventory back to the configured file
pub async fn persist_inventory(
    config: &FloatingIpConfig,
    floating_ips: &FloatingIps<MemoryBackend>,
) -> Result<(), InventoryError> {
    let inventory = floating_ips.backend().snapshot().await;
    inventory.save(&config.inventory_path).await
}
