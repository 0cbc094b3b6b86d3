//! In-process [`NetworkBackend`] backed by a JSON inventory
//!
//! Used by the `fipctl` binary and by tests. Every call is journaled so tests
//! can assert which backend operations a workflow performed, and individual
//! operations can be told to fail.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace};

use super::backend::{BackendError, NetworkBackend};
use super::types::{FloatingIp, FloatingIpTarget, Server};
use crate::types::ResourceId;

/// Snapshot of everything the memory backend knows about
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Inventory {
    #[serde(default)]
    pub floating_ips: Vec<FloatingIp>,
    #[serde(default)]
    pub targets: Vec<FloatingIpTarget>,
    #[serde(default)]
    pub servers: Vec<Server>,
}

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("failed to access inventory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed inventory {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Inventory {
    /// Read an inventory file; a missing file yields an empty inventory
    pub async fn load(path: &Path) -> Result<Self, InventoryError> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "INVENTORY: file missing, starting empty");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(InventoryError::Io { path: path.display().to_string(), source });
            }
        };

        serde_json::from_str(&raw).map_err(|source| InventoryError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    pub async fn save(&self, path: &Path) -> Result<(), InventoryError> {
        let io_err = |source| InventoryError::Io { path: path.display().to_string(), source };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let raw = serde_json::to_string_pretty(self).map_err(|source| InventoryError::Json {
            path: path.display().to_string(),
            source,
        })?;
        // Readers see either the previous inventory or the new one.
        let staging = staging_path(path);
        tokio::fs::write(&staging, raw).await.map_err(io_err)?;
        tokio::fs::rename(&staging, path).await.map_err(io_err)
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Backend operation names, used for journaling and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    TenantFloatingIpList,
    TenantFloatingIpGet,
    FloatingIpTargetList,
    FloatingIpAssociate,
    FloatingIpDisassociate,
    ServerList,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::TenantFloatingIpList => "tenant_floating_ip_list",
            Operation::TenantFloatingIpGet => "tenant_floating_ip_get",
            Operation::FloatingIpTargetList => "floating_ip_target_list",
            Operation::FloatingIpAssociate => "floating_ip_associate",
            Operation::FloatingIpDisassociate => "floating_ip_disassociate",
            Operation::ServerList => "server_list",
        }
    }
}

/// One recorded backend call with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    TenantFloatingIpList,
    TenantFloatingIpGet { ip_id: ResourceId },
    FloatingIpTargetList,
    FloatingIpAssociate { ip_id: ResourceId, target_id: ResourceId },
    FloatingIpDisassociate { ip_id: ResourceId, target_id: ResourceId },
    ServerList { all_tenants: bool },
}

impl BackendCall {
    pub fn operation(&self) -> Operation {
        match self {
            BackendCall::TenantFloatingIpList => Operation::TenantFloatingIpList,
            BackendCall::TenantFloatingIpGet { .. } => Operation::TenantFloatingIpGet,
            BackendCall::FloatingIpTargetList => Operation::FloatingIpTargetList,
            BackendCall::FloatingIpAssociate { .. } => Operation::FloatingIpAssociate,
            BackendCall::FloatingIpDisassociate { .. } => Operation::FloatingIpDisassociate,
            BackendCall::ServerList { .. } => Operation::ServerList,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    inventory: RwLock<Inventory>,
    journal: Mutex<Vec<BackendCall>>,
    failing: Mutex<HashSet<Operation>>,
}

impl MemoryBackend {
    pub fn new(inventory: Inventory) -> Self {
        Self {
            inventory: RwLock::new(inventory),
            ..Self::default()
        }
    }

    /// Make every later call to `operation` fail with a service error
    pub async fn fail_on(&self, operation: Operation) {
        self.failing.lock().await.insert(operation);
    }

    /// Calls made so far, oldest first
    pub async fn journal(&self) -> Vec<BackendCall> {
        self.journal.lock().await.clone()
    }

    pub async fn snapshot(&self) -> Inventory {
        self.inventory.read().await.clone()
    }

    async fn record(&self, call: BackendCall) -> Result<(), BackendError> {
        let operation = call.operation();
        trace!(call = ?call, "BACKEND: call");
        self.journal.lock().await.push(call);

        if self.failing.lock().await.contains(&operation) {
            debug!(operation = operation.name(), "BACKEND: injected failure");
            return Err(BackendError::service(operation.name(), "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkBackend for MemoryBackend {
    async fn tenant_floating_ip_list(&self) -> Result<Vec<FloatingIp>, BackendError> {
        self.record(BackendCall::TenantFloatingIpList).await?;
        Ok(self.inventory.read().await.floating_ips.clone())
    }

    async fn tenant_floating_ip_get(&self, ip_id: &ResourceId) -> Result<FloatingIp, BackendError> {
        self.record(BackendCall::TenantFloatingIpGet { ip_id: ip_id.clone() }).await?;
        self.inventory
            .read()
            .await
            .floating_ips
            .iter()
            .find(|fip| fip.id.matches(ip_id))
            .cloned()
            .ok_or_else(|| BackendError::FloatingIpNotFound(ip_id.clone()))
    }

    async fn floating_ip_target_list(&self) -> Result<Vec<FloatingIpTarget>, BackendError> {
        self.record(BackendCall::FloatingIpTargetList).await?;
        Ok(self.inventory.read().await.targets.clone())
    }

    async fn floating_ip_associate(
        &self,
        ip_id: &ResourceId,
        target_id: &ResourceId,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::FloatingIpAssociate {
            ip_id: ip_id.clone(),
            target_id: target_id.clone(),
        })
        .await?;

        let mut inventory = self.inventory.write().await;
        if !inventory.targets.iter().any(|t| t.id.matches(target_id)) {
            return Err(BackendError::TargetNotFound(target_id.clone()));
        }
        let fip = inventory
            .floating_ips
            .iter_mut()
            .find(|fip| fip.id.matches(ip_id))
            .ok_or_else(|| BackendError::FloatingIpNotFound(ip_id.clone()))?;
        if fip.is_associated() {
            return Err(BackendError::AlreadyAssociated(ip_id.clone()));
        }

        fip.instance_id = Some(target_id.clone());
        fip.fixed_ip = None;
        Ok(())
    }

    async fn floating_ip_disassociate(
        &self,
        ip_id: &ResourceId,
        target_id: &ResourceId,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::FloatingIpDisassociate {
            ip_id: ip_id.clone(),
            target_id: target_id.clone(),
        })
        .await?;

        let mut inventory = self.inventory.write().await;
        let fip = inventory
            .floating_ips
            .iter_mut()
            .find(|fip| fip.id.matches(ip_id))
            .ok_or_else(|| BackendError::FloatingIpNotFound(ip_id.clone()))?;
        if !fip.instance_id.as_ref().is_some_and(|id| id.matches(target_id)) {
            return Err(BackendError::NotAssociatedWith {
                ip_id: ip_id.clone(),
                target_id: target_id.clone(),
            });
        }

        fip.instance_id = None;
        fip.fixed_ip = None;
        Ok(())
    }

    async fn server_list(&self, all_tenants: bool) -> Result<(Vec<Server>, bool), BackendError> {
        self.record(BackendCall::ServerList { all_tenants }).await?;
        Ok((self.inventory.read().await.servers.clone(), false))
    }
}
