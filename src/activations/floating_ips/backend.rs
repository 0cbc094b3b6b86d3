//! Network API seam
//!
//! The workflow never talks to a cloud directly; it goes through
//! [`NetworkBackend`]. Implementations map their own failures onto
//! [`BackendError`].

use async_trait::async_trait;
use thiserror::Error;

use super::types::{FloatingIp, FloatingIpTarget, Server};
use crate::types::ResourceId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("floating IP {0} not found")]
    FloatingIpNotFound(ResourceId),

    #[error("target {0} not found")]
    TargetNotFound(ResourceId),

    #[error("floating IP {0} is already associated")]
    AlreadyAssociated(ResourceId),

    #[error("floating IP {ip_id} is not associated with {target_id}")]
    NotAssociatedWith { ip_id: ResourceId, target_id: ResourceId },

    /// The remote service refused or failed the call
    #[error("{operation} failed: {message}")]
    Service { operation: String, message: String },
}

impl BackendError {
    pub fn service(operation: impl Into<String>, message: impl Into<String>) -> Self {
        BackendError::Service {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            BackendError::FloatingIpNotFound(_) | BackendError::TargetNotFound(_) => StatusCode::NOT_FOUND,
            BackendError::AlreadyAssociated(_) | BackendError::NotAssociatedWith { .. } => StatusCode::CONFLICT,
            BackendError::Service { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Floating IP operations of a cloud network API
#[async_trait]
pub trait NetworkBackend: Send + Sync + 'static {
    /// All floating IPs allocated to the current tenant
    async fn tenant_floating_ip_list(&self) -> Result<Vec<FloatingIp>, BackendError>;

    async fn tenant_floating_ip_get(&self, ip_id: &ResourceId) -> Result<FloatingIp, BackendError>;

    /// Ports or servers a floating IP may be attached to
    async fn floating_ip_target_list(&self) -> Result<Vec<FloatingIpTarget>, BackendError>;

    async fn floating_ip_associate(
        &self,
        ip_id: &ResourceId,
        target_id: &ResourceId,
    ) -> Result<(), BackendError>;

    async fn floating_ip_disassociate(
        &self,
        ip_id: &ResourceId,
        target_id: &ResourceId,
    ) -> Result<(), BackendError>;

    /// Servers visible to the caller; the flag reports whether more pages exist
    async fn server_list(&self, all_tenants: bool) -> Result<(Vec<Server>, bool), BackendError>;
}
