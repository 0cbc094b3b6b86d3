use crate::types::{get_int_or_uuid, InvalidIdentifier, ResourceId};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use super::backend::BackendError;

/// Table whose row actions this activation handles
pub const FLOATING_IPS_TABLE: &str = "floating_ips";

/// A public address allocated to the tenant
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct FloatingIp {
    pub id: ResourceId,
    pub ip: String,
    pub pool: String,
    /// Server the address is attached to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<ResourceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_ip: Option<String>,
}

impl FloatingIp {
    pub fn new(id: ResourceId, ip: impl Into<String>, pool: impl Into<String>) -> Self {
        Self {
            id,
            ip: ip.into(),
            pool: pool.into(),
            instance_id: None,
            fixed_ip: None,
        }
    }

    /// Mark the address as attached to `instance_id`
    pub fn attached_to(mut self, instance_id: ResourceId, fixed_ip: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id);
        self.fixed_ip = Some(fixed_ip.into());
        self
    }

    pub fn is_associated(&self) -> bool {
        self.instance_id.is_some()
    }
}

/// Something a floating IP can be attached to
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct FloatingIpTarget {
    pub id: ResourceId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Server {
    pub id: ResourceId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Success,
    Error,
}

/// User-facing notice raised by a workflow step
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Message {
    pub level: MessageLevel,
    pub text: String,
}

impl Message {
    pub fn success(text: impl Into<String>) -> Self {
        Self { level: MessageLevel::Success, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { level: MessageLevel::Error, text: text.into() }
    }
}

/// Events emitted by the floating IP workflow methods
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FloatingIpEvent {
    /// Options offered by the associate form
    Choices {
        ips: Vec<FloatingIp>,
        targets: Vec<FloatingIpTarget>,
    },

    /// Address attached to a target
    Associated { ip_id: ResourceId, target_id: ResourceId },

    /// Address detached from an instance
    Disassociated { ip_id: ResourceId, instance_id: ResourceId },

    /// Message for the user
    Message(Message),

    /// Where the caller should be sent next
    Redirect { url: String },

    /// Request could not be handled; `status` is the HTTP status to answer with
    Error { message: String, status: u16 },
}

impl FloatingIpEvent {
    pub fn redirect(url: impl Into<String>) -> Self {
        FloatingIpEvent::Redirect { url: url.into() }
    }

    pub fn from_error(err: &FloatingIpError) -> Self {
        FloatingIpEvent::Error {
            message: err.to_string(),
            status: err.status().as_u16(),
        }
    }
}

/// Validated associate form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociateForm {
    pub ip_id: ResourceId,
    pub instance_id: ResourceId,
}

impl AssociateForm {
    pub const IP_FIELD: &'static str = "ip_id";
    pub const INSTANCE_FIELD: &'static str = "instance_id";

    /// Build the form from raw posted fields
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, FloatingIpError> {
        let field = |name: &'static str| {
            fields
                .get(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(FloatingIpError::MissingField(name))
        };

        Ok(Self {
            ip_id: get_int_or_uuid(field(Self::IP_FIELD)?.as_str())?,
            instance_id: get_int_or_uuid(field(Self::INSTANCE_FIELD)?.as_str())?,
        })
    }
}

/// Row action posted by a dashboard table, encoded as `table__action__id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableAction {
    pub table: String,
    pub action: String,
    pub object_id: ResourceId,
}

impl TableAction {
    pub fn parse(raw: &str) -> Result<Self, FloatingIpError> {
        let mut parts = raw.splitn(3, "__");
        let (table, action, object_id) = match (parts.next(), parts.next(), parts.next()) {
            (Some(t), Some(a), Some(o)) if !t.is_empty() && !a.is_empty() => (t, a, o),
            _ => return Err(FloatingIpError::InvalidAction(raw.to_string())),
        };

        Ok(Self {
            table: table.to_string(),
            action: action.to_string(),
            object_id: get_int_or_uuid(object_id)?,
        })
    }
}

impl fmt::Display for TableAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}__{}__{}", self.table, self.action, self.object_id)
    }
}

/// Workflow-level failures
#[derive(Debug, Clone, Error)]
pub enum FloatingIpError {
    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifier),

    #[error("missing form field `{0}`")]
    MissingField(&'static str),

    #[error("unsupported table action `{0}`")]
    InvalidAction(String),

    #[error("{0} is not an available choice")]
    InvalidChoice(ResourceId),

    #[error("floating IP {0} is not associated")]
    NotAssociated(ResourceId),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl FloatingIpError {
    /// HTTP status a web layer should answer with
    pub fn status(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            FloatingIpError::InvalidIdentifier(_)
            | FloatingIpError::MissingField(_)
            | FloatingIpError::InvalidAction(_)
            | FloatingIpError::InvalidChoice(_) => StatusCode::BAD_REQUEST,
            FloatingIpError::NotAssociated(_) => StatusCode::CONFLICT,
            FloatingIpError::Backend(e) => e.status(),
        }
    }
}
