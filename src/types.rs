//! Resource identifier types
//!
//! Dashboard forms and table actions hand us resource IDs as text. Depending
//! on the network backend those IDs are either integer keys (nova-network) or
//! UUID strings (neutron). These types classify the raw value once, at the
//! boundary, so the rest of the crate only ever sees a [`ResourceId`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Length of the hyphenated UUID form: `8-4-4-4-12`
const HYPHENATED_UUID_LEN: usize = 36;

/// Raw identifier as supplied by a caller
///
/// JSON `100` deserializes as `Integer`, JSON `"100"` as `Text`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(untagged)]
pub enum Identifier {
    Integer(i64),
    Text(String),
}

/// Classified identifier: an integer key or a UUID string
///
/// The UUID variant keeps the caller's original text, including case.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(untagged, try_from = "Identifier")]
pub enum ResourceId {
    Integer(i64),
    Uuid(String),
}

/// The value is neither an integer nor a UUID string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid identifier {input:?}: expected an integer or a UUID")]
pub struct InvalidIdentifier {
    input: String,
}

impl InvalidIdentifier {
    fn new(input: impl Into<String>) -> Self {
        Self { input: input.into() }
    }

    /// The rejected input, rendered as text
    pub fn input(&self) -> &str {
        &self.input
    }
}

/// Classify `identifier` as an integer ID or a UUID string.
///
/// - integers are returned unchanged
/// - strings holding a base-10 integer (optionally signed) are parsed
/// - strings in hyphenated UUID form are returned unchanged
///
/// Surrounding whitespace is ignored for both checks. Everything else,
/// including braced, URN and dash-less UUID spellings, is rejected.
pub fn get_int_or_uuid(identifier: impl Into<Identifier>) -> Result<ResourceId, InvalidIdentifier> {
    match identifier.into() {
        Identifier::Integer(n) => Ok(ResourceId::Integer(n)),
        Identifier::Text(text) => classify_text(text),
    }
}

fn classify_text(text: String) -> Result<ResourceId, InvalidIdentifier> {
    let trimmed = text.trim();

    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(ResourceId::Integer(n));
    }

    if is_hyphenated_uuid(trimmed) {
        return Ok(ResourceId::Uuid(text));
    }

    Err(InvalidIdentifier::new(text))
}

// `Uuid::try_parse` also takes the simple, braced and URN spellings; pinning
// the length restricts it to the hyphenated one.
fn is_hyphenated_uuid(s: &str) -> bool {
    s.len() == HYPHENATED_UUID_LEN && Uuid::try_parse(s).is_ok()
}

impl Identifier {
    /// Classify this identifier, see [`get_int_or_uuid`]
    pub fn classify(self) -> Result<ResourceId, InvalidIdentifier> {
        get_int_or_uuid(self)
    }
}

impl From<i64> for Identifier {
    fn from(n: i64) -> Self {
        Identifier::Integer(n)
    }
}

impl From<i32> for Identifier {
    fn from(n: i32) -> Self {
        Identifier::Integer(n.into())
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Identifier::Text(s)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Identifier::Text(s.to_string())
    }
}

impl From<ResourceId> for Identifier {
    fn from(id: ResourceId) -> Self {
        match id {
            ResourceId::Integer(n) => Identifier::Integer(n),
            ResourceId::Uuid(s) => Identifier::Text(s),
        }
    }
}

/// Accepts JSON integers and strings; every other JSON type is rejected.
impl TryFrom<&Value> for Identifier {
    type Error = InvalidIdentifier;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(Identifier::Integer)
                .ok_or_else(|| InvalidIdentifier::new(n.to_string())),
            Value::String(s) => Ok(Identifier::Text(s.clone())),
            other => Err(InvalidIdentifier::new(other.to_string())),
        }
    }
}

impl ResourceId {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ResourceId::Integer(n) => Some(*n),
            ResourceId::Uuid(_) => None,
        }
    }

    pub fn as_uuid(&self) -> Option<&str> {
        match self {
            ResourceId::Integer(_) => None,
            ResourceId::Uuid(s) => Some(s),
        }
    }

    pub fn is_uuid(&self) -> bool {
        matches!(self, ResourceId::Uuid(_))
    }

    /// Whether both IDs name the same resource
    ///
    /// UUIDs keep the caller's text, so two spellings of one UUID differ
    /// under `==`; here surrounding whitespace and hex case are ignored.
    pub fn matches(&self, other: &ResourceId) -> bool {
        match (self, other) {
            (ResourceId::Integer(a), ResourceId::Integer(b)) => a == b,
            (ResourceId::Uuid(a), ResourceId::Uuid(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
            _ => false,
        }
    }
}

impl TryFrom<Identifier> for ResourceId {
    type Error = InvalidIdentifier;

    fn try_from(identifier: Identifier) -> Result<Self, Self::Error> {
        get_int_or_uuid(identifier)
    }
}

impl From<Uuid> for ResourceId {
    fn from(uuid: Uuid) -> Self {
        ResourceId::Uuid(uuid.hyphenated().to_string())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Integer(n) => write!(f, "{}", n),
            ResourceId::Uuid(s) => write!(f, "{}", s),
        }
    }
}

impl FromStr for ResourceId {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        get_int_or_uuid(s)
    }
}
