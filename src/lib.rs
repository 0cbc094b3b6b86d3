pub mod activations;
pub mod builder;
pub mod config;
pub mod types;

// Re-export commonly used items
pub use builder::build_floating_ips;
pub use config::FloatingIpConfig;
pub use types::{get_int_or_uuid, Identifier, InvalidIdentifier, ResourceId};
