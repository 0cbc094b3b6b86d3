//! Floating IP activation - associate and disassociate public addresses
//!
//! Mirrors the floating IP panel of a cloud dashboard. Each workflow method
//! returns a stream of [`FloatingIpEvent`]s, ending with a redirect when the
//! caller should leave the current page:
//!
//! ```text
//! Caller                               FloatingIps
//!   |---- associate(ip_id, instance) ---->|
//!   |                                     |-- tenant_floating_ip_list
//!   |                                     |-- floating_ip_target_list
//!   |                                     |-- floating_ip_associate
//!   |<--- Associated ---------------------|
//!   |<--- Message(success) ---------------|
//!   |<--- Redirect(next or index) --------|
//! ```
//!
//! The cloud itself sits behind [`NetworkBackend`]; [`MemoryBackend`] keeps
//! an inventory in process.

mod activation;
mod backend;
mod memory;
mod types;

pub use activation::FloatingIps;
pub use backend::{BackendError, NetworkBackend};
pub use memory::{BackendCall, Inventory, InventoryError, MemoryBackend, Operation};
pub use types::{
    AssociateForm, FloatingIp, FloatingIpError, FloatingIpEvent, FloatingIpTarget, Message,
    MessageLevel, Server, TableAction, FLOATING_IPS_TABLE,
};
