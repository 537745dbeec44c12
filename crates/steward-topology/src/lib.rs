//! steward-topology — the controller's authoritative view of the cluster.
//!
//! Holds the process-local `TopologyStore` (node records behind per-node
//! locks, snapshot reads), the domain types shared across subsystems, and
//! the `ClusterBackend` trait through which all cluster mutations flow.
//!
//! # Write discipline
//!
//! The topology is owned exclusively by the controller process. Health and
//! lag fields are written only through `TopologyStore::record_probe`; role
//! and primary fields only through `set_role` / `set_primary`. Readers take
//! a `snapshot()` and never observe a half-applied node record.

pub mod backend;
pub mod error;
pub mod store;
pub mod types;

pub use backend::ClusterBackend;
pub use error::{TopologyError, TopologyResult};
pub use store::{TopologySnapshot, TopologyStore};
pub use types::*;
