//! steward-router — publishes the logical-role → physical-address mapping.
//!
//! The mapping is derived state: a pure function of a topology snapshot,
//! recomputed on every change and never mutated independently. Each
//! publication carries a strictly increasing generation number so
//! consumers can discard stale mappings after a failover.

pub mod router;
pub mod subscriber;

pub use router::{EndpointRouter, RouterError};
pub use subscriber::MappingSubscriber;
