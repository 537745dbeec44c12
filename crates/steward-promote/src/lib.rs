//! steward-promote — promotes exactly one replica after a confirmed
//! primary failure.
//!
//! Ordering is the whole point of this crate: the old primary is fenced
//! *before* any candidate is promoted, so a primary that is alive but
//! unreachable by the observer majority can never keep accepting writes
//! alongside its successor.
//!
//! Candidate selection is deterministic — minimum replication lag,
//! ties broken by lowest node id — so a given topology always fails
//! over the same way. A candidate that does not assume the role within
//! the promotion timeout is fenced as well and the next one is tried.
//! When no candidate remains the coordinator fails stop: the primary
//! stays unset and automatic remediation halts until an operator forces
//! a failover. Promoting a stale or unreachable node silently would
//! risk data loss.

pub mod coordinator;

pub use coordinator::{PromoteError, PromotionCoordinator};
