//! steward-autoscale — adjusts the replica set within configured bounds.
//!
//! An independent control loop over the aggregated load signals. The
//! reaction is deliberately asymmetric: a higher desired count is
//! applied the moment it is computed, while a lower one must persist
//! for a stabilization window and is rate-limited per tick. Transient
//! load dips therefore never flap the replica set, but spikes are met
//! immediately.

pub mod scaler;

pub use scaler::{Autoscaler, ScalePolicy};
