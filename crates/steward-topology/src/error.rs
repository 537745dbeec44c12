//! Error types for topology operations.

use thiserror::Error;

/// Result type alias for topology operations.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors that can occur while mutating the topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("node already registered: {0}")]
    DuplicateNode(String),

    #[error("a promotion is already in flight")]
    PromotionInFlight,
}
