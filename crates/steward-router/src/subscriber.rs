//! Consumer-side mapping guard.

use tracing::error;

use steward_topology::EndpointMapping;

use crate::router::RouterError;

/// Applies mappings in generation order on behalf of a consumer.
///
/// A mapping whose generation does not strictly exceed the last applied
/// one is rejected. The controller never publishes out of order, so a
/// rejection indicates a bug upstream and is logged at error level.
#[derive(Debug, Default)]
pub struct MappingSubscriber {
    last_generation: u64,
    mapping: Option<EndpointMapping>,
}

impl MappingSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a received mapping. Returns the stale-mapping error on a
    /// generation regression.
    pub fn apply(&mut self, mapping: EndpointMapping) -> Result<(), RouterError> {
        if mapping.generation <= self.last_generation {
            error!(
                seen = mapping.generation,
                last = self.last_generation,
                "stale endpoint mapping rejected"
            );
            return Err(RouterError::StaleMappingRejected {
                seen: mapping.generation,
                last: self.last_generation,
            });
        }
        self.last_generation = mapping.generation;
        self.mapping = Some(mapping);
        Ok(())
    }

    /// The last applied mapping.
    pub fn mapping(&self) -> Option<&EndpointMapping> {
        self.mapping.as_ref()
    }

    /// Generation of the last applied mapping.
    pub fn last_generation(&self) -> u64 {
        self.last_generation
    }
}
