//! Processor that keeps only selected resource types.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::bulkfhir::ResourceType;

use super::error::ProcessingError;
use super::resource::ResourceWrapper;
use super::traits::{Output, Processor, ProcessorBase};

/// Forwards resources whose type is in the allowed set and drops the rest.
#[derive(Debug)]
pub struct ResourceTypeFilter {
    base: ProcessorBase,
    allowed: HashSet<ResourceType>,
    dropped: u64,
}

impl ResourceTypeFilter {
    pub fn new(allowed: impl IntoIterator<Item = ResourceType>) -> Self {
        Self {
            base: ProcessorBase::new(),
            allowed: allowed.into_iter().collect(),
            dropped: 0,
        }
    }

    /// Number of resources dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[async_trait]
impl Processor for ResourceTypeFilter {
    fn name(&self) -> &str {
        "resource_type_filter"
    }

    fn set_output(&mut self, output: Output) {
        self.base.set_output(output);
    }

    async fn process(&mut self, resource: ResourceWrapper) -> Result<(), ProcessingError> {
        if self.allowed.contains(&resource.resource_type()) {
            return self.base.emit(resource).await;
        }
        trace!(resource_type = %resource.resource_type(), "Dropping filtered resource");
        self.dropped += 1;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), ProcessingError> {
        debug!(dropped = self.dropped, "Resource type filter finished");
        self.base.finalize().await
    }
}
