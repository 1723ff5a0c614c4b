//! Sink that logs every resource it receives.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::bulkfhir::ResourceType;

use super::error::ProcessingError;
use super::resource::ResourceWrapper;
use super::traits::Sink;

/// Logs each written resource at debug level and a per-type summary on finalize.
#[derive(Debug, Default)]
pub struct TracingSink {
    counts: BTreeMap<ResourceType, u64>,
    bytes: u64,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resources written so far, per type.
    pub fn counts(&self) -> &BTreeMap<ResourceType, u64> {
        &self.counts
    }
}

#[async_trait]
impl Sink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn write(&mut self, resource: &mut ResourceWrapper) -> Result<(), ProcessingError> {
        let len = resource.json()?.len();
        debug!(
            resource_type = %resource.resource_type(),
            source_url = resource.source_url(),
            bytes = len,
            "Resource written"
        );
        *self.counts.entry(resource.resource_type()).or_default() += 1;
        self.bytes += len as u64;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), ProcessingError> {
        for (resource_type, count) in &self.counts {
            info!(resource_type = %resource_type, count, "Resources written");
        }
        info!(bytes = self.bytes, "Tracing sink finished");
        Ok(())
    }
}
