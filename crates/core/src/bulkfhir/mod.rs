//! Bulk FHIR export client.
//!
//! This module provides the `BulkDataClient` trait for driving an
//! asynchronous `$export` job, the HTTP implementation `BulkFhirClient`,
//! and the `JobMonitor` which polls a job in the background:
//!
//! 1. `authenticate` fetches a bearer token
//! 2. `start_export` kicks off the job and returns its status URL
//! 3. `JobMonitor::spawn` polls the status URL and streams `MonitorEvent`s
//! 4. `get_data` streams each NDJSON result file
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use bulkfhir_core::bulkfhir::{BulkDataClient, BulkFhirClient, JobMonitor, ALL_RESOURCE_TYPES};
//!
//! let client = Arc::new(BulkFhirClient::new(config.server.clone())?);
//! client.authenticate().await?;
//! let status_url = client.start_export(&ALL_RESOURCE_TYPES, None, "all").await?;
//!
//! let mut events = JobMonitor::new(client.clone(), config.monitor.clone()).spawn(status_url);
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

mod client;
mod error;
mod monitor;
mod types;

pub use client::BulkFhirClient;
pub use error::BulkFhirError;
pub use monitor::JobMonitor;
pub use types::{
    parse_fhir_instant, resource_types_to_query_value, to_fhir_instant, BulkDataClient,
    DataStream, JobStatus, MonitorEvent, ResourceType, ALL_RESOURCE_TYPES, EXPORT_GROUP_ALL,
};
