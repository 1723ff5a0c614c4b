//! Ingestion of completed export jobs.
//!
//! Fetches every result file of a complete [`JobStatus`](crate::bulkfhir::JobStatus),
//! splits it into NDJSON records and hands each record to a
//! [`Pipeline`](crate::processing::Pipeline).

mod config;
mod error;
mod runner;

pub use config::RetryConfig;
pub use error::IngestError;
pub use runner::{ingest_results, IngestSummary};
