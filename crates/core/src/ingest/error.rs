//! Error types for the ingest module.

use thiserror::Error;

use crate::bulkfhir::BulkFhirError;
use crate::processing::ProcessingError;

/// Errors that can occur while ingesting export results.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Fetching a result file failed.
    #[error(transparent)]
    Client(#[from] BulkFhirError),

    /// The pipeline rejected a resource.
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    /// Reading a result file failed part way through.
    #[error("Failed to read {url}: {source}")]
    Read {
        url: String,
        #[source]
        source: std::io::Error,
    },
}
