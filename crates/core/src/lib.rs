pub mod bulkfhir;
pub mod config;
pub mod ingest;
pub mod processing;
pub mod testing;

pub use bulkfhir::{
    BulkDataClient, BulkFhirClient, BulkFhirError, JobMonitor, JobStatus, MonitorEvent,
    ResourceType,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use ingest::{ingest_results, IngestError, IngestSummary, RetryConfig};
pub use processing::{Pipeline, ProcessingError, Processor, ResourceWrapper, Sink};
