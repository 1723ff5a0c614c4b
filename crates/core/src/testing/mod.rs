//! Testing utilities and mock implementations.
//!
//! This module provides a mock bulk data client and recording pipeline
//! stages, allowing export and ingest flows to be tested without a server.
//!
//! # Example
//!
//! ```rust,ignore
//! use bulkfhir_core::testing::{CallLog, MockBulkDataClient, MockSink};
//!
//! let client = MockBulkDataClient::new();
//! client.push_status(Ok(MockBulkDataClient::complete_status())).await;
//! client.push_data("mock://data/patient-1", Ok(fixtures::ndjson(&[patient]))).await;
//!
//! let log = CallLog::new();
//! let sink = MockSink::new("sink", log.clone());
//! ```

mod mock_bulk_client;
mod mock_stages;

pub use mock_bulk_client::{MockBulkDataClient, RecordedExport};
pub use mock_stages::{CallLog, MockProcessor, MockSink, ProcessorMode, WrittenResource};

/// Test fixtures and helper functions.
pub mod fixtures {
    use serde_json::{json, Value};

    /// A minimal Patient resource.
    pub fn patient(id: &str) -> Value {
        json!({ "resourceType": "Patient", "id": id })
    }

    /// A minimal Coverage resource pointing at a patient.
    pub fn coverage(id: &str, patient_id: &str) -> Value {
        json!({
            "resourceType": "Coverage",
            "id": id,
            "beneficiary": { "reference": format!("Patient/{}", patient_id) }
        })
    }

    /// Serializes resources as newline delimited JSON, one per line.
    pub fn ndjson(resources: &[Value]) -> Vec<u8> {
        let mut out = Vec::new();
        for resource in resources {
            out.extend_from_slice(resource.to_string().as_bytes());
            out.push(b'\n');
        }
        out
    }
}
