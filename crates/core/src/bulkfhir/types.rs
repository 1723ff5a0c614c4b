//! Types for bulk FHIR export operations.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncBufRead;

use super::error::BulkFhirError;

/// Group ID that most servers use for "all patients". Consult the server's
/// documentation, some use a different ID.
pub const EXPORT_GROUP_ALL: &str = "all";

/// A FHIR resource type that can be exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    Patient,
    Coverage,
    ExplanationOfBenefit,
    /// Describes data the server could not export due to errors.
    OperationOutcome,
}

/// The resource types requested when the caller does not narrow the export.
/// OperationOutcome is only ever produced by the server.
pub const ALL_RESOURCE_TYPES: [ResourceType; 3] = [
    ResourceType::Patient,
    ResourceType::Coverage,
    ResourceType::ExplanationOfBenefit,
];

impl ResourceType {
    /// Returns the wire name used by the bulk FHIR API.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            ResourceType::Patient => "Patient",
            ResourceType::Coverage => "Coverage",
            ResourceType::ExplanationOfBenefit => "ExplanationOfBenefit",
            ResourceType::OperationOutcome => "OperationOutcome",
        }
    }

    /// Parses a wire name into a resource type.
    pub fn from_api_str(name: &str) -> Result<Self, BulkFhirError> {
        match name {
            "Patient" => Ok(ResourceType::Patient),
            "Coverage" => Ok(ResourceType::Coverage),
            "ExplanationOfBenefit" => Ok(ResourceType::ExplanationOfBenefit),
            "OperationOutcome" => Ok(ResourceType::OperationOutcome),
            other => Err(BulkFhirError::UnknownResourceType(other.to_string())),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

impl FromStr for ResourceType {
    type Err = BulkFhirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_api_str(s)
    }
}

/// Joins resource types into the comma separated `_type` query value,
/// e.g. `[ExplanationOfBenefit, Patient]` becomes `"ExplanationOfBenefit,Patient"`.
pub fn resource_types_to_query_value(types: &[ResourceType]) -> String {
    types
        .iter()
        .map(ResourceType::as_api_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Formats a timestamp as a FHIR instant (millisecond precision, UTC).
pub fn to_fhir_instant(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses a FHIR instant. FHIR's instant grammar is a subset of RFC 3339.
pub fn parse_fhir_instant(s: &str) -> Result<DateTime<Utc>, BulkFhirError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BulkFhirError::InvalidInstant(format!("{}: {}", s, e)))
}

/// Snapshot of an export job, recreated on every poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStatus {
    pub is_complete: bool,
    pub percent_complete: u32,
    /// Result file URLs per resource type, in server order. Only populated
    /// once the job is complete.
    pub result_urls: BTreeMap<ResourceType, Vec<String>>,
    /// Server time at which the export was computed. Only set once complete.
    pub transaction_time: Option<DateTime<Utc>>,
}

impl JobStatus {
    /// A pending status with the given progress.
    pub fn pending(percent_complete: u32) -> Self {
        Self {
            is_complete: false,
            percent_complete,
            ..Default::default()
        }
    }
}

/// One item emitted by the job monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Status(JobStatus),
    Error(BulkFhirError),
}

impl MonitorEvent {
    /// Returns true for the event that ends the stream successfully.
    pub fn is_complete(&self) -> bool {
        matches!(self, MonitorEvent::Status(s) if s.is_complete)
    }

    /// Returns true for the monitor's timeout event.
    pub fn is_timeout(&self) -> bool {
        matches!(self, MonitorEvent::Error(BulkFhirError::Timeout))
    }
}

/// Streaming body of a result file. Dropping it closes the connection.
pub type DataStream = Box<dyn AsyncBufRead + Send + Unpin>;

/// A client for a bulk FHIR export API.
///
/// `authenticate` must succeed before any other call; until then every other
/// method returns [`BulkFhirError::Unauthorized`] without touching the network.
#[async_trait]
pub trait BulkDataClient: Send + Sync {
    /// Fetches a bearer token, stores it for later calls and returns it.
    async fn authenticate(&self) -> Result<String, BulkFhirError>;

    /// Starts an export job and returns the job status URL.
    async fn start_export(
        &self,
        types: &[ResourceType],
        since: Option<DateTime<Utc>>,
        group_id: &str,
    ) -> Result<String, BulkFhirError>;

    /// Fetches the current status of an export job.
    async fn job_status(&self, job_status_url: &str) -> Result<JobStatus, BulkFhirError>;

    /// Opens a result file for streaming.
    async fn get_data(&self, result_url: &str) -> Result<DataStream, BulkFhirError>;
}
