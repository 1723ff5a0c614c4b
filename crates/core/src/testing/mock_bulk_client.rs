//! Mock bulk FHIR client for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::RwLock;

use crate::bulkfhir::{BulkDataClient, BulkFhirError, DataStream, JobStatus, ResourceType};

/// A recorded `start_export` call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedExport {
    pub types: Vec<ResourceType>,
    pub since: Option<DateTime<Utc>>,
    pub group_id: String,
}

#[derive(Debug, Default)]
struct CallCounts {
    authenticate: usize,
    start_export: usize,
    job_status: usize,
    get_data: usize,
}

/// Mock implementation of the BulkDataClient trait.
///
/// Provides controllable behavior for testing:
/// - Scripted job status responses, consumed in order
/// - Scripted result file bodies per URL
/// - Injected authentication failures
/// - Call counters and recorded export requests
///
/// # Example
///
/// ```rust,ignore
/// use bulkfhir_core::testing::MockBulkDataClient;
///
/// let client = MockBulkDataClient::new();
/// client.push_status(Ok(JobStatus::pending(50))).await;
/// client.push_status(Ok(MockBulkDataClient::complete_status())).await;
///
/// let status = client.job_status("status-url").await?;
/// assert!(!status.is_complete);
/// ```
#[derive(Debug, Clone)]
pub struct MockBulkDataClient {
    /// Job status responses, popped one per call.
    statuses: Arc<RwLock<VecDeque<Result<JobStatus, BulkFhirError>>>>,
    /// Returned once the scripted statuses run out.
    default_status: Arc<RwLock<JobStatus>>,
    /// Result file bodies per URL. The last entry is sticky.
    data: Arc<RwLock<HashMap<String, VecDeque<Result<Vec<u8>, BulkFhirError>>>>>,
    /// If set, every authenticate call fails with this error.
    auth_error: Arc<RwLock<Option<BulkFhirError>>>,
    /// Result of start_export.
    export_result: Arc<RwLock<Result<String, BulkFhirError>>>,
    exports: Arc<RwLock<Vec<RecordedExport>>>,
    calls: Arc<RwLock<CallCounts>>,
}

impl Default for MockBulkDataClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBulkDataClient {
    /// URL returned by `start_export` unless overridden.
    pub const JOB_STATUS_URL: &'static str = "mock://jobs/1";

    /// Create a new mock client.
    pub fn new() -> Self {
        Self {
            statuses: Arc::new(RwLock::new(VecDeque::new())),
            default_status: Arc::new(RwLock::new(JobStatus::pending(0))),
            data: Arc::new(RwLock::new(HashMap::new())),
            auth_error: Arc::new(RwLock::new(None)),
            export_result: Arc::new(RwLock::new(Ok(Self::JOB_STATUS_URL.to_string()))),
            exports: Arc::new(RwLock::new(Vec::new())),
            calls: Arc::new(RwLock::new(CallCounts::default())),
        }
    }

    /// A complete status with one Patient file and one Coverage file.
    pub fn complete_status() -> JobStatus {
        let mut status = JobStatus {
            is_complete: true,
            percent_complete: 100,
            transaction_time: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).single(),
            ..Default::default()
        };
        status
            .result_urls
            .insert(ResourceType::Patient, vec!["mock://data/patient-1".to_string()]);
        status
            .result_urls
            .insert(ResourceType::Coverage, vec!["mock://data/coverage-1".to_string()]);
        status
    }

    /// Queue a job status response.
    pub async fn push_status(&self, status: Result<JobStatus, BulkFhirError>) {
        self.statuses.write().await.push_back(status);
    }

    /// Set the status returned once the queue is empty.
    pub async fn set_default_status(&self, status: JobStatus) {
        *self.default_status.write().await = status;
    }

    /// Queue a response for `get_data(url)`.
    pub async fn push_data(&self, url: &str, body: Result<Vec<u8>, BulkFhirError>) {
        self.data
            .write()
            .await
            .entry(url.to_string())
            .or_default()
            .push_back(body);
    }

    /// Make authenticate fail (or succeed again with `None`).
    pub async fn set_auth_error(&self, error: Option<BulkFhirError>) {
        *self.auth_error.write().await = error;
    }

    /// Set the result of `start_export`.
    pub async fn set_export_result(&self, result: Result<String, BulkFhirError>) {
        *self.export_result.write().await = result;
    }

    /// Get all recorded export requests.
    pub async fn recorded_exports(&self) -> Vec<RecordedExport> {
        self.exports.read().await.clone()
    }

    pub async fn authenticate_calls(&self) -> usize {
        self.calls.read().await.authenticate
    }

    pub async fn start_export_calls(&self) -> usize {
        self.calls.read().await.start_export
    }

    pub async fn job_status_calls(&self) -> usize {
        self.calls.read().await.job_status
    }

    pub async fn get_data_calls(&self) -> usize {
        self.calls.read().await.get_data
    }
}

#[async_trait]
impl BulkDataClient for MockBulkDataClient {
    async fn authenticate(&self) -> Result<String, BulkFhirError> {
        self.calls.write().await.authenticate += 1;
        match self.auth_error.read().await.clone() {
            Some(err) => Err(err),
            None => Ok("mock-token".to_string()),
        }
    }

    async fn start_export(
        &self,
        types: &[ResourceType],
        since: Option<DateTime<Utc>>,
        group_id: &str,
    ) -> Result<String, BulkFhirError> {
        self.calls.write().await.start_export += 1;
        self.exports.write().await.push(RecordedExport {
            types: types.to_vec(),
            since,
            group_id: group_id.to_string(),
        });
        self.export_result.read().await.clone()
    }

    async fn job_status(&self, _job_status_url: &str) -> Result<JobStatus, BulkFhirError> {
        self.calls.write().await.job_status += 1;
        match self.statuses.write().await.pop_front() {
            Some(status) => status,
            None => Ok(self.default_status.read().await.clone()),
        }
    }

    async fn get_data(&self, result_url: &str) -> Result<DataStream, BulkFhirError> {
        self.calls.write().await.get_data += 1;

        let body = {
            let mut data = self.data.write().await;
            match data.get_mut(result_url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match body {
            Some(Ok(bytes)) => Ok(Box::new(std::io::Cursor::new(bytes))),
            Some(Err(err)) => Err(err),
            None => Err(BulkFhirError::RetryableStatus { status: 404 }),
        }
    }
}
