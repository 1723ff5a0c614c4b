//! Result file ingestion loop.

use std::collections::BTreeMap;

use tokio::io::AsyncBufReadExt;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::bulkfhir::{BulkDataClient, BulkFhirError, DataStream, JobStatus, ResourceType};
use crate::processing::Pipeline;

use super::config::RetryConfig;
use super::error::IngestError;

/// What an ingest run read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Result files fetched.
    pub files: usize,
    /// Records passed to the pipeline, per resource type.
    pub records: BTreeMap<ResourceType, u64>,
}

impl IngestSummary {
    pub fn total_records(&self) -> u64 {
        self.records.values().sum()
    }
}

/// Feeds every record of a complete job through `pipeline`.
///
/// Files are read in resource type order, and in server order within a type.
/// Blank lines are skipped. The pipeline is not finalized.
pub async fn ingest_results(
    client: &dyn BulkDataClient,
    pipeline: &Pipeline,
    status: &JobStatus,
    retry: &RetryConfig,
) -> Result<IngestSummary, IngestError> {
    let mut summary = IngestSummary::default();

    for (resource_type, urls) in &status.result_urls {
        for url in urls {
            let stream = fetch_with_retry(client, url, retry).await?;
            let records = process_file(pipeline, *resource_type, url, stream).await?;

            info!(resource_type = %resource_type, url = %url, records, "Ingested result file");
            summary.files += 1;
            *summary.records.entry(*resource_type).or_default() += records;
        }
    }

    Ok(summary)
}

/// Opens a result file, retrying retryable statuses and re-authenticating
/// once per unauthorized response.
async fn fetch_with_retry(
    client: &dyn BulkDataClient,
    url: &str,
    retry: &RetryConfig,
) -> Result<DataStream, BulkFhirError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match client.get_data(url).await {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt >= retry.max_attempts => return Err(e),
            Err(BulkFhirError::Unauthorized) => {
                warn!(url = %url, "Result fetch unauthorized, re-authenticating");
                client.authenticate().await?;
            }
            Err(e) if e.is_retryable() => {
                let delay = retry.delay_for_retry(attempt);
                warn!(url = %url, attempt, error = %e, "Retrying result fetch in {:?}", delay);
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn process_file(
    pipeline: &Pipeline,
    resource_type: ResourceType,
    url: &str,
    stream: DataStream,
) -> Result<u64, IngestError> {
    let mut lines = stream.lines();
    let mut records = 0;

    while let Some(line) = lines.next_line().await.map_err(|source| IngestError::Read {
        url: url.to_string(),
        source,
    })? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        pipeline
            .process(resource_type, url, line.as_bytes().to_vec())
            .await?;
        records += 1;
    }

    debug!(url = %url, records, "Finished reading result file");
    Ok(records)
}
