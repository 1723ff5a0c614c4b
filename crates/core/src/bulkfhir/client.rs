//! HTTP implementation of the bulk FHIR client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use crate::config::ServerConfig;

use super::error::BulkFhirError;
use super::types::{
    parse_fhir_instant, resource_types_to_query_value, to_fhir_instant, BulkDataClient,
    DataStream, JobStatus, ResourceType,
};

const ACCEPT_JSON: &str = "application/json";
const ACCEPT_FHIR_JSON: &str = "application/fhir+json";
const PREFER: &str = "Prefer";
const PREFER_ASYNC: &str = "respond-async";
const X_PROGRESS: &str = "X-Progress";
const CONTENT_LOCATION: &str = "Content-Location";

/// Matches strings like "(50%)" and captures the number.
static PROGRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([0-9]+)%\)").expect("progress pattern is valid"));

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    output: Vec<JobStatusOutput>,
    #[serde(rename = "transactionTime")]
    transaction_time: String,
}

#[derive(Debug, Deserialize)]
struct JobStatusOutput {
    #[serde(rename = "type")]
    resource_type: String,
    url: String,
}

/// Bulk FHIR API client.
///
/// The bearer token is kept behind a lock so the client can be shared with a
/// background job monitor.
pub struct BulkFhirClient {
    client: Client,
    config: ServerConfig,
    token: RwLock<Option<String>>,
}

impl BulkFhirClient {
    /// Create a new client for the configured server.
    pub fn new(config: ServerConfig) -> Result<Self, BulkFhirError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BulkFhirError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            config,
            token: RwLock::new(None),
        })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// Returns the stored token or fails without any network I/O.
    async fn bearer_token(&self) -> Result<String, BulkFhirError> {
        match self.token.read().await.as_deref() {
            Some(token) if !token.is_empty() => Ok(token.to_string()),
            _ => Err(BulkFhirError::Unauthorized),
        }
    }

    fn export_url(
        &self,
        types: &[ResourceType],
        since: Option<DateTime<Utc>>,
        group_id: &str,
    ) -> Result<Url, BulkFhirError> {
        let raw = format!("{}/Group/{}/$export", self.base_url(), group_id);
        let mut url =
            Url::parse(&raw).map_err(|e| BulkFhirError::InvalidUrl(format!("{}: {}", raw, e)))?;

        if since.is_some() || !types.is_empty() {
            let mut query = url.query_pairs_mut();
            if let Some(since) = since {
                query.append_pair("_since", &to_fhir_instant(&since));
            }
            if !types.is_empty() {
                query.append_pair("_type", &resource_types_to_query_value(types));
            }
        }

        Ok(url)
    }
}

/// Returns the single value of `name`, or a count mismatch.
fn single_header<'a>(
    headers: &'a HeaderMap,
    name: &'static str,
) -> Result<&'a HeaderValue, BulkFhirError> {
    let values: Vec<_> = headers.get_all(name).iter().collect();
    match values.as_slice() {
        [value] => Ok(*value),
        _ => Err(BulkFhirError::HeaderCountMismatch {
            header: name,
            count: values.len(),
        }),
    }
}

/// Extracts the percentage from an X-Progress value like "Retrieval is 50% complete (50%)".
pub(crate) fn parse_progress(value: &str) -> Result<u32, BulkFhirError> {
    let caps = PROGRESS_RE
        .captures(value)
        .ok_or_else(|| BulkFhirError::ProgressParseFailure(value.to_string()))?;
    caps[1]
        .parse::<u32>()
        .map_err(|e| BulkFhirError::ProgressParseFailure(format!("{}: {}", value, e)))
}

/// Builds a complete job status from the server's result manifest.
fn complete_status(body: JobStatusResponse) -> Result<JobStatus, BulkFhirError> {
    let mut status = JobStatus {
        is_complete: true,
        percent_complete: 100,
        ..Default::default()
    };

    for item in body.output {
        let resource_type = ResourceType::from_api_str(&item.resource_type)?;
        status
            .result_urls
            .entry(resource_type)
            .or_default()
            .push(item.url);
    }

    status.transaction_time = Some(parse_fhir_instant(&body.transaction_time)?);
    Ok(status)
}

#[async_trait]
impl BulkDataClient for BulkFhirClient {
    async fn authenticate(&self) -> Result<String, BulkFhirError> {
        let mut request = self
            .client
            .post(&self.config.auth_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(ACCEPT, ACCEPT_JSON);

        if !self.config.scopes.is_empty() {
            let scope = self.config.scopes.join(" ");
            request = request.form(&[
                ("scope", scope.as_str()),
                ("grant_type", "client_credentials"),
            ]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BulkFhirError::AuthFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BulkFhirError::AuthFailure(format!("HTTP {}", status)));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| BulkFhirError::AuthFailure(e.to_string()))?;

        if body.access_token.is_empty() {
            return Err(BulkFhirError::AuthFailure(
                "empty access_token in response".to_string(),
            ));
        }

        *self.token.write().await = Some(body.access_token.clone());
        info!("Authenticated with bulk FHIR server");
        Ok(body.access_token)
    }

    async fn start_export(
        &self,
        types: &[ResourceType],
        since: Option<DateTime<Utc>>,
        group_id: &str,
    ) -> Result<String, BulkFhirError> {
        let token = self.bearer_token().await?;
        let url = self.export_url(types, since, group_id)?;
        debug!(url = %url, "Starting bulk data export");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, ACCEPT_FHIR_JSON)
            .header(PREFER, PREFER_ASYNC)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(BulkFhirError::Unauthorized),
            StatusCode::OK | StatusCode::ACCEPTED => {
                let location = single_header(response.headers(), CONTENT_LOCATION)?;
                let location = location.to_str().map_err(|e| {
                    BulkFhirError::InvalidResponse(format!("{}: {}", CONTENT_LOCATION, e))
                })?;
                info!(job_status_url = %location, "Bulk data export started");
                Ok(location.to_string())
            }
            status => Err(BulkFhirError::UnexpectedStatus {
                status: status.as_u16(),
            }),
        }
    }

    async fn job_status(&self, job_status_url: &str) -> Result<JobStatus, BulkFhirError> {
        let token = self.bearer_token().await?;

        let response = self
            .client
            .get(job_status_url)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::ACCEPTED => {
                let value = single_header(response.headers(), X_PROGRESS)?;
                let value = value
                    .to_str()
                    .map_err(|e| BulkFhirError::ProgressParseFailure(e.to_string()))?;
                let percent = parse_progress(value)?;
                debug!(percent, "Export job pending");
                Ok(JobStatus::pending(percent))
            }
            StatusCode::OK => {
                let body: JobStatusResponse = response.json().await?;
                let status = complete_status(body)?;
                let files: usize = status.result_urls.values().map(Vec::len).sum();
                debug!(files, "Export job complete");
                Ok(status)
            }
            StatusCode::UNAUTHORIZED => Err(BulkFhirError::Unauthorized),
            status => Err(BulkFhirError::UnexpectedStatus {
                status: status.as_u16(),
            }),
        }
    }

    async fn get_data(&self, result_url: &str) -> Result<DataStream, BulkFhirError> {
        let token = self.bearer_token().await?;

        let response = self
            .client
            .get(result_url)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let stream = response.bytes_stream().map_err(std::io::Error::other);
                Ok(Box::new(StreamReader::new(Box::pin(stream))))
            }
            StatusCode::UNAUTHORIZED => Err(BulkFhirError::Unauthorized),
            // Some servers 404 result files that are not yet readable.
            StatusCode::NOT_FOUND => Err(BulkFhirError::RetryableStatus {
                status: StatusCode::NOT_FOUND.as_u16(),
            }),
            status => Err(BulkFhirError::UnexpectedStatus {
                status: status.as_u16(),
            }),
        }
    }
}
