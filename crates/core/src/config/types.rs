use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bulkfhir::{ResourceType, ALL_RESOURCE_TYPES, EXPORT_GROUP_ALL};
use crate::ingest::RetryConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Bulk FHIR server connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// API base URL (e.g., "https://sandbox.bcda.cms.gov/api/v2")
    pub base_url: String,
    /// Full token endpoint URL
    pub auth_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Scopes sent with token requests (space joined)
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Per-request timeout in seconds (default: 60)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    60
}

/// What to export
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_resource_types")]
    pub resource_types: Vec<ResourceType>,
    /// Only export resources updated since this instant
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            group_id: default_group_id(),
            resource_types: default_resource_types(),
            since: None,
        }
    }
}

fn default_group_id() -> String {
    EXPORT_GROUP_ALL.to_string()
}

fn default_resource_types() -> Vec<ResourceType> {
    ALL_RESOURCE_TYPES.to_vec()
}

/// Job status polling
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Delay between status polls (milliseconds)
    #[serde(default = "default_check_period")]
    pub check_period_ms: u64,
    /// Give up if the job is not complete after this long (milliseconds)
    #[serde(default = "default_monitor_timeout")]
    pub timeout_ms: u64,
    /// Capacity of the monitor event channel
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl MonitorConfig {
    pub fn check_period(&self) -> Duration {
        Duration::from_millis(self.check_period_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_period_ms: default_check_period(),
            timeout_ms: default_monitor_timeout(),
            buffer_size: default_buffer_size(),
        }
    }
}

fn default_check_period() -> u64 {
    5_000 // 5 seconds
}

fn default_monitor_timeout() -> u64 {
    6 * 60 * 60 * 1000 // 6 hours
}

fn default_buffer_size() -> usize {
    100
}

/// Result file ingestion
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Sanitized config for logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: SanitizedServerConfig,
    pub export: ExportConfig,
    pub monitor: MonitorConfig,
    pub ingest: IngestConfig,
}

/// Server config with the client secret hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedServerConfig {
    pub base_url: String,
    pub auth_url: String,
    pub client_id: String,
    pub client_secret_configured: bool,
    pub scopes: Vec<String>,
    pub request_timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: SanitizedServerConfig {
                base_url: config.server.base_url.clone(),
                auth_url: config.server.auth_url.clone(),
                client_id: config.server.client_id.clone(),
                client_secret_configured: !config.server.client_secret.is_empty(),
                scopes: config.server.scopes.clone(),
                request_timeout_secs: config.server.request_timeout_secs,
            },
            export: config.export.clone(),
            monitor: config.monitor.clone(),
            ingest: config.ingest.clone(),
        }
    }
}
