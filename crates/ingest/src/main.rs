use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bulkfhir_core::processing::{ResourceTypeFilter, TracingSink};
use bulkfhir_core::{
    ingest_results, load_config, validate_config, BulkDataClient, BulkFhirClient, BulkFhirError,
    JobMonitor, JobStatus, MonitorEvent, Pipeline, SanitizedConfig,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("bulkfhir-ingest {}", VERSION);

    // Determine config path
    let config_path = std::env::var("BULKFHIR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = SanitizedConfig::from(&config);
    info!(
        "Configuration loaded: {}",
        serde_json::to_string(&sanitized).unwrap_or_default()
    );

    let client = Arc::new(
        BulkFhirClient::new(config.server.clone()).context("Failed to create bulk FHIR client")?,
    );
    client.authenticate().await.context("Authentication failed")?;
    info!("Authenticated against {}", config.server.auth_url);

    let status_url = client
        .start_export(
            &config.export.resource_types,
            config.export.since,
            &config.export.group_id,
        )
        .await
        .context("Failed to start export")?;
    info!(url = %status_url, "Export job started");

    let monitor = JobMonitor::new(client.clone(), config.monitor.clone());
    let mut events = monitor.spawn(status_url);

    let status = tokio::select! {
        status = wait_for_completion(&mut events) => status?,
        _ = shutdown_signal() => {
            warn!("Interrupted while waiting for the export job");
            return Ok(());
        }
    };

    if let Some(transaction_time) = status.transaction_time {
        info!("Export transaction time: {}", transaction_time.to_rfc3339());
    }

    let pipeline = Pipeline::new(
        vec![Box::new(ResourceTypeFilter::new(
            config.export.resource_types.iter().copied(),
        ))],
        vec![Box::new(TracingSink::new())],
    );

    let summary = ingest_results(client.as_ref(), &pipeline, &status, &config.ingest.retry)
        .await
        .context("Failed to ingest export results")?;
    pipeline
        .finalize()
        .await
        .context("Failed to finalize pipeline")?;

    info!(
        files = summary.files,
        records = summary.total_records(),
        "Ingest finished"
    );
    for (resource_type, count) in &summary.records {
        info!("  {}: {}", resource_type, count);
    }

    Ok(())
}

/// Drains monitor events until the job completes. Fails on timeout.
async fn wait_for_completion(
    events: &mut tokio::sync::mpsc::Receiver<MonitorEvent>,
) -> Result<JobStatus> {
    while let Some(event) = events.recv().await {
        match event {
            MonitorEvent::Status(status) if status.is_complete => {
                info!("Export job complete");
                return Ok(status);
            }
            MonitorEvent::Status(status) => {
                info!("Export job {}% complete", status.percent_complete);
            }
            MonitorEvent::Error(BulkFhirError::Timeout) => {
                bail!("Export job timed out");
            }
            MonitorEvent::Error(e) => {
                warn!("Error while polling export job: {}", e);
            }
        }
    }
    bail!("Job monitor stopped before the export completed")
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
