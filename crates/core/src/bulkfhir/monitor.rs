//! Background job status monitor.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;

use super::error::BulkFhirError;
use super::types::{BulkDataClient, MonitorEvent};

/// Polls an export job until it completes or the deadline passes.
///
/// Each poll outcome is sent to the returned channel. The stream always ends
/// with either a complete [`MonitorEvent::Status`] or a
/// [`BulkFhirError::Timeout`] error, after which the channel is closed.
/// Unauthorized responses are handled by re-authenticating and polling again
/// immediately; they are not reported unless re-authentication itself fails.
pub struct JobMonitor {
    client: Arc<dyn BulkDataClient>,
    config: MonitorConfig,
}

impl JobMonitor {
    pub fn new(client: Arc<dyn BulkDataClient>, config: MonitorConfig) -> Self {
        Self { client, config }
    }

    /// Spawns the polling task and returns the receiving end of its event stream.
    ///
    /// Dropping the receiver stops the task at its next emission.
    pub fn spawn(&self, job_status_url: impl Into<String>) -> mpsc::Receiver<MonitorEvent> {
        let (tx, rx) = mpsc::channel(self.config.buffer_size.max(1));
        let client = Arc::clone(&self.client);
        let job_status_url = job_status_url.into();
        let check_period = self.config.check_period();
        let deadline = Instant::now() + self.config.timeout();

        tokio::spawn(async move {
            let mut complete = false;

            while !complete && Instant::now() < deadline {
                match client.job_status(&job_status_url).await {
                    Err(BulkFhirError::Unauthorized) => {
                        warn!("Job status poll unauthorized, re-authenticating");
                        if let Err(e) = client.authenticate().await {
                            if tx.send(MonitorEvent::Error(e)).await.is_err() {
                                return;
                            }
                        }
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "Job status poll failed");
                        if tx.send(MonitorEvent::Error(e)).await.is_err() {
                            return;
                        }
                    }
                    Ok(status) => {
                        complete = status.is_complete;
                        debug!(
                            complete,
                            percent = status.percent_complete,
                            "Job status polled"
                        );
                        if tx.send(MonitorEvent::Status(status)).await.is_err() {
                            return;
                        }
                    }
                }

                if !complete {
                    sleep(check_period).await;
                }
            }

            if complete {
                info!(url = %job_status_url, "Export job complete");
            } else {
                warn!(url = %job_status_url, "Export job did not complete before the deadline");
                let _ = tx.send(MonitorEvent::Error(BulkFhirError::Timeout)).await;
            }
            // tx drops here, closing the stream.
        });

        rx
    }
}
