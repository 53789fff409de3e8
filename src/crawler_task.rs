//! Periodic batch execution
//!
//! [`CrawlerTask`] runs [`BatchProcessor::process_batch`] on a fixed interval
//! until its cancellation token fires.
//!
//! # Example
//!
//! ```no_run
//! use edms_crawler::batch::BatchProcessor;
//! use edms_crawler::crawler_task::CrawlerTask;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(processor: Arc<BatchProcessor>) {
//! let cancel = CancellationToken::new();
//! let task = CrawlerTask::new(processor, Duration::from_secs(600));
//!
//! let handle = tokio::spawn(task.run(cancel.clone()));
//! edms_crawler::run_until_signal(cancel).await;
//! handle.await.ok();
//! # }
//! ```

use crate::batch::BatchProcessor;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Background task that runs one batch per interval
pub struct CrawlerTask {
    processor: Arc<BatchProcessor>,
    interval: Duration,
}

impl CrawlerTask {
    /// Creates a new crawler task
    pub fn new(processor: Arc<BatchProcessor>, interval: Duration) -> Self {
        Self {
            processor,
            interval,
        }
    }

    /// Run batches until `cancel` fires; returns the number of batches run
    ///
    /// The first batch starts immediately. Cancellation is checked between
    /// batches only: a batch in progress always finishes (and commits)
    /// before the task stops. A failed batch is logged and the next one runs
    /// on schedule.
    pub async fn run(self, cancel: CancellationToken) -> u64 {
        info!(interval_secs = self.interval.as_secs(), "Crawler task started");
        let mut batches = 0u64;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.processor.process_batch().await {
                Ok(report) => {
                    if report.fetched > 0 {
                        info!(
                            captioned = report.captioned,
                            skipped = report.skipped.len(),
                            "Batch finished"
                        );
                    }
                }
                Err(e) => {
                    error!(error = %e, "Batch failed, retrying next interval");
                }
            }
            batches += 1;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(batches, "Crawler task stopped");
        batches
    }
}
