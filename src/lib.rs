//! # edms-crawler
//!
//! Retrieves scanned documents from a document management system (DMS) over
//! its SOAP retrieval protocol, sends each image to a captioning service and
//! stores the caption back in the document database.
//!
//! ## Layout
//!
//! - [`dms`] - the retrieval protocol client: login, locate, chunked stream
//!   reads, handle release and filename inference
//! - [`captioner`] - the captioning service client
//! - [`db`] - pending documents and caption write-back
//! - [`batch`] - one crawl batch: retrieve, caption, commit
//! - [`crawler_task`] - runs batches on an interval until cancelled
//!
//! ## Quick Start
//!
//! ```no_run
//! use edms_crawler::dms::{Retriever, SessionManager, SoapTransport};
//! use edms_crawler::types::{DocumentId, RetrievalOutcome};
//! use edms_crawler::Config;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let transport = Arc::new(SoapTransport::new(&config.dms)?);
//!
//!     let session = SessionManager::new(transport.clone(), &config.dms);
//!     let credential = session
//!         .login(&config.dms.username, &config.dms.password)
//!         .await?;
//!
//!     let retriever = Retriever::new(transport, &config.dms);
//!     match retriever.retrieve(&credential, &DocumentId::new("ABC123")).await {
//!         RetrievalOutcome::Retrieved(payload) => {
//!             println!("{}: {} bytes", payload.filename, payload.len());
//!         }
//!         RetrievalOutcome::Skipped(reason) => println!("skipped: {reason}"),
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Batch driver
pub mod batch;
/// Captioning service client
pub mod captioner;
/// Configuration types
pub mod config;
/// Crawler task execution
pub mod crawler_task;
/// Database persistence layer
pub mod db;
/// DMS retrieval protocol client
pub mod dms;
/// Error types
pub mod error;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types
pub mod types;

// Re-export commonly used types
pub use batch::BatchProcessor;
pub use captioner::{Captioner, HttpCaptioner};
pub use config::Config;
pub use crawler_task::CrawlerTask;
pub use db::{Database, DocumentStore};
pub use dms::{DmsTransport, Retriever, SessionManager, SoapTransport};
pub use error::{
    AuthError, CaptionError, DatabaseError, Error, LocateError, ReadError, Result, TransportError,
};
pub use types::{BatchReport, DocumentId, DocumentPayload, RetrievalOutcome, SkipReason};

use tokio_util::sync::CancellationToken;

/// Wait for a termination signal, then cancel `cancel`
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Returns early without waiting if the token is cancelled by someone else.
pub async fn run_until_signal(cancel: CancellationToken) {
    tokio::select! {
        _ = wait_for_signal() => {
            tracing::info!("Shutdown requested, finishing current batch");
            cancel.cancel();
        }
        _ = cancel.cancelled() => {}
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
