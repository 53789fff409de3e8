//! Batch driver
//!
//! One batch is: log in once, take up to `batch_size` documents that still
//! need a caption, retrieve and caption each, then write every caption back
//! in a single commit. A document that cannot be retrieved or captioned is
//! skipped and reported, and the same commit bumps its attempt counter so it
//! queues behind documents not yet tried. Only login, the pending-document
//! query and the final commit can fail the batch as a whole.

use crate::captioner::Captioner;
use crate::config::Config;
use crate::db::DocumentStore;
use crate::dms::{DmsTransport, Retriever, SessionManager};
use crate::error::{CaptionError, Result};
use crate::types::{
    BatchReport, CaptionUpdate, DocumentId, DocumentPayload, RetrievalOutcome, SessionCredential,
    SkippedDocument,
};
use futures::future::join_all;
use std::sync::Arc;

/// Runs one crawl batch end to end
pub struct BatchProcessor {
    session: SessionManager,
    retriever: Retriever,
    captioner: Arc<dyn Captioner>,
    store: Arc<dyn DocumentStore>,
    username: String,
    password: String,
    batch_size: usize,
    max_concurrent: usize,
    reauth_after_failures: Option<u32>,
}

impl BatchProcessor {
    /// Wire a processor from configuration and its three collaborators
    pub fn new(
        config: &Config,
        transport: Arc<dyn DmsTransport>,
        captioner: Arc<dyn Captioner>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            session: SessionManager::new(Arc::clone(&transport), &config.dms),
            retriever: Retriever::new(transport, &config.dms),
            captioner,
            store,
            username: config.dms.username.clone(),
            password: config.dms.password.clone(),
            batch_size: config.batch.batch_size,
            max_concurrent: config.batch.max_concurrent_retrievals.max(1),
            reauth_after_failures: config.batch.reauth_after_failures.filter(|n| *n > 0),
        }
    }

    /// Process one batch
    ///
    /// Retrievals run in groups of `max_concurrent_retrievals`; results are
    /// handled in input order. Captioning runs after each group.
    ///
    /// # Errors
    /// - [`Error::Auth`] if the initial login (or a configured re-login) fails.
    ///   Captions gathered before a failed re-login are still committed.
    /// - [`Error::Database`] if pending documents cannot be fetched or the
    ///   commit fails.
    pub async fn process_batch(&self) -> Result<BatchReport> {
        let mut credential = self.login().await?;

        let pending = self.store.fetch_pending(self.batch_size).await?;
        let mut report = BatchReport {
            fetched: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            tracing::info!("no documents waiting for a caption");
            return Ok(report);
        }
        tracing::info!(documents = pending.len(), "starting batch");

        let mut updates = Vec::new();
        let mut consecutive_failures = 0u32;
        let mut relogin_error = None;

        for group in pending.chunks(self.max_concurrent) {
            let outcomes = join_all(
                group
                    .iter()
                    .map(|doc_id| self.retriever.retrieve(&credential, doc_id)),
            )
            .await;

            for (doc_id, outcome) in group.iter().zip(outcomes) {
                match outcome {
                    RetrievalOutcome::Retrieved(payload) => {
                        consecutive_failures = 0;
                        match self.caption(doc_id, &payload).await {
                            Ok(update) => updates.push(update),
                            Err(e) => report
                                .skipped
                                .push(SkippedDocument::caption(doc_id.clone(), &e)),
                        }
                    }
                    RetrievalOutcome::Skipped(reason) => {
                        if reason.is_transport_failure() {
                            consecutive_failures += 1;
                        } else {
                            consecutive_failures = 0;
                        }
                        report
                            .skipped
                            .push(SkippedDocument::retrieval(doc_id.clone(), &reason));
                    }
                }
            }

            if let Some(threshold) = self.reauth_after_failures
                && consecutive_failures >= threshold
            {
                tracing::warn!(
                    consecutive_failures,
                    "repeated DMS transport failures, logging in again"
                );
                match self.login().await {
                    Ok(fresh) => {
                        credential = fresh;
                        report.reauthentications += 1;
                        consecutive_failures = 0;
                    }
                    Err(e) => {
                        relogin_error = Some(e);
                        break;
                    }
                }
            }
        }

        if !updates.is_empty() || !report.skipped.is_empty() {
            let summary = match self.store.commit_batch(&updates, &report.skipped).await {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        captions = updates.len(),
                        skipped = report.skipped.len(),
                        "batch commit failed"
                    );
                    return Err(e);
                }
            };
            report.captioned = summary.written;
            report.write_failures = summary.failed;
        }

        tracing::info!(
            fetched = report.fetched,
            captioned = report.captioned,
            skipped = report.skipped.len(),
            write_failures = report.write_failures,
            reauthentications = report.reauthentications,
            "batch complete"
        );

        match relogin_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    async fn login(&self) -> Result<SessionCredential> {
        Ok(self.session.login(&self.username, &self.password).await?)
    }

    async fn caption(
        &self,
        doc_id: &DocumentId,
        payload: &DocumentPayload,
    ) -> std::result::Result<CaptionUpdate, CaptionError> {
        let described = self
            .captioner
            .describe(&payload.bytes, &payload.filename)
            .await
            .map_err(|e| {
                tracing::warn!(doc_id = %doc_id, stage = "caption", error = %e, "captioning failed");
                e
            })?;

        let caption = described.text().ok_or(CaptionError::MissingCaption)?;
        tracing::info!(doc_id = %doc_id, tags = ?described.tags, "document captioned");
        Ok(CaptionUpdate {
            doc_id: doc_id.clone(),
            caption: caption.to_string(),
        })
    }
}

impl std::fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("username", &self.username)
            .field("batch_size", &self.batch_size)
            .field("max_concurrent", &self.max_concurrent)
            .field("reauth_after_failures", &self.reauth_after_failures)
            .finish_non_exhaustive()
    }
}
