//! Pending-document queries and caption write-back.

use crate::error::DatabaseError;
use crate::types::{CaptionUpdate, DocumentId, SkippedDocument};
use crate::{Error, Result};
use async_trait::async_trait;

use super::{CommitSummary, Database, DocumentStore};

impl Database {
    /// Register a document number with no caption
    ///
    /// Existing rows are left untouched.
    pub async fn insert_document(&self, doc_id: &DocumentId) -> Result<()> {
        sqlx::query("INSERT INTO profile (docnumber) VALUES (?) ON CONFLICT(docnumber) DO NOTHING")
            .bind(doc_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert document: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Get the stored caption for a document
    ///
    /// Returns None if the document is unknown or not captioned yet.
    pub async fn get_caption(&self, doc_id: &DocumentId) -> Result<Option<String>> {
        let caption: Option<Option<String>> =
            sqlx::query_scalar("SELECT abstract FROM profile WHERE docnumber = ?")
                .bind(doc_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to get caption: {}",
                        e
                    )))
                })?;

        Ok(caption.flatten())
    }

    /// Document numbers without a caption
    ///
    /// Ordered by failed attempts, then document number, so documents that
    /// keep getting skipped fall behind ones never tried.
    pub async fn pending_documents(&self, limit: usize) -> Result<Vec<DocumentId>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT docnumber FROM profile WHERE abstract IS NULL ORDER BY attempts, docnumber LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to fetch pending documents: {}",
                e
            )))
        })?;

        Ok(rows
            .into_iter()
            .map(DocumentId::new)
            .filter(|id| !id.as_str().is_empty())
            .collect())
    }

    /// Number of skipped attempts recorded for a document
    pub async fn attempts(&self, doc_id: &DocumentId) -> Result<Option<i64>> {
        sqlx::query_scalar("SELECT attempts FROM profile WHERE docnumber = ?")
            .bind(doc_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get attempts: {}",
                    e
                )))
            })
    }

    /// Apply caption updates and skip records inside a single transaction
    pub async fn write_batch(
        &self,
        updates: &[CaptionUpdate],
        skipped: &[SkippedDocument],
    ) -> Result<CommitSummary> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let now = chrono::Utc::now().timestamp();
        let mut summary = CommitSummary::default();
        for update in updates {
            let result = sqlx::query(
                "UPDATE profile SET abstract = ?, captioned_at = ? WHERE docnumber = ?",
            )
            .bind(&update.caption)
            .bind(now)
            .bind(update.doc_id.as_str())
            .execute(&mut *tx)
            .await;

            match result {
                Ok(done) if done.rows_affected() > 0 => summary.written += 1,
                Ok(_) => {
                    tracing::warn!(doc_id = %update.doc_id, "caption update matched no document");
                    summary.failed += 1;
                }
                Err(e) => {
                    tracing::error!(doc_id = %update.doc_id, error = %e, "caption update failed");
                    summary.failed += 1;
                }
            }
        }

        for skip in skipped {
            let result = sqlx::query(
                "UPDATE profile SET attempts = attempts + 1, last_attempt_at = ?, last_skip_reason = ? WHERE docnumber = ?",
            )
            .bind(now)
            .bind(&skip.reason)
            .bind(skip.doc_id.as_str())
            .execute(&mut *tx)
            .await;

            match result {
                Ok(done) if done.rows_affected() > 0 => summary.attempts_recorded += 1,
                Ok(_) => {
                    tracing::warn!(doc_id = %skip.doc_id, "skip record matched no document");
                }
                Err(e) => {
                    tracing::error!(doc_id = %skip.doc_id, error = %e, "skip record failed");
                }
            }
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit batch: {}",
                e
            )))
        })?;

        Ok(summary)
    }
}

#[async_trait]
impl DocumentStore for Database {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<DocumentId>> {
        self.pending_documents(limit).await
    }

    async fn commit_batch(
        &self,
        updates: &[CaptionUpdate],
        skipped: &[SkippedDocument],
    ) -> Result<CommitSummary> {
        self.write_batch(updates, skipped).await
    }
}
