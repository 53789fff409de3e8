//! Database layer for edms-crawler
//!
//! The crawler reads document numbers that still lack a caption and writes
//! captions back. [`DocumentStore`] is the seam the batch driver works
//! against; [`Database`] is the SQLite implementation.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`documents`] - Pending-document queries and caption write-back

use crate::Result;
use crate::types::{CaptionUpdate, DocumentId, SkippedDocument};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

mod documents;
mod migrations;

/// Outcome of one caption commit
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Rows updated
    pub written: usize,
    /// Updates that failed individually and were left out of the commit
    pub failed: usize,
    /// Skipped documents whose attempt counter was bumped
    pub attempts_recorded: usize,
}

/// Source of work and sink for results
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Up to `limit` document identifiers that have no caption yet
    ///
    /// Documents with fewer recorded skips come first.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<DocumentId>>;

    /// Write all captions and record every skip in one transaction
    ///
    /// A single failed update is logged and counted, not fatal. Failing to
    /// commit the transaction is.
    async fn commit_batch(
        &self,
        updates: &[CaptionUpdate],
        skipped: &[SkippedDocument],
    ) -> Result<CommitSummary>;
}

/// Database handle for edms-crawler
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
