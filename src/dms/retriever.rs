//! One-call document retrieval: locate, materialize, name

use super::locator::{DocumentLocator, Located};
use super::metadata::infer_filename;
use super::stream::StreamReader;
use super::transport::DmsTransport;
use crate::config::DmsConfig;
use crate::types::{DocumentId, DocumentPayload, RetrievalOutcome, SessionCredential, SkipReason};
use std::sync::Arc;

/// Composes [`DocumentLocator`], [`StreamReader`] and filename inference
///
/// The contract toward the batch driver is binary: a complete, named,
/// non-empty payload or an explained skip. Nothing below this layer
/// escapes as an error.
pub struct Retriever {
    locator: DocumentLocator,
    reader: StreamReader,
}

impl Retriever {
    /// Create a retriever sharing one transport between its layers
    pub fn new(transport: Arc<dyn DmsTransport>, config: &DmsConfig) -> Self {
        Self {
            locator: DocumentLocator::new(Arc::clone(&transport), config),
            reader: StreamReader::new(transport, config),
        }
    }

    /// Retrieve one document by identifier
    pub async fn retrieve(
        &self,
        credential: &SessionCredential,
        doc_id: &DocumentId,
    ) -> RetrievalOutcome {
        let located = match self.locator.locate(credential, doc_id).await {
            Ok(Located::Found(located)) => located,
            Ok(Located::NotFound { result_code }) => {
                tracing::warn!(doc_id = %doc_id, result_code, "document not found in DMS");
                return RetrievalOutcome::Skipped(SkipReason::NotFound { result_code });
            }
            Err(e) => {
                tracing::error!(doc_id = %doc_id, stage = "locate", error = %e, "DMS locate failed");
                return RetrievalOutcome::Skipped(SkipReason::LocateFailed(e));
            }
        };

        let filename = infer_filename(doc_id, &located.properties);
        tracing::debug!(
            doc_id = %doc_id,
            content = located.content.as_str(),
            properties = located.properties.len(),
            "document located"
        );

        let bytes = match self
            .reader
            .materialize(credential, doc_id, located.content)
            .await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(doc_id = %doc_id, stage = "stream", error = %e, "DMS stream read failed");
                return RetrievalOutcome::Skipped(SkipReason::ReadFailed(e));
            }
        };

        if bytes.is_empty() {
            tracing::warn!(doc_id = %doc_id, "DMS stream produced no bytes");
            return RetrievalOutcome::Skipped(SkipReason::EmptyPayload);
        }

        let payload = DocumentPayload { bytes, filename };
        tracing::info!(
            doc_id = %doc_id,
            filename = %payload.filename,
            bytes = payload.len(),
            sha256 = %payload.sha256_hex(),
            "document retrieved"
        );
        RetrievalOutcome::Retrieved(payload)
    }
}
