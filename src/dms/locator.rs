//! Resolve a document identifier to a content handle

use super::RESULT_SUCCESS;
use super::stream::{HandleKind, release_best_effort};
use super::transport::DmsTransport;
use crate::config::DmsConfig;
use crate::error::LocateError;
use crate::types::{ContentHandle, DocumentId, PropertyBag, RetrievalCriteria, SessionCredential};
use std::sync::Arc;

/// A located document: its content handle and metadata
#[derive(Debug)]
pub struct LocatedDocument {
    /// Handle owned by the caller; must be released when the retrieval ends
    pub content: ContentHandle,
    /// Metadata returned with the handle
    pub properties: PropertyBag,
}

/// Outcome of a well-formed locate reply
#[derive(Debug)]
pub enum Located {
    /// A content handle was issued
    Found(LocatedDocument),
    /// No indexable version matched; an expected outcome, not an error
    NotFound {
        /// Result code of the reply
        result_code: i32,
    },
}

/// Issues criteria lookups against the DMS
pub struct DocumentLocator {
    transport: Arc<dyn DmsTransport>,
    library: String,
    version_selector: String,
}

impl DocumentLocator {
    /// Create a locator searching the configured library and version selector
    pub fn new(transport: Arc<dyn DmsTransport>, config: &DmsConfig) -> Self {
        Self {
            transport,
            library: config.library.clone(),
            version_selector: config.version_selector.clone(),
        }
    }

    /// Criteria for one document
    pub fn criteria_for(&self, doc_id: &DocumentId) -> RetrievalCriteria {
        RetrievalCriteria {
            library: self.library.clone(),
            document: doc_id.clone(),
            version: self.version_selector.clone(),
        }
    }

    /// Look up one document
    ///
    /// A reply with a non-success code or no content handle is
    /// [`Located::NotFound`]; a stray handle on such a reply is released.
    /// A property bag whose name and value sequences differ in length is
    /// logged and replaced by an empty bag, which only costs the filename.
    pub async fn locate(
        &self,
        credential: &SessionCredential,
        doc_id: &DocumentId,
    ) -> Result<Located, LocateError> {
        let criteria = self.criteria_for(doc_id);
        let reply = self
            .transport
            .locate(credential.token(), &criteria)
            .await?;

        let content_id = reply.content_id.filter(|id| !id.is_empty());
        let content_id = match content_id {
            Some(id) if reply.result_code == RESULT_SUCCESS => id,
            stray => {
                if let Some(id) = stray {
                    // Non-success reply that still issued a handle
                    release_best_effort(
                        self.transport.as_ref(),
                        doc_id,
                        HandleKind::Content,
                        &id,
                    )
                    .await;
                }
                return Ok(Located::NotFound {
                    result_code: reply.result_code,
                });
            }
        };

        let properties = PropertyBag::from_parallel(reply.property_names, reply.property_values)
            .unwrap_or_else(|e| {
                tracing::error!(
                    doc_id = %doc_id,
                    error = %e,
                    "DMS protocol violation in property bag, using default filename"
                );
                PropertyBag::default()
            });

        Ok(Located::Found(LocatedDocument {
            content: ContentHandle::new(content_id),
            properties,
        }))
    }
}
