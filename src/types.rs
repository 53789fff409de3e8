//! Core types for edms-crawler

use crate::error::{CaptionError, LocateError, PropertyBagError, ReadError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identifier of a document in the DMS (the "document number")
///
/// Identifiers are stored trimmed; the data source may hand out values with
/// stray whitespace or in numeric form.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a DocumentId, stripping surrounding whitespace
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    /// Borrow the identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Proof of an authenticated DMS session
///
/// Obtained once per run and shared read-only by every retrieval.
/// The token never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential(String);

impl SessionCredential {
    /// Wrap a session token returned by the service
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for placing on the wire
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionCredential(<redacted>)")
    }
}

/// Server-side reference to a located document's content
///
/// Not `Clone`: the retrieval that obtained it owns it and must release it.
#[derive(Debug, PartialEq, Eq)]
pub struct ContentHandle(String);

impl ContentHandle {
    /// Wrap a content identifier returned by a locate call
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Server-side cursor over a content handle's byte stream
#[derive(Debug, PartialEq, Eq)]
pub struct StreamHandle(String);

impl StreamHandle {
    /// Wrap a stream identifier returned by an open-stream call
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Query selecting exactly one document version
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrievalCriteria {
    /// Library to search
    pub library: String,
    /// Document number
    pub document: DocumentId,
    /// Version selector (e.g. "%VERSION_TO_INDEX")
    pub version: String,
}

impl RetrievalCriteria {
    /// Criterion name for the target library
    pub const TARGET_LIBRARY: &'static str = "%TARGET_LIBRARY";
    /// Criterion name for the document number
    pub const DOCUMENT_NUMBER: &'static str = "%DOCUMENT_NUMBER";
    /// Criterion name for the version selector
    pub const VERSION_ID: &'static str = "%VERSION_ID";

    /// Criteria as ordered (name, value) pairs, in wire order
    pub fn pairs(&self) -> [(&'static str, &str); 3] {
        [
            (Self::TARGET_LIBRARY, self.library.as_str()),
            (Self::DOCUMENT_NUMBER, self.document.as_str()),
            (Self::VERSION_ID, self.version.as_str()),
        ]
    }
}

/// Metadata returned alongside a located document
///
/// The wire carries names and values as two index-correlated sequences;
/// internally they are kept as pairs so a name can never lose its value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertyBag {
    entries: Vec<(String, String)>,
}

impl PropertyBag {
    /// Build a bag from (name, value) pairs
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    /// Zip the two wire sequences, rejecting a length mismatch
    pub fn from_parallel(
        names: Vec<String>,
        values: Vec<String>,
    ) -> Result<Self, PropertyBagError> {
        if names.len() != values.len() {
            return Err(PropertyBagError::LengthMismatch {
                names: names.len(),
                values: values.len(),
            });
        }
        Ok(Self {
            entries: names.into_iter().zip(values).collect(),
        })
    }

    /// Value of the first property with this name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bag is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over (name, value) pairs in wire order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// A fully assembled document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentPayload {
    /// Document bytes, in stream order
    pub bytes: Vec<u8>,
    /// Inferred filename (e.g. "12345.png")
    pub filename: String,
}

impl DocumentPayload {
    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload has no bytes
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex SHA-256 of the payload, for correlating logs with stored objects
    pub fn sha256_hex(&self) -> String {
        format!("{:x}", Sha256::digest(&self.bytes))
    }
}

/// Why a document was skipped by the retriever
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The DMS has no indexable version of this document
    NotFound {
        /// Result code of the locate reply
        result_code: i32,
    },
    /// The locate call failed
    LocateFailed(LocateError),
    /// Opening or reading the stream failed
    ReadFailed(ReadError),
    /// The protocol succeeded but yielded zero bytes
    EmptyPayload,
}

impl SkipReason {
    /// Failures that look like the remote side or the session went away
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, SkipReason::LocateFailed(_) | SkipReason::ReadFailed(_))
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotFound { result_code } => {
                write!(f, "not found in DMS (result code {result_code})")
            }
            SkipReason::LocateFailed(e) => write!(f, "locate failed: {e}"),
            SkipReason::ReadFailed(e) => write!(f, "stream failed: {e}"),
            SkipReason::EmptyPayload => write!(f, "document stream was empty"),
        }
    }
}

/// Result of retrieving one document
///
/// The retriever's whole contract: either a complete, named, non-empty
/// payload or an explained skip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetrievalOutcome {
    /// The document was materialized
    Retrieved(DocumentPayload),
    /// The document was skipped
    Skipped(SkipReason),
}

/// Caption returned by the captioning service
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caption {
    /// Short description of the image
    #[serde(default)]
    pub caption: Option<String>,
    /// Descriptive tags, in service order
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Caption {
    /// The caption text, if non-empty
    pub fn text(&self) -> Option<&str> {
        self.caption
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// A caption waiting to be written back to the data source
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptionUpdate {
    /// Document the caption belongs to
    pub doc_id: DocumentId,
    /// Caption text
    pub caption: String,
}

/// Stage at which the batch driver gave up on a document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipStage {
    /// DMS retrieval
    Retrieval,
    /// Captioning service
    Caption,
}

/// A document the batch driver could not process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedDocument {
    /// Document identifier
    pub doc_id: DocumentId,
    /// Where it failed
    pub stage: SkipStage,
    /// Human-readable reason
    pub reason: String,
}

impl SkippedDocument {
    pub(crate) fn retrieval(doc_id: DocumentId, reason: &SkipReason) -> Self {
        Self {
            doc_id,
            stage: SkipStage::Retrieval,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn caption(doc_id: DocumentId, error: &CaptionError) -> Self {
        Self {
            doc_id,
            stage: SkipStage::Caption,
            reason: error.to_string(),
        }
    }
}

/// Summary of one processed batch
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Identifiers fetched from the data source
    pub fetched: usize,
    /// Captions written and committed
    pub captioned: usize,
    /// Documents skipped, in processing order
    pub skipped: Vec<SkippedDocument>,
    /// Caption writes that failed inside the committed transaction
    pub write_failures: usize,
    /// Fresh logins performed mid-batch
    pub reauthentications: u32,
}
