//! Error types for edms-crawler
//!
//! The retrieval protocol has a layered failure model:
//! - [`TransportError`] - one remote call failed (timeout, HTTP status, SOAP fault, bad body)
//! - [`AuthError`] - login failed; fatal for a whole run
//! - [`LocateError`] / [`ReadError`] - per-document failures, converted to skips by the retriever
//! - [`CaptionError`] - the captioning collaborator failed for one document
//! - [`DatabaseError`] - the document store failed
//!
//! "Document not found" is deliberately not an error; see
//! [`Located::NotFound`](crate::dms::Located::NotFound).

use thiserror::Error;

/// Result type alias for edms-crawler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for edms-crawler
///
/// Only conditions that are fatal for a batch (or for process startup) reach
/// this type. Per-document failures are reported as skips instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "DMS_SERVICE_URL")
        key: Option<String>,
    },

    /// DMS authentication failed
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// A DMS remote call failed outside of a per-document context
    #[error("DMS transport error: {0}")]
    Transport(#[from] TransportError),

    /// Captioning service error
    #[error("captioning error: {0}")]
    Caption(#[from] CaptionError),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Failure of a single DMS remote procedure call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete within the configured timeout
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure (DNS, refused, reset, TLS)
    #[error("network error: {0}")]
    Network(String),

    /// The endpoint answered with a non-success HTTP status and no SOAP fault
    #[error("HTTP status {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// The service answered with a SOAP fault
    #[error("SOAP fault {code}: {message}")]
    Fault {
        /// Fault code (e.g. "s:Client")
        code: String,
        /// Fault string
        message: String,
    },

    /// The response could not be parsed or lacked a required field
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

/// Login failure. The caller treats every variant as fatal for the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The service returned a non-success result code
    #[error("login rejected with result code {result_code}")]
    Rejected {
        /// Result code returned by the service
        result_code: i32,
    },

    /// The service reported success but returned no session token
    #[error("login succeeded but no session token was returned")]
    EmptyToken,

    /// The login call itself failed
    #[error("login call failed: {0}")]
    Transport(#[from] TransportError),
}

/// Locate failure for one document (not-found is not an error)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocateError {
    /// The locate call failed at the transport level
    #[error("locate call failed: {0}")]
    Transport(#[from] TransportError),
}

/// Protocol stage at which a stream read failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStage {
    /// Opening the stream handle
    Open,
    /// Reading a chunk
    Read,
}

impl std::fmt::Display for ReadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadStage::Open => write!(f, "open"),
            ReadStage::Read => write!(f, "read"),
        }
    }
}

/// Materialization failure for one document
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadError {
    /// The open-stream call returned a non-success result code
    #[error("open stream rejected with result code {result_code}")]
    OpenRejected {
        /// Result code returned by the service
        result_code: i32,
    },

    /// The open-stream call succeeded but carried no stream handle
    #[error("open stream returned no stream handle")]
    MissingStreamHandle,

    /// A chunk read returned a non-success result code
    #[error("chunk read rejected with result code {result_code} after {chunks_read} chunks")]
    ReadRejected {
        /// Result code returned by the service
        result_code: i32,
        /// Number of chunks successfully read before the failure
        chunks_read: usize,
    },

    /// The stream exceeded the configured document size limit
    #[error("document exceeds size limit of {limit} bytes")]
    TooLarge {
        /// Configured limit in bytes
        limit: usize,
    },

    /// A stream call failed at the transport level
    #[error("{stage} call failed: {source}")]
    Transport {
        /// Stage at which the call failed
        stage: ReadStage,
        /// Underlying transport error
        source: TransportError,
    },
}

/// Property-bag decoding failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PropertyBagError {
    /// Name and value sequences differ in length
    #[error("property bag has {names} names but {values} values")]
    LengthMismatch {
        /// Number of names on the wire
        names: usize,
        /// Number of values on the wire
        values: usize,
    },
}

/// Captioning service failure for one document
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptionError {
    /// Nothing to send
    #[error("image payload is empty")]
    EmptyPayload,

    /// The service returned a non-200 status
    #[error("captioning service returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// The response body was not the expected JSON shape
    #[error("malformed captioning response: {0}")]
    Malformed(String),

    /// The response carried no caption text
    #[error("captioning response contained no caption")]
    MissingCaption,

    /// The request timed out
    #[error("captioning request timed out")]
    Timeout,

    /// Connection-level failure
    #[error("could not reach captioning service: {0}")]
    Network(String),
}

impl From<reqwest::Error> for CaptionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CaptionError::Timeout
        } else if e.is_decode() {
            CaptionError::Malformed(e.to_string())
        } else {
            CaptionError::Network(e.to_string())
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Truncate a response body for inclusion in an error message
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX_BODY_CHARS: usize = 512;
    if body.chars().count() <= MAX_BODY_CHARS {
        body.to_string()
    } else {
        let mut truncated: String = body.chars().take(MAX_BODY_CHARS).collect();
        truncated.push_str("...");
        truncated
    }
}
