//! Transport seam for DMS remote calls
//!
//! [`DmsTransport`] issues exactly one remote procedure call per method and
//! returns the decoded reply record. It knows nothing about documents,
//! handle ownership or what a result code means; that belongs to the
//! session, locator and stream layers above it.

use crate::error::TransportError;
use crate::types::RetrievalCriteria;
use async_trait::async_trait;

/// One login record. The service requires these inside an array even when
/// there is only one.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginInfo {
    /// Network tag
    pub network: i32,
    /// Login context (library)
    pub login_context: String,
    /// Account name
    pub username: String,
    /// Account password
    pub password: String,
}

impl std::fmt::Debug for LoginInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginInfo")
            .field("network", &self.network)
            .field("login_context", &self.login_context)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Login call arguments
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginRequest {
    /// Login records
    pub login_info: Vec<LoginInfo>,
    /// Authentication mode flag
    pub auth_mode: i32,
    /// Token being renewed; empty for a fresh login
    pub incoming_token: String,
}

/// Login reply
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoginReply {
    /// Service result code
    pub result_code: i32,
    /// Session token, if one was issued
    pub outgoing_token: Option<String>,
}

/// Locate reply
///
/// Property names and values are kept exactly as they arrived; pairing them
/// (and rejecting a length mismatch) is the locator's job.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocateReply {
    /// Service result code
    pub result_code: i32,
    /// Content handle identifier, if one was issued
    pub content_id: Option<String>,
    /// Property names, wire order
    pub property_names: Vec<String>,
    /// Property values, wire order
    pub property_values: Vec<String>,
}

/// Open-stream reply
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OpenStreamReply {
    /// Service result code
    pub result_code: i32,
    /// Stream handle identifier, if one was issued
    pub stream_id: Option<String>,
}

/// Chunk read reply
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadReply {
    /// Service result code
    pub result_code: i32,
    /// Chunk bytes; `None` or empty marks the end of the stream
    pub data: Option<Vec<u8>>,
}

/// Release reply
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReleaseReply {
    /// Service result code
    pub result_code: i32,
}

/// Remote procedure calls exposed by the DMS
///
/// Implementations must enforce a request-level timeout so no call blocks
/// indefinitely.
#[async_trait]
pub trait DmsTransport: Send + Sync {
    /// Authenticate and obtain a session token
    async fn login(&self, request: &LoginRequest) -> Result<LoginReply, TransportError>;

    /// Resolve criteria to a content handle plus its property bag
    async fn locate(
        &self,
        token: &str,
        criteria: &RetrievalCriteria,
    ) -> Result<LocateReply, TransportError>;

    /// Open a read stream over a content handle
    async fn open_stream(
        &self,
        token: &str,
        content_id: &str,
    ) -> Result<OpenStreamReply, TransportError>;

    /// Read up to `requested_bytes` from a stream
    async fn read_chunk(
        &self,
        stream_id: &str,
        requested_bytes: usize,
    ) -> Result<ReadReply, TransportError>;

    /// Release a content or stream handle
    async fn release(&self, object_id: &str) -> Result<ReleaseReply, TransportError>;
}
