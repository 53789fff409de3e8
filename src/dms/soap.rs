//! HTTP implementation of [`DmsTransport`]

use super::envelope::{self, Operation, Port};
use super::transport::{
    DmsTransport, LocateReply, LoginReply, LoginRequest, OpenStreamReply, ReadReply, ReleaseReply,
};
use crate::config::DmsConfig;
use crate::error::{Error, Result, TransportError};
use crate::types::RetrievalCriteria;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use url::Url;

/// SOAP-over-HTTP client for the DMS service and object ports
///
/// Every request carries the configured timeout; a timed-out call surfaces
/// as [`TransportError::Timeout`].
#[derive(Debug, Clone)]
pub struct SoapTransport {
    client: reqwest::Client,
    service_url: Url,
    object_url: Url,
    namespace: String,
}

impl SoapTransport {
    /// Create a transport from DMS settings
    ///
    /// # Errors
    /// Returns a configuration error if either endpoint URL is invalid or the
    /// HTTP client cannot be created.
    pub fn new(config: &DmsConfig) -> Result<Self> {
        let service_url = Url::parse(&config.service_url).map_err(|e| {
            Error::config("dms.service_url", format!("invalid service URL: {e}"))
        })?;
        let object_url = Url::parse(&config.object_url)
            .map_err(|e| Error::config("dms.object_url", format!("invalid object URL: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("edms-crawler/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            service_url,
            object_url,
            namespace: config.soap_namespace.clone(),
        })
    }

    async fn call(
        &self,
        operation: Operation,
        body: String,
    ) -> std::result::Result<envelope::Node, TransportError> {
        let url = match operation.port() {
            Port::Service => &self.service_url,
            Port::Object => &self.object_url,
        };

        tracing::trace!(operation = operation.name(), url = %url, "sending DMS request");

        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", operation.soap_action(&self.namespace))
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        envelope::decode_reply(status, &text, operation)
    }
}

#[async_trait]
impl DmsTransport for SoapTransport {
    async fn login(
        &self,
        request: &LoginRequest,
    ) -> std::result::Result<LoginReply, TransportError> {
        let body = envelope::encode_login(&self.namespace, request);
        let result = self.call(Operation::Login, body).await?;
        envelope::decode_login(&result)
    }

    async fn locate(
        &self,
        token: &str,
        criteria: &RetrievalCriteria,
    ) -> std::result::Result<LocateReply, TransportError> {
        let body = envelope::encode_locate(&self.namespace, token, criteria);
        let result = self.call(Operation::Locate, body).await?;
        envelope::decode_locate(&result)
    }

    async fn open_stream(
        &self,
        token: &str,
        content_id: &str,
    ) -> std::result::Result<OpenStreamReply, TransportError> {
        let body = envelope::encode_open_stream(&self.namespace, token, content_id);
        let result = self.call(Operation::OpenStream, body).await?;
        envelope::decode_open_stream(&result)
    }

    async fn read_chunk(
        &self,
        stream_id: &str,
        requested_bytes: usize,
    ) -> std::result::Result<ReadReply, TransportError> {
        let body = envelope::encode_read_chunk(&self.namespace, stream_id, requested_bytes);
        let result = self.call(Operation::ReadChunk, body).await?;
        envelope::decode_read_chunk(&result)
    }

    async fn release(&self, object_id: &str) -> std::result::Result<ReleaseReply, TransportError> {
        let body = envelope::encode_release(&self.namespace, object_id);
        let result = self.call(Operation::Release, body).await?;
        envelope::decode_release(&result)
    }
}
