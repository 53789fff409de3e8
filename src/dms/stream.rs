//! Chunked stream reads with guaranteed handle release
//!
//! A retrieval owns up to two server-side handles: the content handle from the
//! locate call and the stream handle opened over it. [`HandleScope`] holds both
//! and releases them stream-first on every exit path:
//! - normal completion (success or error) awaits [`HandleScope::close`]
//! - if the retrieval future is dropped mid-flight or panics, `Drop` hands the
//!   same release sequence to the runtime

use super::RESULT_SUCCESS;
use super::transport::DmsTransport;
use crate::config::DmsConfig;
use crate::error::{ReadError, ReadStage};
use crate::types::{ContentHandle, DocumentId, SessionCredential, StreamHandle};
use std::sync::Arc;

/// Which kind of handle is being released, for logs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HandleKind {
    Content,
    Stream,
}

impl std::fmt::Display for HandleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleKind::Content => write!(f, "content"),
            HandleKind::Stream => write!(f, "stream"),
        }
    }
}

/// Release one handle; failures are logged and swallowed
pub(crate) async fn release_best_effort(
    transport: &dyn DmsTransport,
    doc_id: &DocumentId,
    kind: HandleKind,
    id: &str,
) {
    match transport.release(id).await {
        Ok(reply) if reply.result_code == RESULT_SUCCESS => {
            tracing::debug!(doc_id = %doc_id, handle = id, kind = %kind, "released DMS handle");
        }
        Ok(reply) => {
            tracing::warn!(
                doc_id = %doc_id,
                handle = id,
                kind = %kind,
                result_code = reply.result_code,
                "DMS handle release rejected"
            );
        }
        Err(e) => {
            tracing::warn!(
                doc_id = %doc_id,
                handle = id,
                kind = %kind,
                error = %e,
                "DMS handle release failed"
            );
        }
    }
}

async fn release_in_order(
    transport: &dyn DmsTransport,
    doc_id: &DocumentId,
    stream: Option<StreamHandle>,
    content: Option<ContentHandle>,
) {
    if let Some(stream) = stream {
        release_best_effort(transport, doc_id, HandleKind::Stream, stream.as_str()).await;
    }
    if let Some(content) = content {
        release_best_effort(transport, doc_id, HandleKind::Content, content.as_str()).await;
    }
}

/// Scoped ownership of one retrieval's content and stream handles
pub(crate) struct HandleScope {
    transport: Arc<dyn DmsTransport>,
    doc_id: DocumentId,
    content: Option<ContentHandle>,
    stream: Option<StreamHandle>,
}

impl HandleScope {
    pub(crate) fn new(
        transport: Arc<dyn DmsTransport>,
        doc_id: DocumentId,
        content: ContentHandle,
    ) -> Self {
        Self {
            transport,
            doc_id,
            content: Some(content),
            stream: None,
        }
    }

    pub(crate) fn content_id(&self) -> &str {
        self.content.as_ref().map(ContentHandle::as_str).unwrap_or_default()
    }

    pub(crate) fn attach_stream(&mut self, stream: StreamHandle) {
        self.stream = Some(stream);
    }

    /// Release stream then content handle
    ///
    /// Each handle stays in the scope until its own release has finished, so
    /// a drop part-way through leaves `Drop` with everything still owed.
    pub(crate) async fn close(mut self) {
        if let Some(stream) = &self.stream {
            release_best_effort(
                self.transport.as_ref(),
                &self.doc_id,
                HandleKind::Stream,
                stream.as_str(),
            )
            .await;
        }
        self.stream = None;

        if let Some(content) = &self.content {
            release_best_effort(
                self.transport.as_ref(),
                &self.doc_id,
                HandleKind::Content,
                content.as_str(),
            )
            .await;
        }
        self.content = None;
    }
}

impl Drop for HandleScope {
    fn drop(&mut self) {
        if self.stream.is_none() && self.content.is_none() {
            return;
        }
        let stream = self.stream.take();
        let content = self.content.take();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::warn!(
                    doc_id = %self.doc_id,
                    "retrieval interrupted, releasing DMS handles in background"
                );
                let transport = Arc::clone(&self.transport);
                let doc_id = self.doc_id.clone();
                runtime.spawn(async move {
                    release_in_order(transport.as_ref(), &doc_id, stream, content).await;
                });
            }
            Err(_) => {
                tracing::error!(
                    doc_id = %self.doc_id,
                    stream = stream.as_ref().map(StreamHandle::as_str),
                    content = content.as_ref().map(ContentHandle::as_str),
                    "no runtime available to release DMS handles"
                );
            }
        }
    }
}

/// Opens a stream over a content handle and reads it to the end
pub struct StreamReader {
    transport: Arc<dyn DmsTransport>,
    chunk_size: usize,
    max_document_bytes: usize,
}

impl StreamReader {
    /// Create a reader using the configured chunk size and size limit
    pub fn new(transport: Arc<dyn DmsTransport>, config: &DmsConfig) -> Self {
        Self {
            transport,
            chunk_size: config.chunk_size,
            max_document_bytes: config.max_document_bytes,
        }
    }

    /// Read the full content behind `content` and release it
    ///
    /// `doc_id` is carried into every log line, including release failures.
    /// Takes ownership of the content handle: it is always released before
    /// this returns, after the stream handle if one was opened. Release
    /// failures never change the returned result.
    ///
    /// A stream that ends immediately yields `Ok` with an empty buffer; it is
    /// up to the caller to decide that an empty document is unusable.
    pub async fn materialize(
        &self,
        credential: &SessionCredential,
        doc_id: &DocumentId,
        content: ContentHandle,
    ) -> Result<Vec<u8>, ReadError> {
        let mut scope = HandleScope::new(Arc::clone(&self.transport), doc_id.clone(), content);
        let result = self.open_and_read(credential, &mut scope).await;
        scope.close().await;
        result
    }

    async fn open_and_read(
        &self,
        credential: &SessionCredential,
        scope: &mut HandleScope,
    ) -> Result<Vec<u8>, ReadError> {
        let opened = self
            .transport
            .open_stream(credential.token(), scope.content_id())
            .await
            .map_err(|source| ReadError::Transport {
                stage: ReadStage::Open,
                source,
            })?;

        // Keep any issued handle so it is released even when the reply is unusable
        let stream_id = opened.stream_id.filter(|id| !id.is_empty());
        if let Some(id) = &stream_id {
            scope.attach_stream(StreamHandle::new(id.clone()));
        }
        if opened.result_code != RESULT_SUCCESS {
            return Err(ReadError::OpenRejected {
                result_code: opened.result_code,
            });
        }
        let stream_id = stream_id.ok_or(ReadError::MissingStreamHandle)?;

        let mut buffer = Vec::new();
        let mut chunks_read = 0usize;
        loop {
            let reply = self
                .transport
                .read_chunk(&stream_id, self.chunk_size)
                .await
                .map_err(|source| ReadError::Transport {
                    stage: ReadStage::Read,
                    source,
                })?;

            if reply.result_code != RESULT_SUCCESS {
                return Err(ReadError::ReadRejected {
                    result_code: reply.result_code,
                    chunks_read,
                });
            }

            let chunk = match reply.data {
                Some(chunk) if !chunk.is_empty() => chunk,
                _ => break,
            };

            if buffer.len() + chunk.len() > self.max_document_bytes {
                return Err(ReadError::TooLarge {
                    limit: self.max_document_bytes,
                });
            }
            buffer.extend_from_slice(&chunk);
            chunks_read += 1;
        }

        tracing::debug!(
            doc_id = %scope.doc_id,
            stream = %stream_id,
            chunks = chunks_read,
            bytes = buffer.len(),
            "stream read complete"
        );
        Ok(buffer)
    }
}
