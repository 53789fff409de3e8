//! Scripted in-memory DMS transport for tests.
//!
//! Replies are queued per operation and handed out in order. Locate, open and
//! read replies can also be keyed by document, content or stream id, so
//! overlapping retrievals each get their own script. Every call is recorded
//! and then yields once to the runtime, which lets concurrent retrievals
//! genuinely interleave.

use super::transport::{
    DmsTransport, LocateReply, LoginReply, LoginRequest, OpenStreamReply, ReadReply, ReleaseReply,
};
use crate::error::TransportError;
use crate::types::RetrievalCriteria;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// One recorded remote call
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Login { username: String },
    Locate { token: String, document: String },
    OpenStream { token: String, content_id: String },
    ReadChunk { stream_id: String, requested_bytes: usize },
    Release { object_id: String },
}

type Reply<T> = Result<T, TransportError>;

#[derive(Default)]
struct Script {
    login: VecDeque<Reply<LoginReply>>,
    default_login: Option<LoginReply>,
    locate: VecDeque<Reply<LocateReply>>,
    open: VecDeque<Reply<OpenStreamReply>>,
    read: VecDeque<Reply<ReadReply>>,
    release: VecDeque<Reply<ReleaseReply>>,
    locate_by_document: HashMap<String, VecDeque<Reply<LocateReply>>>,
    open_by_content: HashMap<String, VecDeque<Reply<OpenStreamReply>>>,
    read_by_stream: HashMap<String, VecDeque<Reply<ReadReply>>>,
}

/// Keyed reply first, then the shared queue
fn next_reply<T>(
    keyed: &mut HashMap<String, VecDeque<Reply<T>>>,
    key: &str,
    shared: &mut VecDeque<Reply<T>>,
) -> Option<Reply<T>> {
    keyed
        .get_mut(key)
        .and_then(VecDeque::pop_front)
        .or_else(|| shared.pop_front())
}

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
}

fn unscripted<T>(op: &str) -> Reply<T> {
    Err(TransportError::Malformed(format!("no scripted {op} reply")))
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answer every unscripted login with this token
    pub(crate) fn with_login_token(token: &str) -> Self {
        let transport = Self::new();
        transport.script.lock().unwrap().default_login = Some(LoginReply {
            result_code: 0,
            outgoing_token: Some(token.to_string()),
        });
        transport
    }

    pub(crate) fn push_login(&self, reply: Reply<LoginReply>) {
        self.script.lock().unwrap().login.push_back(reply);
    }

    pub(crate) fn push_locate(&self, reply: Reply<LocateReply>) {
        self.script.lock().unwrap().locate.push_back(reply);
    }

    pub(crate) fn push_locate_for(&self, document: &str, reply: Reply<LocateReply>) {
        self.script
            .lock()
            .unwrap()
            .locate_by_document
            .entry(document.to_string())
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn push_open(&self, reply: Reply<OpenStreamReply>) {
        self.script.lock().unwrap().open.push_back(reply);
    }

    pub(crate) fn push_read(&self, reply: Reply<ReadReply>) {
        self.script.lock().unwrap().read.push_back(reply);
    }

    pub(crate) fn push_release(&self, reply: Reply<ReleaseReply>) {
        self.script.lock().unwrap().release.push_back(reply);
    }

    /// Script a complete successful retrieval: locate, open, chunks, end of stream
    ///
    /// The locate reply goes on the shared queue; open and read replies are
    /// keyed by the content and stream id.
    pub(crate) fn push_document(
        &self,
        content_id: &str,
        stream_id: &str,
        chunks: &[Vec<u8>],
        properties: &[(&str, &str)],
    ) {
        self.push_locate(found(content_id, properties));
        self.push_handles(content_id, stream_id, chunks);
    }

    /// Like [`push_document`](Self::push_document) with the locate reply keyed by document id
    pub(crate) fn push_document_for(
        &self,
        document: &str,
        content_id: &str,
        stream_id: &str,
        chunks: &[Vec<u8>],
    ) {
        self.push_locate_for(document, found(content_id, &[]));
        self.push_handles(content_id, stream_id, chunks);
    }

    fn push_handles(&self, content_id: &str, stream_id: &str, chunks: &[Vec<u8>]) {
        let mut script = self.script.lock().unwrap();
        script
            .open_by_content
            .entry(content_id.to_string())
            .or_default()
            .push_back(opened(stream_id));
        let reads = script.read_by_stream.entry(stream_id.to_string()).or_default();
        for chunk in chunks {
            reads.push_back(chunk_reply(chunk.clone()));
        }
        reads.push_back(end_of_stream());
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Object ids passed to release, in call order
    pub(crate) fn releases(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Release { object_id } => Some(object_id),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }

    async fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
        tokio::task::yield_now().await;
    }
}

pub(crate) fn login_ok(token: &str) -> Reply<LoginReply> {
    Ok(LoginReply {
        result_code: 0,
        outgoing_token: Some(token.to_string()),
    })
}

pub(crate) fn found(content_id: &str, properties: &[(&str, &str)]) -> Reply<LocateReply> {
    Ok(LocateReply {
        result_code: 0,
        content_id: Some(content_id.to_string()),
        property_names: properties.iter().map(|(n, _)| n.to_string()).collect(),
        property_values: properties.iter().map(|(_, v)| v.to_string()).collect(),
    })
}

pub(crate) fn not_found(result_code: i32) -> Reply<LocateReply> {
    Ok(LocateReply {
        result_code,
        ..Default::default()
    })
}

pub(crate) fn opened(stream_id: &str) -> Reply<OpenStreamReply> {
    Ok(OpenStreamReply {
        result_code: 0,
        stream_id: Some(stream_id.to_string()),
    })
}

pub(crate) fn chunk_reply(bytes: Vec<u8>) -> Reply<ReadReply> {
    Ok(ReadReply {
        result_code: 0,
        data: Some(bytes),
    })
}

pub(crate) fn end_of_stream() -> Reply<ReadReply> {
    Ok(ReadReply {
        result_code: 0,
        data: None,
    })
}

pub(crate) fn release_rejected(result_code: i32) -> Reply<ReleaseReply> {
    Ok(ReleaseReply { result_code })
}

/// Deterministic filler bytes so reordering or duplication is detectable
pub(crate) fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

/// In-memory log sink for asserting on structured fields
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Route this thread's events here until the guard drops
    pub(crate) fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl DmsTransport for ScriptedTransport {
    async fn login(&self, request: &LoginRequest) -> Reply<LoginReply> {
        self.record(Call::Login {
            username: request
                .login_info
                .first()
                .map(|i| i.username.clone())
                .unwrap_or_default(),
        })
        .await;
        let mut script = self.script.lock().unwrap();
        match script.login.pop_front() {
            Some(reply) => reply,
            None => match &script.default_login {
                Some(reply) => Ok(reply.clone()),
                None => unscripted("login"),
            },
        }
    }

    async fn locate(&self, token: &str, criteria: &RetrievalCriteria) -> Reply<LocateReply> {
        self.record(Call::Locate {
            token: token.to_string(),
            document: criteria.document.to_string(),
        })
        .await;
        let mut script = self.script.lock().unwrap();
        let script = &mut *script;
        next_reply(
            &mut script.locate_by_document,
            criteria.document.as_str(),
            &mut script.locate,
        )
        .unwrap_or_else(|| unscripted("locate"))
    }

    async fn open_stream(&self, token: &str, content_id: &str) -> Reply<OpenStreamReply> {
        self.record(Call::OpenStream {
            token: token.to_string(),
            content_id: content_id.to_string(),
        })
        .await;
        let mut script = self.script.lock().unwrap();
        let script = &mut *script;
        next_reply(&mut script.open_by_content, content_id, &mut script.open)
            .unwrap_or_else(|| unscripted("open"))
    }

    async fn read_chunk(&self, stream_id: &str, requested_bytes: usize) -> Reply<ReadReply> {
        self.record(Call::ReadChunk {
            stream_id: stream_id.to_string(),
            requested_bytes,
        })
        .await;
        let mut script = self.script.lock().unwrap();
        let script = &mut *script;
        next_reply(&mut script.read_by_stream, stream_id, &mut script.read)
            .unwrap_or_else(|| unscripted("read"))
    }

    async fn release(&self, object_id: &str) -> Reply<ReleaseReply> {
        self.record(Call::Release {
            object_id: object_id.to_string(),
        })
        .await;
        let reply = self.script.lock().unwrap().release.pop_front();
        reply.unwrap_or(Ok(ReleaseReply { result_code: 0 }))
    }
}
