use super::test_helpers::*;
use super::*;
use crate::config::DmsConfig;
use crate::error::{AuthError, LocateError, ReadError, ReadStage, TransportError};
use crate::types::{DocumentId, RetrievalOutcome, SessionCredential, SkipReason};
use std::sync::Arc;


fn test_config() -> DmsConfig {
    DmsConfig {
        service_url: "http://dms.test/svc".into(),
        object_url: "http://dms.test/obj".into(),
        username: "crawler".into(),
        password: "secret".into(),
        ..Default::default()
    }
}

fn credential() -> SessionCredential {
    SessionCredential::new("DST-1")
}

fn scripted() -> Arc<ScriptedTransport> {
    Arc::new(ScriptedTransport::new())
}
