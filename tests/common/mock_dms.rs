//! A wiremock-backed DMS speaking just enough SOAP for one retrieval at a time

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use edms_crawler::config::DmsConfig;
use std::collections::VecDeque;
use std::sync::Mutex;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const NS: &str = "http://tempuri.org/";

/// Wrap a result body in the envelope the service sends back
pub fn soap_reply(op: &str, result_body: &str) -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><{op}Response xmlns="{NS}"><{op}Result xmlns:a="http://schemas.datacontract.org/2004/07/OpenText.DMSvr.Serializable" xmlns:i="http://www.w3.org/2001/XMLSchema-instance">{result_body}</{op}Result></{op}Response></s:Body></s:Envelope>"#
    )
}

fn ok(op: &str, result_body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("Content-Type", "text/xml; charset=utf-8")
        .set_body_string(soap_reply(op, result_body))
}

fn action(contract: &str, op: &str) -> String {
    format!("\"{NS}{contract}/{op}\"")
}

/// Hands out queued stream chunks in order; `None` marks an end of stream
struct ChunkResponder {
    replies: Mutex<VecDeque<Option<Vec<u8>>>>,
}

impl Respond for ChunkResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        match self.replies.lock().unwrap().pop_front().flatten() {
            Some(chunk) => ok(
                "ReadStream",
                &format!(
                    "<a:resultCode>0</a:resultCode><a:streamData><a:streamBuffer>{}</a:streamBuffer></a:streamData>",
                    STANDARD.encode(chunk)
                ),
            ),
            None => ok("ReadStream", "<a:resultCode>0</a:resultCode>"),
        }
    }
}

/// Mock DMS with the service port at `/svc` and the object port at `/obj`
pub struct MockDms {
    pub server: MockServer,
}

impl MockDms {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn config(&self) -> DmsConfig {
        DmsConfig {
            service_url: format!("{}/svc", self.server.uri()),
            object_url: format!("{}/obj", self.server.uri()),
            username: "crawler".into(),
            password: "secret".into(),
            ..Default::default()
        }
    }

    pub async fn mount_login(&self, token: &str) {
        Mock::given(method("POST"))
            .and(path("/svc"))
            .and(header("SOAPAction", action("IDMSvc", "LoginSvr5").as_str()))
            .respond_with(ok(
                "LoginSvr5",
                &format!("<a:DSTOut>{token}</a:DSTOut><a:resultCode>0</a:resultCode>"),
            ))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_login_rejected(&self, result_code: i32) {
        Mock::given(method("POST"))
            .and(path("/svc"))
            .and(header("SOAPAction", action("IDMSvc", "LoginSvr5").as_str()))
            .respond_with(ok(
                "LoginSvr5",
                &format!(
                    r#"<a:DSTOut i:nil="true"/><a:resultCode>{result_code}</a:resultCode>"#
                ),
            ))
            .mount(&self.server)
            .await;
    }

    /// Answer one locate call; later calls fall through to other mounts
    pub async fn mount_locate_once(&self, content_id: &str, properties: &[(&str, &str)]) {
        let names: String = properties
            .iter()
            .map(|(n, _)| format!("<b:string>{n}</b:string>"))
            .collect();
        let values: String = properties
            .iter()
            .map(|(_, v)| format!("<b:anyType>{v}</b:anyType>"))
            .collect();
        let body = format!(
            r#"<a:docProperties><a:propertyNames xmlns:b="http://schemas.microsoft.com/2003/10/Serialization/Arrays">{names}</a:propertyNames><a:propertyValues xmlns:b="http://schemas.microsoft.com/2003/10/Serialization/Arrays">{values}</a:propertyValues></a:docProperties><a:getDocID>{content_id}</a:getDocID><a:resultCode>0</a:resultCode>"#
        );
        Mock::given(method("POST"))
            .and(path("/svc"))
            .and(header("SOAPAction", action("IDMSvc", "GetDocSvr3").as_str()))
            .respond_with(ok("GetDocSvr3", &body))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_locate_not_found_once(&self, result_code: i32) {
        Mock::given(method("POST"))
            .and(path("/svc"))
            .and(header("SOAPAction", action("IDMSvc", "GetDocSvr3").as_str()))
            .respond_with(ok(
                "GetDocSvr3",
                &format!(
                    r#"<a:getDocID i:nil="true"/><a:resultCode>{result_code}</a:resultCode>"#
                ),
            ))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_open_once(&self, stream_id: &str) {
        Mock::given(method("POST"))
            .and(path("/obj"))
            .and(header("SOAPAction", action("IDMObj", "GetReadStream").as_str()))
            .respond_with(ok(
                "GetReadStream",
                &format!("<a:resultCode>0</a:resultCode><a:streamID>{stream_id}</a:streamID>"),
            ))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    /// Serve each stream's chunks in order, each followed by end-of-stream
    pub async fn mount_reads(&self, streams: Vec<Vec<Vec<u8>>>) {
        let replies = streams
            .into_iter()
            .flat_map(|chunks| chunks.into_iter().map(Some).chain(std::iter::once(None)))
            .collect();
        Mock::given(method("POST"))
            .and(path("/obj"))
            .and(header("SOAPAction", action("IDMObj", "ReadStream").as_str()))
            .respond_with(ChunkResponder {
                replies: Mutex::new(replies),
            })
            .mount(&self.server)
            .await;
    }

    pub async fn mount_release(&self) {
        Mock::given(method("POST"))
            .and(path("/obj"))
            .and(header("SOAPAction", action("IDMObj", "ReleaseObject").as_str()))
            .respond_with(ok("ReleaseObject", "<a:resultCode>0</a:resultCode>"))
            .mount(&self.server)
            .await;
    }

    /// Operation names of every request received, in order
    pub async fn operations(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|r| r.headers.get("SOAPAction"))
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.trim_matches('"').rsplit('/').next().map(str::to_string))
            .collect()
    }

    /// Object ids passed to ReleaseObject, in order
    pub async fn released_ids(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|r| String::from_utf8_lossy(&r.body).to_string())
            .filter(|body| body.contains("<ReleaseObject"))
            .filter_map(|body| element_text(&body, "a:objectID"))
            .collect()
    }
}

/// Text of the first `<tag>...</tag>` in `xml`
pub fn element_text(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&format!("</{tag}>"))? + start;
    Some(xml[start..end].to_string())
}

/// Deterministic filler bytes
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
