//! SOAP 1.1 envelope encoding and reply decoding
//!
//! Requests are rendered as WCF-style envelopes: one operation element in the
//! service namespace, wrapping a single `call` element whose fields live in the
//! DMS data-contract namespace. Replies are decoded by local element name only,
//! so whatever prefixes the server picks do not matter.

use super::transport::{
    LocateReply, LoginReply, LoginRequest, OpenStreamReply, ReadReply, ReleaseReply,
};
use crate::error::{TransportError, truncate_body};
use crate::types::RetrievalCriteria;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use std::fmt::Write as _;

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const CONTRACT_NS: &str = "http://schemas.datacontract.org/2004/07/OpenText.DMSvr.Serializable";
const ARRAYS_NS: &str = "http://schemas.microsoft.com/2003/10/Serialization/Arrays";
const INSTANCE_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Operation names and the port (contract) each is served on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Operation {
    Login,
    Locate,
    OpenStream,
    ReadChunk,
    Release,
}

/// The two service ports
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Port {
    Service,
    Object,
}

impl Operation {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Operation::Login => "LoginSvr5",
            Operation::Locate => "GetDocSvr3",
            Operation::OpenStream => "GetReadStream",
            Operation::ReadChunk => "ReadStream",
            Operation::Release => "ReleaseObject",
        }
    }

    pub(crate) fn port(self) -> Port {
        match self {
            Operation::Login | Operation::Locate => Port::Service,
            Operation::OpenStream | Operation::ReadChunk | Operation::Release => Port::Object,
        }
    }

    /// SOAPAction header value, quoted as SOAP 1.1 requires
    pub(crate) fn soap_action(self, namespace: &str) -> String {
        let contract = match self.port() {
            Port::Service => "IDMSvc",
            Port::Object => "IDMObj",
        };
        format!("\"{namespace}{contract}/{}\"", self.name())
    }
}

fn envelope(namespace: &str, operation: Operation, call_body: &str) -> String {
    let op = operation.name();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="{SOAP_ENV_NS}"><s:Body><{op} xmlns="{ns}"><call xmlns:a="{CONTRACT_NS}" xmlns:b="{ARRAYS_NS}" xmlns:i="{INSTANCE_NS}">{call_body}</call></{op}></s:Body></s:Envelope>"#,
        ns = escape(namespace),
    )
}

fn push_field(out: &mut String, name: &str, value: &str) {
    let _ = write!(out, "<a:{name}>{}</a:{name}>", escape(value));
}

fn push_string_array<'a>(out: &mut String, name: &str, values: impl Iterator<Item = &'a str>) {
    let _ = write!(out, "<a:{name}>");
    for value in values {
        let _ = write!(out, "<b:string>{}</b:string>", escape(value));
    }
    let _ = write!(out, "</a:{name}>");
}

pub(crate) fn encode_login(namespace: &str, request: &LoginRequest) -> String {
    let mut body = String::new();
    push_field(&mut body, "authen", &request.auth_mode.to_string());
    push_field(&mut body, "dstIn", &request.incoming_token);
    body.push_str("<a:loginInfo>");
    for info in &request.login_info {
        body.push_str("<a:DMSvrLoginInfo>");
        push_field(&mut body, "loginContext", &info.login_context);
        push_field(&mut body, "network", &info.network.to_string());
        push_field(&mut body, "password", &info.password);
        push_field(&mut body, "username", &info.username);
        body.push_str("</a:DMSvrLoginInfo>");
    }
    body.push_str("</a:loginInfo>");
    envelope(namespace, Operation::Login, &body)
}

/// Criteria go out as two index-correlated arrays built from the same pairs
pub(crate) fn encode_locate(namespace: &str, token: &str, criteria: &RetrievalCriteria) -> String {
    let pairs = criteria.pairs();
    let mut body = String::new();
    body.push_str("<a:criteria>");
    push_field(&mut body, "criteriaCount", &pairs.len().to_string());
    push_string_array(&mut body, "criteriaNames", pairs.iter().map(|(n, _)| *n));
    push_string_array(&mut body, "criteriaValues", pairs.iter().map(|(_, v)| *v));
    body.push_str("</a:criteria>");
    push_field(&mut body, "dstIn", token);
    envelope(namespace, Operation::Locate, &body)
}

pub(crate) fn encode_open_stream(namespace: &str, token: &str, content_id: &str) -> String {
    let mut body = String::new();
    push_field(&mut body, "contentID", content_id);
    push_field(&mut body, "dstIn", token);
    envelope(namespace, Operation::OpenStream, &body)
}

pub(crate) fn encode_read_chunk(namespace: &str, stream_id: &str, requested_bytes: usize) -> String {
    let mut body = String::new();
    push_field(&mut body, "requestedBytes", &requested_bytes.to_string());
    push_field(&mut body, "streamID", stream_id);
    envelope(namespace, Operation::ReadChunk, &body)
}

pub(crate) fn encode_release(namespace: &str, object_id: &str) -> String {
    let mut body = String::new();
    push_field(&mut body, "objectID", object_id);
    envelope(namespace, Operation::Release, &body)
}

/// Minimal element tree of a reply document
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) text: String,
    pub(crate) nil: bool,
    pub(crate) children: Vec<Node>,
}

impl Node {
    fn from_start(start: &BytesStart<'_>) -> Self {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let nil = start.attributes().flatten().any(|attr| {
            attr.key.local_name().as_ref() == b"nil" && attr.value.as_ref() == b"true"
        });
        Node {
            name,
            nil,
            ..Default::default()
        }
    }

    pub(crate) fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Depth-first search for the first descendant with this local name
    pub(crate) fn find(&self, name: &str) -> Option<&Node> {
        self.children
            .iter()
            .find_map(|c| if c.name == name { Some(c) } else { c.find(name) })
    }

    fn text_of(&self, name: &str) -> Option<&str> {
        self.child(name)
            .filter(|c| !c.nil)
            .map(|c| c.text.as_str())
    }

    /// Text of every child element, nil elements mapped to ""
    fn item_texts(&self) -> Vec<String> {
        self.children
            .iter()
            .map(|c| if c.nil { String::new() } else { c.text.clone() })
            .collect()
    }
}

pub(crate) fn parse_tree(xml: &str) -> Result<Node, TransportError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack = vec![Node {
        name: "#document".into(),
        ..Default::default()
    }];

    loop {
        let event = reader
            .read_event()
            .map_err(|e| TransportError::Malformed(format!("invalid XML: {e}")))?;
        match event {
            Event::Start(start) => stack.push(Node::from_start(&start)),
            Event::Empty(start) => current(&mut stack)?.children.push(Node::from_start(&start)),
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| TransportError::Malformed("unbalanced element".into()))?;
                current(&mut stack)?.children.push(node);
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| TransportError::Malformed(format!("invalid text: {e}")))?;
                current(&mut stack)?.text.push_str(&text);
            }
            Event::CData(data) => {
                let data = data.into_inner();
                current(&mut stack)?
                    .text
                    .push_str(&String::from_utf8_lossy(&data));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match (stack.pop(), stack.is_empty()) {
        (Some(root), true) => Ok(root),
        _ => Err(TransportError::Malformed("unclosed element".into())),
    }
}

fn current(stack: &mut [Node]) -> Result<&mut Node, TransportError> {
    stack
        .last_mut()
        .ok_or_else(|| TransportError::Malformed("unbalanced element".into()))
}

/// Locate `<{Op}Result>` in a reply, surfacing faults and bad statuses
///
/// A SOAP fault wins over the HTTP status (faults arrive with status 500).
pub(crate) fn decode_reply(
    status: u16,
    body: &str,
    operation: Operation,
) -> Result<Node, TransportError> {
    let is_success = (200..300).contains(&status);
    let tree = match parse_tree(body) {
        Ok(tree) => tree,
        Err(_) if !is_success => {
            return Err(TransportError::Http {
                status,
                body: truncate_body(body),
            });
        }
        Err(e) => return Err(e),
    };

    let soap_body = match tree.child("Envelope").and_then(|env| env.child("Body")) {
        Some(soap_body) => soap_body,
        None if !is_success => {
            return Err(TransportError::Http {
                status,
                body: truncate_body(body),
            });
        }
        None => return Err(TransportError::Malformed("missing SOAP envelope body".into())),
    };

    if let Some(fault) = soap_body.child("Fault") {
        return Err(TransportError::Fault {
            code: fault.text_of("faultcode").unwrap_or_default().to_string(),
            message: fault.text_of("faultstring").unwrap_or_default().to_string(),
        });
    }
    if !is_success {
        return Err(TransportError::Http {
            status,
            body: truncate_body(body),
        });
    }

    let result_name = format!("{}Result", operation.name());
    soap_body
        .find(&result_name)
        .cloned()
        .ok_or_else(|| TransportError::Malformed(format!("missing {result_name} element")))
}

fn result_code(result: &Node) -> Result<i32, TransportError> {
    let raw = result
        .text_of("resultCode")
        .ok_or_else(|| TransportError::Malformed("missing resultCode".into()))?;
    raw.trim()
        .parse()
        .map_err(|_| TransportError::Malformed(format!("non-numeric resultCode '{raw}'")))
}

fn optional_text(result: &Node, name: &str) -> Option<String> {
    result
        .text_of(name)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

pub(crate) fn decode_login(result: &Node) -> Result<LoginReply, TransportError> {
    Ok(LoginReply {
        result_code: result_code(result)?,
        outgoing_token: optional_text(result, "DSTOut"),
    })
}

pub(crate) fn decode_locate(result: &Node) -> Result<LocateReply, TransportError> {
    let properties = result.child("docProperties");
    let sequence = |name: &str| -> Vec<String> {
        properties
            .and_then(|p| p.child(name))
            .filter(|n| !n.nil)
            .map(Node::item_texts)
            .unwrap_or_default()
    };
    Ok(LocateReply {
        result_code: result_code(result)?,
        content_id: optional_text(result, "getDocID"),
        property_names: sequence("propertyNames"),
        property_values: sequence("propertyValues"),
    })
}

pub(crate) fn decode_open_stream(result: &Node) -> Result<OpenStreamReply, TransportError> {
    Ok(OpenStreamReply {
        result_code: result_code(result)?,
        stream_id: optional_text(result, "streamID"),
    })
}

pub(crate) fn decode_read_chunk(result: &Node) -> Result<ReadReply, TransportError> {
    let result_code = result_code(result)?;
    let encoded = result
        .child("streamData")
        .filter(|d| !d.nil)
        .and_then(|d| d.text_of("streamBuffer"))
        .map(str::trim)
        .filter(|b| !b.is_empty());
    let data = match encoded {
        Some(encoded) => Some(
            STANDARD
                .decode(encoded)
                .map_err(|e| TransportError::Malformed(format!("invalid streamBuffer: {e}")))?,
        ),
        None => None,
    };
    Ok(ReadReply { result_code, data })
}

pub(crate) fn decode_release(result: &Node) -> Result<ReleaseReply, TransportError> {
    Ok(ReleaseReply {
        result_code: result_code(result)?,
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::dms::transport::LoginInfo;
    use crate::types::DocumentId;

    const NS: &str = "http://tempuri.org/";

    fn reply(op: &str, result_body: &str) -> String {
        format!(
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><{op}Response xmlns="http://tempuri.org/"><{op}Result xmlns:a="{CONTRACT_NS}" xmlns:i="{INSTANCE_NS}">{result_body}</{op}Result></{op}Response></s:Body></s:Envelope>"#
        )
    }

    #[test]
    fn test_soap_action_uses_port_contract() {
        assert_eq!(
            Operation::Login.soap_action(NS),
            "\"http://tempuri.org/IDMSvc/LoginSvr5\""
        );
        assert_eq!(
            Operation::ReadChunk.soap_action(NS),
            "\"http://tempuri.org/IDMObj/ReadStream\""
        );
        assert_eq!(Operation::Locate.port(), Port::Service);
        assert_eq!(Operation::Release.port(), Port::Object);
    }

    #[test]
    fn test_encode_login_wraps_single_record_in_array() {
        let request = LoginRequest {
            login_info: vec![LoginInfo {
                network: 0,
                login_context: "RTA_MAIN".into(),
                username: "crawler".into(),
                password: "p<&>w".into(),
            }],
            auth_mode: 1,
            incoming_token: String::new(),
        };
        let xml = encode_login(NS, &request);

        assert!(xml.contains(r#"<LoginSvr5 xmlns="http://tempuri.org/">"#));
        assert!(xml.contains("<a:authen>1</a:authen>"));
        assert!(xml.contains("<a:dstIn></a:dstIn>"));
        assert!(xml.contains(
            "<a:loginInfo><a:DMSvrLoginInfo><a:loginContext>RTA_MAIN</a:loginContext>"
        ));
        assert!(xml.contains("<a:password>p&lt;&amp;&gt;w</a:password>"));

        // The request must itself be well-formed
        let tree = parse_tree(&xml).unwrap();
        let info = tree.find("DMSvrLoginInfo").unwrap();
        assert_eq!(info.text_of("password"), Some("p<&>w"));
    }

    #[test]
    fn test_encode_locate_keeps_names_and_values_aligned() {
        let criteria = RetrievalCriteria {
            library: "RTA_MAIN".into(),
            document: DocumentId::new("19660298"),
            version: "%VERSION_TO_INDEX".into(),
        };
        let xml = encode_locate(NS, "DST", &criteria);
        let tree = parse_tree(&xml).unwrap();
        let criteria_node = tree.find("criteria").unwrap();

        assert_eq!(criteria_node.text_of("criteriaCount"), Some("3"));
        let names = criteria_node.child("criteriaNames").unwrap().item_texts();
        let values = criteria_node.child("criteriaValues").unwrap().item_texts();
        assert_eq!(
            names,
            vec!["%TARGET_LIBRARY", "%DOCUMENT_NUMBER", "%VERSION_ID"]
        );
        assert_eq!(values, vec!["RTA_MAIN", "19660298", "%VERSION_TO_INDEX"]);
        assert_eq!(tree.find("dstIn").unwrap().text, "DST");
    }

    #[test]
    fn test_encode_stream_calls() {
        let xml = encode_open_stream(NS, "DST", "CH1");
        assert!(xml.contains("<a:contentID>CH1</a:contentID>"));
        let xml = encode_read_chunk(NS, "SH1", 65536);
        assert!(xml.contains("<a:requestedBytes>65536</a:requestedBytes>"));
        assert!(xml.contains("<a:streamID>SH1</a:streamID>"));
        let xml = encode_release(NS, "SH1");
        assert!(xml.contains("<ReleaseObject"));
        assert!(xml.contains("<a:objectID>SH1</a:objectID>"));
    }

    #[test]
    fn test_decode_login_reply() {
        let body = reply(
            "LoginSvr5",
            "<a:DSTOut>TOKEN-1</a:DSTOut><a:resultCode>0</a:resultCode>",
        );
        let result = decode_reply(200, &body, Operation::Login).unwrap();
        let login = decode_login(&result).unwrap();
        assert_eq!(login.result_code, 0);
        assert_eq!(login.outgoing_token.as_deref(), Some("TOKEN-1"));
    }

    #[test]
    fn test_decode_login_nil_token() {
        let body = reply(
            "LoginSvr5",
            r#"<a:DSTOut i:nil="true"/><a:resultCode>-1</a:resultCode>"#,
        );
        let result = decode_reply(200, &body, Operation::Login).unwrap();
        let login = decode_login(&result).unwrap();
        assert_eq!(login.result_code, -1);
        assert_eq!(login.outgoing_token, None);
    }

    #[test]
    fn test_decode_locate_with_properties() {
        let body = reply(
            "GetDocSvr3",
            r#"<a:docProperties><a:propertyNames xmlns:b="http://schemas.microsoft.com/2003/10/Serialization/Arrays"><b:string>%AUTHOR</b:string><b:string>%VERSION_FILE_NAME</b:string><b:string>%COMMENT</b:string></a:propertyNames><a:propertyValues xmlns:b="http://schemas.microsoft.com/2003/10/Serialization/Arrays"><b:anyType>jdoe</b:anyType><b:anyType>scan123.png</b:anyType><b:anyType i:nil="true"/></a:propertyValues></a:docProperties><a:getDocID>CH1</a:getDocID><a:resultCode>0</a:resultCode>"#,
        );
        let result = decode_reply(200, &body, Operation::Locate).unwrap();
        let locate = decode_locate(&result).unwrap();
        assert_eq!(locate.result_code, 0);
        assert_eq!(locate.content_id.as_deref(), Some("CH1"));
        assert_eq!(
            locate.property_names,
            vec!["%AUTHOR", "%VERSION_FILE_NAME", "%COMMENT"]
        );
        assert_eq!(locate.property_values, vec!["jdoe", "scan123.png", ""]);
    }

    #[test]
    fn test_decode_locate_not_found() {
        let body = reply(
            "GetDocSvr3",
            r#"<a:docProperties i:nil="true"/><a:getDocID i:nil="true"/><a:resultCode>-2147220954</a:resultCode>"#,
        );
        let result = decode_reply(200, &body, Operation::Locate).unwrap();
        let locate = decode_locate(&result).unwrap();
        assert_eq!(locate.result_code, -2147220954);
        assert_eq!(locate.content_id, None);
        assert!(locate.property_names.is_empty());
    }

    #[test]
    fn test_decode_read_chunk_base64() {
        let body = reply(
            "ReadStream",
            "<a:resultCode>0</a:resultCode><a:streamData><a:streamBuffer>aGVsbG8=</a:streamBuffer></a:streamData>",
        );
        let result = decode_reply(200, &body, Operation::ReadChunk).unwrap();
        let read = decode_read_chunk(&result).unwrap();
        assert_eq!(read.data.as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_decode_read_chunk_end_of_stream_shapes() {
        for shape in [
            "<a:resultCode>0</a:resultCode>",
            r#"<a:resultCode>0</a:resultCode><a:streamData i:nil="true"/>"#,
            "<a:resultCode>0</a:resultCode><a:streamData><a:streamBuffer/></a:streamData>",
        ] {
            let body = reply("ReadStream", shape);
            let result = decode_reply(200, &body, Operation::ReadChunk).unwrap();
            assert_eq!(decode_read_chunk(&result).unwrap().data, None, "{shape}");
        }
    }

    #[test]
    fn test_decode_read_chunk_invalid_base64() {
        let body = reply(
            "ReadStream",
            "<a:resultCode>0</a:resultCode><a:streamData><a:streamBuffer>!!!</a:streamBuffer></a:streamData>",
        );
        let result = decode_reply(200, &body, Operation::ReadChunk).unwrap();
        assert!(matches!(
            decode_read_chunk(&result),
            Err(TransportError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_fault_takes_precedence_over_status() {
        let body = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><s:Fault><faultcode>s:Client</faultcode><faultstring xml:lang="en-US">Invalid DST</faultstring></s:Fault></s:Body></s:Envelope>"#;
        let err = decode_reply(500, body, Operation::Locate).unwrap_err();
        assert_eq!(
            err,
            TransportError::Fault {
                code: "s:Client".into(),
                message: "Invalid DST".into(),
            }
        );
    }

    #[test]
    fn test_decode_non_xml_error_status() {
        let err = decode_reply(503, "Service Unavailable", Operation::Login).unwrap_err();
        assert_eq!(
            err,
            TransportError::Http {
                status: 503,
                body: "Service Unavailable".into(),
            }
        );
    }

    #[test]
    fn test_decode_missing_result_element() {
        let body = reply("LoginSvr5", "<a:resultCode>0</a:resultCode>");
        let err = decode_reply(200, &body, Operation::Locate).unwrap_err();
        assert!(matches!(err, TransportError::Malformed(msg) if msg.contains("GetDocSvr3Result")));
    }

    #[test]
    fn test_decode_missing_result_code() {
        let body = reply("ReleaseObject", "");
        let result = decode_reply(200, &body, Operation::Release).unwrap();
        assert!(matches!(
            decode_release(&result),
            Err(TransportError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_tree_rejects_truncated_document() {
        assert!(parse_tree("<a><b>text</b>").is_err());
    }
}
