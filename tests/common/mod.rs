//! Shared test infrastructure for the DNS and HTTP front ends.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{MessageRequest, MessageResponse};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

use tinytld::{DomainConfig, RegistrationHandler, Registry};

// --- Constants ---

pub const TTL: u32 = 60;

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
///
/// The response is serialized via `MessageResponse::destructive_emit()` and
/// stored as raw wire-format bytes, which can then be parsed with
/// `Message::from_vec()`.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

// --- Handler construction ---

/// A handler over a fresh registry with the default `host.` / `in.host.`
/// suffixes and no persistence.
pub fn test_handler() -> RegistrationHandler {
    RegistrationHandler::new(Registry::new(DomainConfig::default()), TTL)
}

/// Source address for a query from `ip`.
pub fn make_src(ip: &str) -> SocketAddr {
    SocketAddr::new(ip.parse().unwrap(), 40000)
}

// --- Query/Request construction ---

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Build a full `Request` with a crafted source address and transport.
pub fn build_request(
    name: &str,
    record_type: RecordType,
    src: SocketAddr,
    protocol: Protocol,
    id: u16,
) -> Request {
    let bytes = build_query_bytes(name, record_type, id);
    let msg = parse_message_request(&bytes);
    Request::new(msg, src, protocol)
}

// --- Response helpers ---

/// Run a UDP query through the handler and return the parsed response.
pub async fn execute_query(
    handler: &RegistrationHandler,
    name: &str,
    record_type: RecordType,
    src: SocketAddr,
    id: u16,
) -> Message {
    execute_query_over(handler, name, record_type, src, Protocol::Udp, id).await
}

/// Run a query over the given transport and return the parsed response.
pub async fn execute_query_over(
    handler: &RegistrationHandler,
    name: &str,
    record_type: RecordType,
    src: SocketAddr,
    protocol: Protocol,
    id: u16,
) -> Message {
    let request = build_request(name, record_type, src, protocol, id);
    let response = TestResponseHandler::new();
    handler.handle_request(&request, response.clone()).await;
    response.into_message()
}

/// A addresses in a record section, with their TTLs.
pub fn a_records(records: &[Record]) -> Vec<(Ipv4Addr, u32)> {
    records
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some((Ipv4Addr::from(*a), r.ttl())),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}

/// Assert a NoError reply with nothing in the answer or additional sections.
pub fn assert_empty_reply(msg: &Message) {
    assert_response_code(msg, ResponseCode::NoError);
    assert!(msg.answers().is_empty(), "answers: {:?}", msg.answers());
    assert!(
        msg.additionals().is_empty(),
        "additionals: {:?}",
        msg.additionals()
    );
}
