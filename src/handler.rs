//! Hickory request handler for registration and lookup queries.

use async_trait::async_trait;
use hickory_proto::op::{Header, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::iter;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::{debug, error, info, trace, warn};

use crate::metrics::{self, QueryKind, QueryResult, RegistrationSource, Timer};
use crate::names::QueryClass;
use crate::registry::Registry;

/// Registered when the requester's address cannot be determined.
pub const SENTINEL_ADDR: Ipv4Addr = Ipv4Addr::new(1, 2, 3, 4);

/// The requester as seen by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    /// Connection-oriented transport (TCP).
    Stream(SocketAddr),
    /// Connectionless transport (UDP).
    Datagram(SocketAddr),
    /// A transport without a usable remote address.
    Unavailable,
}

impl Peer {
    /// IPv4 address of the peer, unwrapping IPv4-mapped IPv6.
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        let addr = match self {
            Peer::Stream(addr) | Peer::Datagram(addr) => addr,
            Peer::Unavailable => return None,
        };
        match addr.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(v6) => v6.to_ipv4_mapped(),
        }
    }
}

/// Anything that can tell who sent a request.
pub trait PeerAddress {
    /// The remote end of the request's transport.
    fn peer(&self) -> Peer;
}

impl PeerAddress for Request {
    fn peer(&self) -> Peer {
        match self.protocol() {
            Protocol::Tcp => Peer::Stream(self.src()),
            Protocol::Udp => Peer::Datagram(self.src()),
            _ => Peer::Unavailable,
        }
    }
}

/// Records to put in a reply.
#[derive(Debug, Default)]
pub struct Reply {
    /// Answer section.
    pub answers: Vec<Record>,
    /// Additional section.
    pub additionals: Vec<Record>,
}

/// Serves `<host>.<marker>.<tld>` registrations and `<host>.<tld>` lookups.
///
/// Every request gets a reply. Misses are empty NoError replies rather than
/// NXDOMAIN.
#[derive(Debug, Clone)]
pub struct RegistrationHandler {
    registry: Registry,
    ttl: u32,
}

impl RegistrationHandler {
    /// Create a handler answering with records of the given TTL.
    pub fn new(registry: Registry, ttl: u32) -> Self {
        Self { registry, ttl }
    }

    /// The registry this handler reads and updates.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Decide the reply for one question from `peer`.
    pub fn answer(&self, query: &Query, peer: Peer) -> Reply {
        let timer = Timer::start();
        let name = query.name();
        let labels: Vec<String> = name
            .iter()
            .map(|label| String::from_utf8_lossy(label).into_owned())
            .collect();

        match self.registry.domains().classify(&labels) {
            QueryClass::Registration(host) => {
                info!(%name, "registration request");
                let reply = self.register(name, &host, peer);
                metrics::record_query(
                    QueryKind::Registration,
                    QueryResult::Registered,
                    timer.elapsed(),
                );
                reply
            }
            QueryClass::Lookup(host) if query.query_type() == RecordType::A => {
                match self.registry.lookup(&host) {
                    Some(ip) => {
                        debug!(%name, %host, %ip, "lookup: answering");
                        metrics::record_query(
                            QueryKind::Lookup,
                            QueryResult::Answered,
                            timer.elapsed(),
                        );
                        Reply {
                            answers: vec![self.a_record(name, ip)],
                            ..Default::default()
                        }
                    }
                    None => {
                        debug!(%name, %host, "lookup: no such host");
                        metrics::record_query(QueryKind::Lookup, QueryResult::Empty, timer.elapsed());
                        Reply::default()
                    }
                }
            }
            QueryClass::Lookup(host) => {
                trace!(%name, %host, rtype = ?query.query_type(), "lookup: unsupported record type");
                metrics::record_query(QueryKind::Lookup, QueryResult::Empty, timer.elapsed());
                Reply::default()
            }
            QueryClass::Neither => {
                trace!(%name, rtype = ?query.query_type(), "query outside served names");
                metrics::record_query(QueryKind::Other, QueryResult::Empty, timer.elapsed());
                Reply::default()
            }
        }
    }

    fn register(&self, name: &Name, host: &str, peer: Peer) -> Reply {
        metrics::record_registration(RegistrationSource::Dns);

        match peer.ipv4() {
            Some(ip) => {
                self.registry.register(host, ip);
                info!(host, %ip, ?peer, "registered host");
                Reply {
                    additionals: vec![self.a_record(name, ip)],
                    ..Default::default()
                }
            }
            None => {
                // An entry pointing at the sentinel beats no entry at all.
                self.registry.register(host, SENTINEL_ADDR);
                metrics::record_sentinel_fallback();
                warn!(host, ?peer, sentinel = %SENTINEL_ADDR, "no IPv4 peer address, registered sentinel");
                Reply::default()
            }
        }
    }

    fn a_record(&self, name: &Name, ip: Ipv4Addr) -> Record {
        let mut record = Record::from_rdata(name.clone(), self.ttl, RData::A(A::from(ip)));
        record.set_dns_class(DNSClass::IN);
        record
    }
}

#[async_trait]
impl RequestHandler for RegistrationHandler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let reply = match request.queries().first() {
            Some(query) => self.answer(query.original(), request.peer()),
            None => {
                debug!(src = %request.src(), "request without a question");
                Reply::default()
            }
        };

        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);

        let response = MessageResponseBuilder::from_message_request(request).build(
            header,
            reply.answers.iter(),
            iter::empty::<&Record>(),
            iter::empty::<&Record>(),
            reply.additionals.iter(),
        );

        match response_handle.send_response(response).await {
            Ok(info) => info,
            Err(e) => {
                error!(src = %request.src(), error = %e, "failed to send DNS response");
                let mut header = Header::response_from_request(request.header());
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}
