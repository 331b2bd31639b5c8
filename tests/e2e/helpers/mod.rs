use conduit_dns_application::ports::{ResponseCache, UpstreamExchanger};
use conduit_dns_application::{ForwardingEngine, QueryEventEmitter};
use conduit_dns_domain::config::{
    CacheConfig, ServerConfig, TransportPreference, UpstreamConfig, UpstreamTargetConfig,
};
use conduit_dns_domain::message::{DnsMessage, Question};
use conduit_dns_domain::record::{RData, RecordClass, RecordType, ResourceRecord};
use conduit_dns_domain::{wire, Rcode};
use conduit_dns_infrastructure::cache::DnsCache;
use conduit_dns_infrastructure::server::DnsServer;
use conduit_dns_infrastructure::upstream::UpstreamClient;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

/// Scripted upstream resolver: answers A queries with a fixed address and
/// TTL, everything else with NXDOMAIN plus an SOA. Counts the queries it
/// sees.
pub struct MockResolver {
    pub addr: SocketAddr,
    queries: Arc<AtomicUsize>,
}

impl MockResolver {
    pub async fn start(ttl: u32, answer: Ipv4Addr, delay: Duration) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let queries = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&queries);

        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                let (len, client) = match socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(_) => return,
                };
                let query = match wire::decode(&buf[..len]) {
                    Ok(query) => query,
                    Err(_) => continue,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                let question = &query.questions[0];
                let mut reply = query.response_with_rcode(Rcode::NoError);
                if question.qtype == RecordType::A {
                    reply.answers.push(ResourceRecord::new(
                        question.name.clone(),
                        RecordType::A,
                        RecordClass::IN,
                        ttl,
                        RData::A(answer),
                    ));
                } else {
                    reply.flags.rcode = Rcode::NxDomain;
                    reply.authorities.push(ResourceRecord::new(
                        "example",
                        RecordType::SOA,
                        RecordClass::IN,
                        3600,
                        RData::Soa {
                            mname: "ns1.example".to_string(),
                            rname: "hostmaster.example".to_string(),
                            serial: 1,
                            refresh: 7200,
                            retry: 900,
                            expire: 86_400,
                            minimum: 60,
                        },
                    ));
                }
                let _ = socket
                    .send_to(&wire::encode(&reply).unwrap(), client)
                    .await;
            }
        });

        Self { addr, queries }
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

/// Full forwarder on ephemeral ports, wired the way the binary wires it.
pub async fn start_forwarder(upstreams: &[SocketAddr], cache_enabled: bool) -> DnsServer {
    let upstream_config = UpstreamConfig {
        targets: upstreams
            .iter()
            .map(|addr| UpstreamTargetConfig {
                address: addr.to_string(),
                transport: TransportPreference::Udp,
            })
            .collect(),
        query_timeout_ms: 1_000,
        attempts_per_target: 1,
        exchange_timeout_ms: 300,
        initial_backoff_ms: 10,
        failure_threshold: 2,
    };
    let cache = cache_enabled
        .then(|| Arc::new(DnsCache::new(&CacheConfig::default())) as Arc<dyn ResponseCache>);
    let upstream: Arc<dyn UpstreamExchanger> = Arc::new(
        UpstreamClient::from_config(&upstream_config, QueryEventEmitter::new_disabled()).unwrap(),
    );
    let engine = Arc::new(ForwardingEngine::new(
        cache,
        upstream,
        Duration::from_millis(upstream_config.query_timeout_ms),
        QueryEventEmitter::new_disabled(),
    ));

    let server_config = ServerConfig {
        port: 0,
        bind_address: "127.0.0.1".to_string(),
        tcp_idle_timeout_secs: 2,
        shutdown_grace_secs: 1,
    };
    DnsServer::start(engine, &server_config).await.unwrap()
}

pub fn a_query(id: u16, name: &str) -> DnsMessage {
    DnsMessage::query(id, Question::new(name, RecordType::A, RecordClass::IN))
}

pub async fn udp_roundtrip(server: SocketAddr, query: &DnsMessage) -> DnsMessage {
    let bytes = udp_roundtrip_raw(server, &wire::encode(query).unwrap())
        .await
        .expect("no reply within the deadline");
    wire::decode(&bytes).unwrap()
}

/// Sends raw bytes and returns the reply, or `None` when the server stays
/// silent for two seconds.
pub async fn udp_roundtrip_raw(server: SocketAddr, payload: &[u8]) -> Option<Vec<u8>> {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(payload, server).await.unwrap();
    let mut buf = [0u8; 4096];
    match tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf)).await {
        Ok(Ok((len, _))) => Some(buf[..len].to_vec()),
        _ => None,
    }
}

pub async fn tcp_roundtrip(server: SocketAddr, query: &DnsMessage) -> DnsMessage {
    let mut stream = TcpStream::connect(server).await.unwrap();
    let bytes = wire::encode(query).unwrap();
    let mut framed = (bytes.len() as u16).to_be_bytes().to_vec();
    framed.extend_from_slice(&bytes);
    stream.write_all(&framed).await.unwrap();

    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await.unwrap();
    let mut reply = vec![0u8; u16::from_be_bytes(len_buf) as usize];
    stream.read_exact(&mut reply).await.unwrap();
    wire::decode(&reply).unwrap()
}
