mod helpers;

use conduit_dns_domain::message::Question;
use conduit_dns_domain::record::{RData, RecordClass, RecordType};
use conduit_dns_domain::{DnsMessage, Rcode};
use helpers::{a_query, start_forwarder, tcp_roundtrip, udp_roundtrip, udp_roundtrip_raw, MockResolver};
use std::net::Ipv4Addr;
use std::time::Duration;

#[tokio::test]
async fn forwards_a_query_over_udp() {
    let resolver = MockResolver::start(300, Ipv4Addr::new(198, 51, 100, 1), Duration::ZERO).await;
    let server = start_forwarder(&[resolver.addr], false).await;

    let reply = udp_roundtrip(server.udp_addr(), &a_query(0x1234, "example.com")).await;

    assert_eq!(reply.id, 0x1234);
    assert!(reply.flags.response);
    assert!(reply.flags.recursion_available);
    assert_eq!(reply.flags.rcode, Rcode::NoError);
    assert_eq!(reply.answers.len(), 1);
    assert_eq!(
        reply.answers[0].rdata,
        RData::A(Ipv4Addr::new(198, 51, 100, 1))
    );
    assert_eq!(resolver.query_count(), 1);

    server.stop().await;
}

#[tokio::test]
async fn forwards_a_query_over_tcp() {
    let resolver = MockResolver::start(60, Ipv4Addr::new(198, 51, 100, 2), Duration::ZERO).await;
    let server = start_forwarder(&[resolver.addr], false).await;

    let reply = tcp_roundtrip(server.tcp_addr(), &a_query(0x00FF, "tcp.example")).await;
    assert_eq!(reply.id, 0x00FF);
    assert_eq!(reply.flags.rcode, Rcode::NoError);
    assert_eq!(reply.answers.len(), 1);

    server.stop().await;
}

#[tokio::test]
async fn nxdomain_is_forwarded_with_its_soa() {
    let resolver = MockResolver::start(60, Ipv4Addr::LOCALHOST, Duration::ZERO).await;
    let server = start_forwarder(&[resolver.addr], false).await;

    let query = DnsMessage::query(
        7,
        Question::new("missing.example", RecordType::AAAA, RecordClass::IN),
    );
    let reply = udp_roundtrip(server.udp_addr(), &query).await;

    assert_eq!(reply.flags.rcode, Rcode::NxDomain);
    assert_eq!(reply.authorities.len(), 1);
    assert_eq!(reply.authorities[0].record_type, RecordType::SOA);

    server.stop().await;
}

#[tokio::test]
async fn header_only_garbage_gets_formerr_with_the_salvaged_id() {
    let resolver = MockResolver::start(60, Ipv4Addr::LOCALHOST, Duration::ZERO).await;
    let server = start_forwarder(&[resolver.addr], false).await;

    // Valid header claiming one question, then nothing.
    let mut garbage = vec![0u8; 12];
    garbage[0] = 0xAB;
    garbage[1] = 0xCD;
    garbage[5] = 1;

    let reply_bytes = udp_roundtrip_raw(server.udp_addr(), &garbage)
        .await
        .expect("malformed queries with a readable id deserve a FORMERR");
    let reply = conduit_dns_domain::wire::decode(&reply_bytes).unwrap();
    assert_eq!(reply.id, 0xABCD);
    assert_eq!(reply.flags.rcode, Rcode::FormErr);
    assert_eq!(resolver.query_count(), 0);

    server.stop().await;
}

#[tokio::test]
async fn runt_datagram_gets_no_reply() {
    let resolver = MockResolver::start(60, Ipv4Addr::LOCALHOST, Duration::ZERO).await;
    let server = start_forwarder(&[resolver.addr], false).await;

    // A single byte does not even carry a transaction id to answer under.
    assert!(udp_roundtrip_raw(server.udp_addr(), &[0x12]).await.is_none());

    server.stop().await;
}

#[tokio::test]
async fn response_messages_are_refused_with_notimp() {
    let resolver = MockResolver::start(60, Ipv4Addr::LOCALHOST, Duration::ZERO).await;
    let server = start_forwarder(&[resolver.addr], false).await;

    let mut bogus = a_query(9, "example.com");
    bogus.flags.response = true;
    let reply = udp_roundtrip(server.udp_addr(), &bogus).await;

    assert_eq!(reply.flags.rcode, Rcode::NotImp);
    assert_eq!(resolver.query_count(), 0);

    server.stop().await;
}
