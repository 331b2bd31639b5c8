mod helpers;

use conduit_dns_domain::Rcode;
use helpers::{a_query, start_forwarder, udp_roundtrip, udp_roundtrip_raw, MockResolver};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::UdpSocket;

#[tokio::test]
async fn dead_upstream_yields_servfail() {
    // Bound but never answering.
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server = start_forwarder(&[silent.local_addr().unwrap()], false).await;

    let reply = udp_roundtrip(server.udp_addr(), &a_query(0x0101, "down.example")).await;
    assert_eq!(reply.id, 0x0101);
    assert_eq!(reply.flags.rcode, Rcode::ServFail);

    server.stop().await;
}

#[tokio::test]
async fn fails_over_to_the_secondary_target() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let resolver = MockResolver::start(60, Ipv4Addr::new(203, 0, 113, 5), Duration::ZERO).await;
    let server =
        start_forwarder(&[silent.local_addr().unwrap(), resolver.addr], false).await;

    let reply = udp_roundtrip(server.udp_addr(), &a_query(0x0202, "failover.example")).await;
    assert_eq!(reply.flags.rcode, Rcode::NoError);
    assert_eq!(reply.answers.len(), 1);
    assert_eq!(resolver.query_count(), 1);

    server.stop().await;
}

#[tokio::test]
async fn repeat_queries_are_served_from_cache() {
    let resolver = MockResolver::start(300, Ipv4Addr::new(203, 0, 113, 9), Duration::ZERO).await;
    let server = start_forwarder(&[resolver.addr], true).await;

    let first = udp_roundtrip(server.udp_addr(), &a_query(1, "cached.example")).await;
    let second = udp_roundtrip(server.udp_addr(), &a_query(2, "cached.example")).await;

    assert_eq!(first.flags.rcode, Rcode::NoError);
    assert_eq!(second.flags.rcode, Rcode::NoError);
    assert_eq!(second.id, 2);
    // The cached answer's TTL only ever decays.
    assert!(second.answers[0].ttl <= first.answers[0].ttl);
    assert_eq!(resolver.query_count(), 1);

    server.stop().await;
}

#[tokio::test]
async fn concurrent_clients_coalesce_into_one_upstream_query() {
    let resolver =
        MockResolver::start(60, Ipv4Addr::new(203, 0, 113, 7), Duration::from_millis(150)).await;
    let server = start_forwarder(&[resolver.addr], false).await;
    let addr = server.udp_addr();

    let mut tasks = Vec::new();
    for client_id in 0..6u16 {
        tasks.push(tokio::spawn(async move {
            (
                client_id,
                udp_roundtrip(addr, &a_query(0x2000 + client_id, "popular.example")).await,
            )
        }));
    }
    for task in tasks {
        let (client_id, reply) = task.await.unwrap();
        assert_eq!(reply.id, 0x2000 + client_id);
        assert_eq!(reply.flags.rcode, Rcode::NoError);
    }
    assert_eq!(resolver.query_count(), 1);

    server.stop().await;
}

#[tokio::test]
async fn stopped_server_goes_quiet() {
    let resolver = MockResolver::start(60, Ipv4Addr::LOCALHOST, Duration::ZERO).await;
    let server = start_forwarder(&[resolver.addr], false).await;
    let addr = server.udp_addr();

    // Live before, silent after.
    assert_eq!(
        udp_roundtrip(addr, &a_query(1, "up.example")).await.flags.rcode,
        Rcode::NoError
    );
    server.stop().await;

    let encoded = conduit_dns_domain::wire::encode(&a_query(2, "up.example")).unwrap();
    assert!(udp_roundtrip_raw(addr, &encoded).await.is_none());
}
