use super::{formerr, InFlightGuard};
use conduit_dns_application::ForwardingEngine;
use conduit_dns_domain::message::MAX_UDP_PAYLOAD;
use conduit_dns_domain::wire;
use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{trace, warn};

/// Largest datagram a client can hand us.
const MAX_QUERY_LEN: usize = 65_535;

pub(super) async fn run(
    socket: Arc<UdpSocket>,
    engine: Arc<ForwardingEngine>,
    mut shutdown: watch::Receiver<bool>,
    in_flight: Arc<AtomicUsize>,
) {
    let mut buf = vec![0u8; MAX_QUERY_LEN];
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
            received = socket.recv_from(&mut buf) => {
                let (len, peer) = match received {
                    Ok(received) => received,
                    Err(error) => {
                        warn!(%error, "udp receive failed");
                        continue;
                    }
                };
                let datagram = buf[..len].to_vec();
                let guard = InFlightGuard::enter(&in_flight);
                let socket = Arc::clone(&socket);
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    handle_datagram(socket, engine, datagram, peer).await;
                    drop(guard);
                });
            }
        }
    }
}

async fn handle_datagram(
    socket: Arc<UdpSocket>,
    engine: Arc<ForwardingEngine>,
    datagram: Vec<u8>,
    peer: SocketAddr,
) {
    let (response, payload_limit) = match wire::decode(&datagram) {
        Ok(query) => {
            let payload_limit = query.payload_limit();
            (engine.handle_query(&query).await, payload_limit)
        }
        Err(error) => {
            trace!(%peer, %error, "undecodable query");
            // Reply FORMERR when the header yields an id, otherwise stay
            // silent rather than answer with id 0.
            let Some(id) = wire::salvage_id(&datagram) else {
                return;
            };
            (formerr(id), MAX_UDP_PAYLOAD)
        }
    };

    match wire::encode_for_udp(&response, payload_limit) {
        Ok(bytes) => {
            if let Err(error) = socket.send_to(&bytes, peer).await {
                warn!(%peer, %error, "udp send failed");
            }
        }
        Err(error) => warn!(%peer, %error, "failed to encode response"),
    }
}
