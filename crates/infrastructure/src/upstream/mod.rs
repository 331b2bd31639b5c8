//! Upstream resolver transports and the retry/failover client.
mod client;
mod health;
mod tcp;
mod udp;

pub use client::{UpstreamClient, UpstreamTarget};
pub use health::HealthTracker;
pub use tcp::TcpTransport;
pub use udp::UdpTransport;

use async_trait::async_trait;
use conduit_dns_domain::{DnsMessage, DomainError, Question};
use std::io;
use std::net::SocketAddr;

/// What an inbound reply must carry to be accepted for an outbound query.
pub struct ReplyExpectation<'a> {
    pub id: u16,
    pub question: &'a Question,
}

/// One request/response exchange against a single server over a single
/// transport. Implementations do not time out on their own; callers bound
/// them with a deadline.
#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn exchange(
        &self,
        server: SocketAddr,
        query: &[u8],
        expected: &ReplyExpectation<'_>,
    ) -> Result<DnsMessage, DomainError>;
}

pub(crate) fn map_io_error(server: SocketAddr, error: io::Error) -> DomainError {
    match error.kind() {
        io::ErrorKind::ConnectionRefused => DomainError::TransportConnectionRefused {
            server: server.to_string(),
        },
        _ => DomainError::TransportIo {
            server: server.to_string(),
            detail: error.to_string(),
        },
    }
}
