use super::{map_io_error, DnsTransport, ReplyExpectation};
use async_trait::async_trait;
use conduit_dns_application::correlator::validate_upstream_reply;
use conduit_dns_application::{QueryEvent, QueryEventEmitter};
use conduit_dns_domain::{wire, DnsMessage, DomainError, QueryKey};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::warn;

const MAX_REPLY_LEN: usize = 65_535;

/// UDP exchange from an ephemeral local port.
///
/// The receive loop is the anti-spoofing boundary: datagrams from any
/// source other than the queried server, and replies whose id or question
/// do not match the outbound query, are dropped and the wait continues.
/// Only the caller's deadline ends an exchange that never sees a valid
/// reply.
pub struct UdpTransport {
    events: QueryEventEmitter,
}

impl UdpTransport {
    pub fn new(events: QueryEventEmitter) -> Self {
        Self { events }
    }

    fn report_drop(&self, expected: &ReplyExpectation<'_>, reason: String) {
        self.events.emit(QueryEvent::SpoofDropped {
            key: QueryKey::from(expected.question),
            reason,
        });
    }
}

#[async_trait]
impl DnsTransport for UdpTransport {
    async fn exchange(
        &self,
        server: SocketAddr,
        query: &[u8],
        expected: &ReplyExpectation<'_>,
    ) -> Result<DnsMessage, DomainError> {
        let bind_addr = if server.is_ipv4() {
            SocketAddr::from((std::net::Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((std::net::Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| map_io_error(server, e))?;
        socket
            .send_to(query, server)
            .await
            .map_err(|e| map_io_error(server, e))?;

        let mut buf = vec![0u8; MAX_REPLY_LEN];
        loop {
            let (len, source) = socket
                .recv_from(&mut buf)
                .await
                .map_err(|e| map_io_error(server, e))?;
            if source != server {
                warn!(%server, %source, "dropping datagram from unexpected source");
                self.report_drop(expected, format!("unexpected source {source}"));
                continue;
            }

            let reply = match wire::decode(&buf[..len]) {
                Ok(reply) => reply,
                Err(error) => {
                    warn!(%server, %error, "dropping undecodable reply");
                    continue;
                }
            };
            if let Err(mismatch) = validate_upstream_reply(expected.id, expected.question, &reply) {
                warn!(%server, %mismatch, "dropping reply that does not match the query");
                self.report_drop(expected, mismatch.to_string());
                continue;
            }
            if reply.flags.truncated {
                return Err(DomainError::TruncatedNeedsTcp);
            }
            return Ok(reply);
        }
    }
}
