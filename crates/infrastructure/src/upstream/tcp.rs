use super::{map_io_error, DnsTransport, ReplyExpectation};
use async_trait::async_trait;
use conduit_dns_application::correlator::validate_upstream_reply;
use conduit_dns_domain::{wire, DnsMessage, DomainError};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// TCP exchange with RFC 1035 §4.2.2 two-byte length framing.
///
/// Unlike UDP there is no spoofing window on a connected stream, so a reply
/// that fails validation is an error rather than something to wait past.
pub struct TcpTransport;

#[async_trait]
impl DnsTransport for TcpTransport {
    async fn exchange(
        &self,
        server: SocketAddr,
        query: &[u8],
        expected: &ReplyExpectation<'_>,
    ) -> Result<DnsMessage, DomainError> {
        let len = u16::try_from(query.len())
            .map_err(|_| DomainError::MessageTooLarge { size: query.len() })?;

        let mut stream = TcpStream::connect(server)
            .await
            .map_err(|e| map_io_error(server, e))?;
        stream.set_nodelay(true).map_err(|e| map_io_error(server, e))?;

        // Single write so the length prefix and payload share a segment.
        let mut framed = Vec::with_capacity(query.len() + 2);
        framed.extend_from_slice(&len.to_be_bytes());
        framed.extend_from_slice(query);
        stream
            .write_all(&framed)
            .await
            .map_err(|e| map_io_error(server, e))?;

        let mut len_buf = [0u8; 2];
        stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| map_io_error(server, e))?;
        let mut reply_buf = vec![0u8; u16::from_be_bytes(len_buf) as usize];
        stream
            .read_exact(&mut reply_buf)
            .await
            .map_err(|e| map_io_error(server, e))?;

        let reply = wire::decode(&reply_buf)?;
        validate_upstream_reply(expected.id, expected.question, &reply).map_err(|mismatch| {
            DomainError::TransportIo {
                server: server.to_string(),
                detail: mismatch.to_string(),
            }
        })?;
        Ok(reply)
    }
}
