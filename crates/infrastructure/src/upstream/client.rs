use super::{DnsTransport, HealthTracker, ReplyExpectation, TcpTransport, UdpTransport};
use async_trait::async_trait;
use conduit_dns_application::ports::{UpstreamAnswer, UpstreamExchanger};
use conduit_dns_application::QueryEventEmitter;
use conduit_dns_domain::config::{ConfigError, TransportPreference, UpstreamConfig};
use conduit_dns_domain::{wire, DnsMessage, DomainError};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

/// Backoff growth is capped at this multiple of the initial backoff.
const MAX_BACKOFF_MULTIPLIER: u64 = 4;

#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    pub address: SocketAddr,
    pub transport: TransportPreference,
}

/// Resolves queries against the configured targets: a bounded number of
/// attempts per target with jittered backoff, a one-shot TCP retry when UDP
/// comes back truncated, then failover to the next target. Targets that
/// fail repeatedly are tried last until they answer again.
pub struct UpstreamClient {
    targets: Vec<UpstreamTarget>,
    udp: UdpTransport,
    tcp: TcpTransport,
    health: HealthTracker,
    attempts_per_target: u32,
    exchange_timeout: Duration,
    initial_backoff_ms: u64,
}

impl UpstreamClient {
    pub fn from_config(
        config: &UpstreamConfig,
        events: QueryEventEmitter,
    ) -> Result<Self, ConfigError> {
        let mut targets = Vec::with_capacity(config.targets.len());
        for target in &config.targets {
            let address: SocketAddr = target.address.parse().map_err(|_| {
                ConfigError::Validation(format!("invalid upstream address: {}", target.address))
            })?;
            targets.push(UpstreamTarget {
                address,
                transport: target.transport,
            });
        }
        Ok(Self {
            targets,
            udp: UdpTransport::new(events),
            tcp: TcpTransport,
            health: HealthTracker::new(config.failure_threshold),
            attempts_per_target: config.attempts_per_target.max(1),
            exchange_timeout: Duration::from_millis(config.exchange_timeout_ms),
            initial_backoff_ms: config.initial_backoff_ms,
        })
    }

    /// Healthy targets first, each group in configured priority order.
    fn ordered_targets(&self) -> Vec<&UpstreamTarget> {
        let (healthy, degraded): (Vec<_>, Vec<_>) = self
            .targets
            .iter()
            .partition(|target| !self.health.is_degraded(target.address));
        healthy.into_iter().chain(degraded).collect()
    }

    async fn exchange_with_target(
        &self,
        target: &UpstreamTarget,
        query: &[u8],
        expected: &ReplyExpectation<'_>,
    ) -> Result<DnsMessage, DomainError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = self
                .attempt_once(target.address, target.transport, query, expected)
                .await;
            match result {
                Ok(reply) => return Ok(reply),
                Err(DomainError::TruncatedNeedsTcp) => {
                    debug!(server = %target.address, "reply truncated over UDP, retrying over TCP");
                    return self
                        .attempt_once(target.address, TransportPreference::Tcp, query, expected)
                        .await;
                }
                Err(error) if attempt < self.attempts_per_target => {
                    let backoff = self.backoff(attempt);
                    trace!(
                        server = %target.address,
                        attempt,
                        %error,
                        backoff_ms = backoff.as_millis() as u64,
                        "attempt failed, backing off before retry"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn attempt_once(
        &self,
        server: SocketAddr,
        transport: TransportPreference,
        query: &[u8],
        expected: &ReplyExpectation<'_>,
    ) -> Result<DnsMessage, DomainError> {
        match transport {
            TransportPreference::Udp => {
                self.timed(server, self.udp.exchange(server, query, expected))
                    .await
            }
            TransportPreference::Tcp => {
                self.timed(server, self.tcp.exchange(server, query, expected))
                    .await
            }
        }
    }

    async fn timed<F>(&self, server: SocketAddr, exchange: F) -> Result<DnsMessage, DomainError>
    where
        F: Future<Output = Result<DnsMessage, DomainError>>,
    {
        match timeout(self.exchange_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::TransportTimeout {
                server: server.to_string(),
            }),
        }
    }

    /// Exponential backoff before retry `attempt`, capped and jittered by
    /// +/-25% so synchronized retries spread out.
    fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = 1u64 << (attempt - 1).min(2);
        let base_ms = self
            .initial_backoff_ms
            .saturating_mul(multiplier.min(MAX_BACKOFF_MULTIPLIER));
        let jitter = base_ms / 4;
        Duration::from_millis(base_ms - jitter + fastrand::u64(0..=jitter * 2))
    }
}

#[async_trait]
impl UpstreamExchanger for UpstreamClient {
    async fn exchange(&self, query: &DnsMessage) -> Result<UpstreamAnswer, DomainError> {
        let question = query
            .question()
            .ok_or_else(|| DomainError::MalformedMessage("query has no question".to_string()))?;
        if self.targets.is_empty() {
            return Err(DomainError::TransportNoServers);
        }

        let wire_query = wire::encode(query)?;
        let expected = ReplyExpectation {
            id: query.id,
            question,
        };

        for target in self.ordered_targets() {
            match self
                .exchange_with_target(target, &wire_query, &expected)
                .await
            {
                Ok(message) => {
                    self.health.record_success(target.address);
                    debug!(server = %target.address, rcode = ?message.flags.rcode, "upstream answered");
                    return Ok(UpstreamAnswer {
                        message,
                        server: target.address.to_string(),
                    });
                }
                Err(error) => {
                    self.health.record_failure(target.address);
                    warn!(server = %target.address, %error, "upstream target failed, failing over");
                }
            }
        }
        Err(DomainError::TransportAllServersUnreachable)
    }
}
