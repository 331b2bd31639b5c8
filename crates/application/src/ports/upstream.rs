use async_trait::async_trait;
use conduit_dns_domain::{DnsMessage, DomainError};

/// A validated upstream response together with the target that produced it.
#[derive(Debug, Clone)]
pub struct UpstreamAnswer {
    pub message: DnsMessage,
    pub server: String,
}

/// Port for resolving one query against the configured upstream targets.
///
/// Implementations own retry, failover, and reply validation; the returned
/// message is already checked against the query's id and question section.
#[async_trait]
pub trait UpstreamExchanger: Send + Sync {
    async fn exchange(&self, query: &DnsMessage) -> Result<UpstreamAnswer, DomainError>;
}
