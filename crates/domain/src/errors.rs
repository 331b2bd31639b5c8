use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DomainError {
    #[error("Malformed DNS message: {0}")]
    MalformedMessage(String),

    #[error("Invalid domain name: {0}")]
    InvalidDomainName(String),

    #[error("Message too large for transport: {size} bytes")]
    MessageTooLarge { size: usize },

    #[error("Transport timeout waiting on {server}")]
    TransportTimeout { server: String },

    #[error("Transport connection refused by {server}")]
    TransportConnectionRefused { server: String },

    #[error("Transport I/O error with {server}: {detail}")]
    TransportIo { server: String, detail: String },

    #[error("Response truncated, retry over TCP")]
    TruncatedNeedsTcp,

    #[error("No upstream servers available")]
    TransportNoServers,

    #[error("All upstream servers unreachable")]
    TransportAllServersUnreachable,

    #[error("Query timeout")]
    QueryTimeout,
}
