use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportPreference {
    #[default]
    Udp,
    Tcp,
}

impl TransportPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamTargetConfig {
    /// Socket address of the resolver, e.g. "9.9.9.9:53".
    pub address: String,

    #[serde(default)]
    pub transport: TransportPreference,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Targets in priority order; earlier entries are preferred.
    #[serde(default)]
    pub targets: Vec<UpstreamTargetConfig>,

    /// Upper bound on one client query, covering all retries and failover.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Send attempts per target before failing over.
    #[serde(default = "default_attempts_per_target")]
    pub attempts_per_target: u32,

    /// Per-attempt exchange timeout.
    #[serde(default = "default_exchange_timeout_ms")]
    pub exchange_timeout_ms: u64,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Consecutive failures after which a target is considered degraded
    /// and tried last.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            query_timeout_ms: default_query_timeout_ms(),
            attempts_per_target: default_attempts_per_target(),
            exchange_timeout_ms: default_exchange_timeout_ms(),
            initial_backoff_ms: default_initial_backoff_ms(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

fn default_query_timeout_ms() -> u64 {
    3000
}

fn default_attempts_per_target() -> u32 {
    2
}

fn default_exchange_timeout_ms() -> u64 {
    1000
}

fn default_initial_backoff_ms() -> u64 {
    50
}

fn default_failure_threshold() -> u32 {
    3
}
