use async_trait::async_trait;
use conduit_dns_application::ports::{
    CachedResponse, ResponseCache, UpstreamAnswer, UpstreamExchanger,
};
use conduit_dns_domain::record::{RData, RecordClass, RecordType, ResourceRecord};
use conduit_dns_domain::{DnsMessage, DomainError, QueryKey};
use dashmap::DashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What the mock upstream does with each exchange.
pub enum Behavior {
    /// Answer with a single A record after an optional delay.
    Answer {
        ttl: u32,
        addr: [u8; 4],
        delay: Duration,
    },
    Fail(DomainError),
    /// Never answer; the engine's timeout must fire.
    Hang,
}

pub struct MockExchanger {
    pub calls: AtomicUsize,
    behavior: Behavior,
}

impl MockExchanger {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            behavior,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamExchanger for MockExchanger {
    async fn exchange(&self, query: &DnsMessage) -> Result<UpstreamAnswer, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Answer { ttl, addr, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                let question = query
                    .question()
                    .ok_or_else(|| DomainError::MalformedMessage("no question".into()))?;
                let mut message = query.response_with_rcode(conduit_dns_domain::Rcode::NoError);
                message.answers.push(ResourceRecord::new(
                    question.name.clone(),
                    RecordType::A,
                    RecordClass::IN,
                    *ttl,
                    RData::A(Ipv4Addr::from(*addr)),
                ));
                Ok(UpstreamAnswer {
                    message,
                    server: "mock:53".to_string(),
                })
            }
            Behavior::Fail(error) => Err(error.clone()),
            Behavior::Hang => {
                futures_never().await;
                unreachable!()
            }
        }
    }
}

async fn futures_never() {
    // Pending forever; cancelled by the engine's timeout.
    std::future::pending::<()>().await
}

/// Unbounded in-memory cache with a controllable reported age.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<QueryKey, (DnsMessage, u32)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, key: QueryKey, message: DnsMessage, age_secs: u32) {
        self.entries.insert(key, (message, age_secs));
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &QueryKey) -> Option<CachedResponse> {
        self.entries.get(key).map(|entry| CachedResponse {
            message: entry.0.clone(),
            age_secs: entry.1,
        })
    }

    fn put(&self, key: QueryKey, response: &DnsMessage) {
        self.entries.insert(key, (response.clone(), 0));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
