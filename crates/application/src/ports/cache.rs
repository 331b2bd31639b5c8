use conduit_dns_domain::{DnsMessage, QueryKey};

/// A cache hit: the response as it was stored (original TTLs) plus its age.
/// The engine decays TTLs by `age_secs` before replying.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub message: DnsMessage,
    pub age_secs: u32,
}

/// Port for the response cache.
///
/// `get` must treat expired entries as absent; `put` decides cacheability
/// (TTL clamp, TTL-0 rejection, negative-response policy) and is a no-op
/// for responses that must not be stored.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &QueryKey) -> Option<CachedResponse>;
    fn put(&self, key: QueryKey, response: &DnsMessage);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
