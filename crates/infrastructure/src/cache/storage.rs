use crate::cache::clock;
use crate::cache::key::CacheKey;
use crate::cache::metrics::{CacheMetrics, CacheMetricsSnapshot};
use conduit_dns_application::ports::{CachedResponse, ResponseCache};
use conduit_dns_domain::config::CacheConfig;
use conduit_dns_domain::message::DnsMessage;
use conduit_dns_domain::record::RecordType;
use conduit_dns_domain::{QueryKey, Rcode};
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

struct CacheEntry {
    /// Response as stored, with original TTLs. The engine decays them by
    /// the entry's age when serving a hit.
    message: DnsMessage,
    stored_at: u64,
    expires_at: u64,
    last_access: AtomicU64,
}

/// Sharded in-memory response cache keyed by (qname, qtype, qclass).
///
/// All timestamps are Unix seconds. The `*_at` methods take the current
/// time explicitly; the [`ResponseCache`] impl feeds them the wall clock.
pub struct DnsCache {
    entries: DashMap<CacheKey, CacheEntry, FxBuildHasher>,
    max_entries: usize,
    ttl_min: u32,
    ttl_max: u32,
    negative_ttl_max: u32,
    eviction_sample_size: usize,
    metrics: CacheMetrics,
}

impl DnsCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::with_capacity_and_hasher(
                config.max_entries.min(1024),
                FxBuildHasher,
            ),
            max_entries: config.max_entries,
            ttl_min: config.ttl_min_secs,
            ttl_max: config.ttl_max_secs,
            negative_ttl_max: config.negative_ttl_max_secs,
            eviction_sample_size: config.eviction_sample_size.max(1),
            metrics: CacheMetrics::default(),
        }
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn get_at(&self, key: &QueryKey, now: u64) -> Option<CachedResponse> {
        let cache_key = CacheKey::from(key);

        let stale = match self.entries.get(&cache_key) {
            None => {
                self.metrics.record_miss();
                return None;
            }
            Some(entry) if now < entry.expires_at => {
                entry.last_access.store(now, Ordering::Relaxed);
                let age_secs =
                    u32::try_from(now.saturating_sub(entry.stored_at)).unwrap_or(u32::MAX);
                let message = entry.message.clone();
                self.metrics.record_hit();
                return Some(CachedResponse { message, age_secs });
            }
            Some(_) => true,
        };

        // Lazy expiry: reclaim the stale entry unless a writer already
        // replaced it with a fresh one.
        if stale
            && self
                .entries
                .remove_if(&cache_key, |_, entry| entry.expires_at <= now)
                .is_some()
        {
            trace!(key = %key, "expired cache entry reclaimed on lookup");
            self.metrics.record_expiration();
        }
        self.metrics.record_miss();
        None
    }

    pub fn put_at(&self, key: QueryKey, response: &DnsMessage, now: u64) {
        let Some(ttl) = self.storable_ttl(response) else {
            trace!(key = %key, rcode = ?response.flags.rcode, "response not cacheable");
            return;
        };

        let mut stored = response.clone();
        // EDNS0 state is per-exchange and must not be replayed to other
        // clients.
        stored
            .additionals
            .retain(|record| record.record_type != RecordType::OPT);

        self.make_room(now);

        let entry = CacheEntry {
            message: stored,
            stored_at: now,
            expires_at: now + u64::from(ttl),
            last_access: AtomicU64::new(now),
        };
        self.entries.insert(CacheKey::from(&key), entry);
        self.metrics.record_insertion();
        trace!(key = %key, ttl, "response cached");
    }

    /// Effective storage TTL for a response, or `None` when the response
    /// must not be cached.
    fn storable_ttl(&self, response: &DnsMessage) -> Option<u32> {
        match response.flags.rcode {
            Rcode::NoError if !response.answers.is_empty() => {
                let ttl = response.min_answer_ttl()?;
                if ttl == 0 {
                    return None;
                }
                Some(ttl.clamp(self.ttl_min, self.ttl_max))
            }
            // NXDOMAIN and NODATA are cacheable for the SOA MINIMUM
            // (RFC 2308), capped by configuration.
            Rcode::NoError | Rcode::NxDomain => {
                let minimum = response
                    .authorities
                    .iter()
                    .find_map(|record| record.soa_minimum())?;
                let ttl = minimum.min(self.negative_ttl_max);
                if ttl == 0 {
                    return None;
                }
                Some(ttl)
            }
            _ => None,
        }
    }

    fn make_room(&self, now: u64) {
        while self.entries.len() >= self.max_entries {
            if !self.remove_one_expired(now) && !self.remove_lru_sampled() {
                break;
            }
        }
    }

    fn remove_one_expired(&self, now: u64) -> bool {
        let victim = self
            .entries
            .iter()
            .find(|entry| entry.value().expires_at <= now)
            .map(|entry| entry.key().clone());
        match victim {
            Some(key) => {
                if self.entries.remove(&key).is_some() {
                    self.metrics.record_expiration();
                }
                true
            }
            None => false,
        }
    }

    /// Approximate LRU: sample a handful of entries and evict the one with
    /// the oldest access time.
    fn remove_lru_sampled(&self) -> bool {
        let mut victim: Option<(CacheKey, u64)> = None;
        for entry in self.entries.iter().take(self.eviction_sample_size) {
            let accessed = entry.value().last_access.load(Ordering::Relaxed);
            if victim.as_ref().map_or(true, |(_, oldest)| accessed < *oldest) {
                victim = Some((entry.key().clone(), accessed));
            }
        }
        match victim {
            Some((key, _)) => {
                if self.entries.remove(&key).is_some() {
                    self.metrics.record_eviction();
                }
                true
            }
            None => false,
        }
    }
}

impl ResponseCache for DnsCache {
    fn get(&self, key: &QueryKey) -> Option<CachedResponse> {
        self.get_at(key, clock::now_secs())
    }

    fn put(&self, key: QueryKey, response: &DnsMessage) {
        self.put_at(key, response, clock::now_secs());
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
