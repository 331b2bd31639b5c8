//! TTL-bounded response cache.
//!
//! Entries expire lazily: a lookup that lands on a stale entry removes it
//! and reports a miss. Capacity pressure is relieved by reclaiming expired
//! entries first, then by sampled LRU eviction.
mod clock;
mod key;
mod metrics;
mod storage;

pub use key::CacheKey;
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use storage::DnsCache;
