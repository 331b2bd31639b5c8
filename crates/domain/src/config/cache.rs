use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Stored TTLs are clamped into [ttl_min_secs, ttl_max_secs]. A record
    /// set whose minimum TTL is zero is never cached, regardless of clamp.
    #[serde(default = "default_ttl_min")]
    pub ttl_min_secs: u32,

    #[serde(default = "default_ttl_max")]
    pub ttl_max_secs: u32,

    /// Cap on how long NXDOMAIN/NODATA responses may be cached.
    #[serde(default = "default_negative_ttl_max")]
    pub negative_ttl_max_secs: u32,

    /// Entries sampled per eviction pass when capacity is exceeded and no
    /// expired entry can be reclaimed.
    #[serde(default = "default_eviction_sample_size")]
    pub eviction_sample_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_entries: default_max_entries(),
            ttl_min_secs: default_ttl_min(),
            ttl_max_secs: default_ttl_max(),
            negative_ttl_max_secs: default_negative_ttl_max(),
            eviction_sample_size: default_eviction_sample_size(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_entries() -> usize {
    10_000
}

fn default_ttl_min() -> u32 {
    1
}

fn default_ttl_max() -> u32 {
    86_400
}

fn default_negative_ttl_max() -> u32 {
    300
}

fn default_eviction_sample_size() -> usize {
    8
}
