use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use std::net::SocketAddr;
use tracing::{info, warn};

/// Consecutive-failure tracking per upstream target.
///
/// A target reaching the failure threshold is degraded: it stays usable but
/// is tried after the healthy targets. One success clears the streak.
pub struct HealthTracker {
    failures: DashMap<SocketAddr, u32, FxBuildHasher>,
    threshold: u32,
}

impl HealthTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            failures: DashMap::with_hasher(FxBuildHasher),
            threshold: threshold.max(1),
        }
    }

    pub fn record_success(&self, server: SocketAddr) {
        if self.failures.remove(&server).is_some_and(|(_, n)| n >= self.threshold) {
            info!(%server, "upstream target recovered");
        }
    }

    pub fn record_failure(&self, server: SocketAddr) {
        let mut streak = self.failures.entry(server).or_insert(0);
        *streak += 1;
        if *streak == self.threshold {
            warn!(%server, failures = *streak, "upstream target degraded");
        }
    }

    pub fn is_degraded(&self, server: SocketAddr) -> bool {
        self.failures
            .get(&server)
            .is_some_and(|streak| *streak >= self.threshold)
    }
}
