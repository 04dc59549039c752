//! Configuration for the cluster layer.

use crate::error::{ClusterError, Result};
use crate::tt::Depth;
use std::time::Duration;

/// Slots in each worker's entry cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Configuration shared by every component of one rank.
///
/// Built once at startup and passed by reference; nothing reads settings from
/// global state.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Number of search threads per rank.
    pub threads_per_rank: usize,
    /// Capacity of each worker's entry cache.
    pub cache_capacity: usize,
    /// Cached entries that trigger a gossip round. Never exceeds the capacity.
    pub flush_threshold: usize,
    /// Entries shallower than this stay in the local table only.
    pub min_gossip_depth: Depth,
    /// `signals_poll` looks at the transport once every this many calls.
    pub signal_poll_interval: u32,
    /// How long a blocking collective may wait for missing peers.
    pub collective_timeout: Duration,
    /// Consecutive skipped flushes on one in-flight round before warning.
    pub stall_warning_after: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            threads_per_rank: num_cpus::get(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            flush_threshold: DEFAULT_CACHE_CAPACITY,
            min_gossip_depth: 4,
            signal_poll_interval: 1,
            collective_timeout: Duration::from_secs(30),
            stall_warning_after: 256,
        }
    }
}

impl ClusterConfig {
    /// Set the number of search threads per rank (at least 1)
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads_per_rank = threads.max(1);
        self
    }

    /// Set the cache capacity. The flush threshold is clamped to fit.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self.flush_threshold = self.flush_threshold.min(capacity);
        self
    }

    /// Set the cache fill that triggers a gossip round
    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    /// Set the shallowest entry depth that is gossiped to other ranks
    pub fn with_min_gossip_depth(mut self, depth: Depth) -> Self {
        self.min_gossip_depth = depth;
        self
    }

    /// Consult the transport for a stop signal once every `interval` polls (at least 1)
    pub fn with_signal_poll_interval(mut self, interval: u32) -> Self {
        self.signal_poll_interval = interval.max(1);
        self
    }

    /// Set how long a blocking collective waits before a peer is considered lost
    pub fn with_collective_timeout(mut self, timeout: Duration) -> Self {
        self.collective_timeout = timeout;
        self
    }

    /// Warn after this many consecutive flushes are skipped on one in-flight round
    pub fn with_stall_warning_after(mut self, flushes: u32) -> Self {
        self.stall_warning_after = flushes;
        self
    }

    /// Check the invariants between capacity, threshold and thread count
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(ClusterError::InvalidConfig(
                "cache_capacity must be >= 1".into(),
            ));
        }
        if self.flush_threshold == 0 || self.flush_threshold > self.cache_capacity {
            return Err(ClusterError::InvalidConfig(format!(
                "flush_threshold {} must be in 1..={}",
                self.flush_threshold, self.cache_capacity
            )));
        }
        if self.threads_per_rank == 0 {
            return Err(ClusterError::InvalidConfig(
                "threads_per_rank must be >= 1".into(),
            ));
        }
        Ok(())
    }
}
