//! Configuration for the synthetic search episode

use crate::error::{ClusterError, Result};
use crate::tt::Depth;
use std::time::Duration;

/// Limits and shape of one search episode.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Wall-clock budget, enforced by the root
    pub time_limit: Option<Duration>,
    /// Node budget on the root's own counters
    pub node_limit: Option<u64>,
    /// Last iteration each worker searches
    pub max_depth: Depth,
    /// Seed for worker RNGs (None = seed from the OS)
    pub base_seed: Option<u64>,
    /// Number of distinct positions the synthetic tree draws from
    pub key_space: u64,
    /// Nodes visited per ply of iteration depth
    pub nodes_per_depth: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            time_limit: Some(Duration::from_secs(1)),
            node_limit: None,
            max_depth: 16,
            base_seed: None,
            key_space: 1 << 16,
            nodes_per_depth: 512,
        }
    }
}

impl SearchConfig {
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_time_limit_option(mut self, limit: Option<Duration>) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn with_node_limit(mut self, nodes: u64) -> Self {
        self.node_limit = Some(nodes);
        self
    }

    pub fn with_node_limit_option(mut self, nodes: Option<u64>) -> Self {
        self.node_limit = nodes;
        self
    }

    pub fn with_max_depth(mut self, depth: Depth) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.base_seed = Some(seed);
        self
    }

    pub fn with_seed_option(mut self, seed: Option<u64>) -> Self {
        self.base_seed = seed;
        self
    }

    pub fn with_key_space(mut self, keys: u64) -> Self {
        self.key_space = keys;
        self
    }

    pub fn with_nodes_per_depth(mut self, nodes: u64) -> Self {
        self.nodes_per_depth = nodes;
        self
    }

    /// Seed for one worker, unique across the whole cluster.
    pub fn worker_seed(&self, rank: usize, threads_per_rank: usize, worker_id: usize) -> Option<u64> {
        self.base_seed
            .map(|s| s.wrapping_add((rank * threads_per_rank + worker_id) as u64))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_depth < 1 {
            return Err(ClusterError::InvalidConfig(format!(
                "max_depth must be at least 1, got {}",
                self.max_depth
            )));
        }
        if self.key_space == 0 {
            return Err(ClusterError::InvalidConfig(
                "key_space must be non-zero".to_string(),
            ));
        }
        if self.nodes_per_depth == 0 {
            return Err(ClusterError::InvalidConfig(
                "nodes_per_depth must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
