//! Per-rank counters and their cluster-wide sums.
//!
//! Counters are bumped from the search hot path with relaxed atomics. The
//! reduction is a blocking collective and is only used for reporting.

use crate::error::Result;
use crate::transport::Transport;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Named per-rank counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    NodesSearched,
    TbHits,
    /// Remote entries stored into the local table by gossip.
    TtSaves,
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Counter::NodesSearched => write!(f, "nodes_searched"),
            Counter::TbHits => write!(f, "tb_hits"),
            Counter::TtSaves => write!(f, "tt_saves"),
        }
    }
}

/// Work counters of the search threads on one rank.
#[derive(Debug, Default)]
pub struct RankCounters {
    nodes: AtomicU64,
    tb_hits: AtomicU64,
}

impl RankCounters {
    #[inline]
    pub fn add_nodes(&self, n: u64) {
        self.nodes.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_tb_hits(&self, n: u64) {
        self.tb_hits.fetch_add(n, Ordering::Relaxed);
    }

    pub fn nodes(&self) -> u64 {
        self.nodes.load(Ordering::Relaxed)
    }

    pub fn tb_hits(&self) -> u64 {
        self.tb_hits.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.nodes.store(0, Ordering::Relaxed);
        self.tb_hits.store(0, Ordering::Relaxed);
    }
}

/// Sum `local` over all ranks.
pub fn reduce(transport: &dyn Transport, counter: Counter, local: u64) -> Result<u64> {
    let total = transport.all_reduce_sum(local)?;
    debug!(%counter, local, total, "counter reduced");
    Ok(total)
}

/// Cluster-wide totals for one episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterTotals {
    pub ranks: usize,
    pub nodes_searched: u64,
    pub tb_hits: u64,
    pub tt_saves: u64,
    pub elapsed: Duration,
}

impl ClusterTotals {
    /// Nodes per second over the whole cluster.
    pub fn nps(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            0
        } else {
            (self.nodes_searched as f64 / secs) as u64
        }
    }

    pub fn format_summary(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("Ranks: {}\n", self.ranks));
        s.push_str(&format!("Time: {:.2?}\n", self.elapsed));
        s.push_str(&format!("Nodes searched: {}\n", self.nodes_searched));
        s.push_str(&format!("Nodes/sec: {}\n", self.nps()));
        s.push_str(&format!("Tablebase hits: {}\n", self.tb_hits));
        s.push_str(&format!("Remote TT saves: {}\n", self.tt_saves));
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{LocalTransport, create_mesh};
    use std::thread;

    #[test]
    fn test_counters_accumulate() {
        let counters = RankCounters::default();
        counters.add_nodes(10);
        counters.add_nodes(5);
        counters.add_tb_hits(2);
        assert_eq!(counters.nodes(), 15);
        assert_eq!(counters.tb_hits(), 2);

        counters.reset();
        assert_eq!(counters.nodes(), 0);
    }

    #[test]
    fn test_single_rank_reduce_is_identity() {
        let transport = LocalTransport::new();
        transport.init().unwrap();
        assert_eq!(reduce(&transport, Counter::NodesSearched, 123).unwrap(), 123);
    }

    #[test]
    fn test_reduce_sums_all_ranks() {
        let per_rank = [100u64, 250, 75];
        let handles: Vec<_> = create_mesh(3)
            .into_iter()
            .map(|transport| {
                thread::spawn(move || {
                    let rank = transport.init().unwrap().rank();
                    reduce(&transport, Counter::NodesSearched, per_rank[rank]).unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 425);
        }
    }

    #[test]
    fn test_totals_nps() {
        let totals = ClusterTotals {
            ranks: 2,
            nodes_searched: 10_000,
            elapsed: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(totals.nps(), 1000);
        assert_eq!(ClusterTotals::default().nps(), 0);
        assert!(totals.format_summary().contains("Nodes searched: 10000"));
    }
}
