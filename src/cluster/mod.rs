//! Distributed-memory coordination for a lazy-SMP style search.
//!
//! Every rank searches the same problem independently. High-depth table
//! entries are cached per worker thread and gossiped to every other rank,
//! where they are offered to the local table. The root owns I/O and time
//! management: it alone originates the stop signal, and at the end of an
//! episode it collects every rank's best move and picks the cluster winner.
//!
//! # Architecture
//!
//! - [`cache::EntryBuffer`]: one per worker thread, keeps the deepest entries
//! - [`gossip::GossipExchanger`]: one per rank, double-buffered all-to-all
//! - [`signals::SignalBroadcaster`]: root-to-all stop flag
//! - [`decision`]: episode-end best-move selection
//! - [`stats`]: per-rank counters and their cluster-wide sums
//!
//! With a single-rank transport every operation degrades to its local
//! equivalent: `save` is a table write, `pick_moves` keeps the local result,
//! and reductions return the local count.
//!
//! # Example
//!
//! ```ignore
//! use ttcluster::cluster::{Cluster, ClusterConfig};
//!
//! let cluster = Cluster::init(ClusterConfig::default(), transport, table)?;
//! cluster.signals_init(1);
//! let mut cache = cluster.new_cache();
//! cluster.save(&mut cache, key, entry);
//! if cluster.signals_poll() { /* unwind the search */ }
//! cluster.pick_moves(&mut best, &mut pv)?;
//! ```

pub mod cache;
pub mod config;
pub mod decision;
pub mod gossip;
pub mod signals;
pub mod stats;
pub mod topology;

pub use cache::{EntryBuffer, Offer};
pub use config::ClusterConfig;
pub use decision::{Candidate, MoveInfo};
pub use gossip::{GossipExchanger, GossipSnapshot, Step};
pub use signals::SignalBroadcaster;
pub use stats::{ClusterTotals, Counter, RankCounters};
pub use topology::RankTopology;

use crate::error::Result;
use crate::transport::Transport;
use crate::tt::{Depth, Key, KeyedEntry, TranspositionTable, TtEntry};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// One rank's view of the cluster, shared by all of its search threads.
pub struct Cluster {
    config: ClusterConfig,
    topology: RankTopology,
    transport: Arc<dyn Transport>,
    table: Arc<dyn TranspositionTable>,
    gossip: GossipExchanger,
    signals: SignalBroadcaster,
    counters: RankCounters,
}

impl Cluster {
    /// Join the cluster and wait at the startup barrier for every other rank.
    pub fn init(
        config: ClusterConfig,
        transport: Arc<dyn Transport>,
        table: Arc<dyn TranspositionTable>,
    ) -> Result<Self> {
        config.validate()?;
        let topology = transport.init()?;
        transport.barrier()?;

        info!(
            rank = topology.rank(),
            size = topology.size(),
            threads = config.threads_per_rank,
            "cluster initialized"
        );

        Ok(Self {
            gossip: GossipExchanger::new(
                topology.rank(),
                config.cache_capacity,
                config.stall_warning_after,
            ),
            signals: SignalBroadcaster::new(topology, config.signal_poll_interval),
            counters: RankCounters::default(),
            config,
            topology,
            transport,
            table,
        })
    }

    pub fn rank(&self) -> usize {
        self.topology.rank()
    }

    pub fn size(&self) -> usize {
        self.topology.size()
    }

    pub fn is_root(&self) -> bool {
        self.topology.is_root()
    }

    pub fn topology(&self) -> RankTopology {
        self.topology
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn table(&self) -> &dyn TranspositionTable {
        self.table.as_ref()
    }

    pub fn counters(&self) -> &RankCounters {
        &self.counters
    }

    pub fn gossip_stats(&self) -> GossipSnapshot {
        self.gossip.stats()
    }

    /// A fresh entry cache for one worker thread.
    pub fn new_cache(&self) -> EntryBuffer {
        EntryBuffer::new(self.config.cache_capacity, self.config.flush_threshold)
    }

    /// Store an entry in the local table and, if deep enough, queue it for
    /// gossip through the calling worker's cache. Returns whether the local
    /// table kept the entry.
    pub fn save(&self, cache: &mut EntryBuffer, key: Key, entry: TtEntry) -> bool {
        let kept = self.table.save(key, entry);
        if entry.depth >= self.config.min_gossip_depth {
            cache.replace(KeyedEntry::new(key, entry));
            self.send_recv(cache);
        }
        kept
    }

    /// Drive the gossip exchange one step for the worker owning `cache`.
    pub fn send_recv(&self, cache: &mut EntryBuffer) -> Step {
        self.gossip
            .send_recv(self.transport.as_ref(), cache, self.table.as_ref())
    }

    /// Begin a search episode: clear the stop flag and post the stop receive.
    pub fn signals_init(&self, episode: u64) {
        self.signals.signals_init(self.transport.as_ref(), episode);
    }

    #[inline]
    pub fn signals_poll(&self) -> bool {
        self.signals.signals_poll(self.transport.as_ref())
    }

    /// Stop every rank. Root only.
    pub fn broadcast_stop(&self) -> Result<()> {
        self.signals.broadcast_stop(self.transport.as_ref())
    }

    pub fn is_stopped(&self) -> bool {
        self.signals.is_stopped()
    }

    pub fn episode(&self) -> u64 {
        self.signals.episode()
    }

    /// Resolve the cluster-wide best move. On the root, `info` and `pv` are
    /// replaced by the winner's; other ranks keep their own.
    pub fn pick_moves(&self, info: &mut decision::MoveInfo, pv: &mut String) -> Result<()> {
        decision::pick_moves(
            self.transport.as_ref(),
            &self.topology,
            self.signals.episode(),
            info,
            pv,
        )
    }

    pub fn nodes_searched(&self) -> Result<u64> {
        stats::reduce(
            self.transport.as_ref(),
            Counter::NodesSearched,
            self.counters.nodes(),
        )
    }

    pub fn tb_hits(&self) -> Result<u64> {
        stats::reduce(self.transport.as_ref(), Counter::TbHits, self.counters.tb_hits())
    }

    #[allow(non_snake_case)]
    pub fn TT_saves(&self) -> Result<u64> {
        self.tt_saves()
    }

    pub fn tt_saves(&self) -> Result<u64> {
        stats::reduce(
            self.transport.as_ref(),
            Counter::TtSaves,
            self.gossip.stats().entries_kept,
        )
    }

    /// All three reductions, in a fixed order every rank must follow.
    pub fn totals(&self, elapsed: Duration) -> Result<ClusterTotals> {
        Ok(ClusterTotals {
            ranks: self.size(),
            nodes_searched: self.nodes_searched()?,
            tb_hits: self.tb_hits()?,
            tt_saves: self.tt_saves()?,
            elapsed,
        })
    }

    /// Root-side progress line built from local counters. Never blocks.
    pub fn cluster_info(&self, depth: Depth) -> Option<String> {
        if !self.is_root() {
            return None;
        }
        let gossip = self.gossip.stats();
        Some(format!(
            "info depth {} cluster ranks {} local nodes {} gossip rounds {} merged {} kept {} skipped {}",
            depth,
            self.size(),
            self.counters.nodes(),
            gossip.rounds_completed,
            gossip.entries_merged,
            gossip.entries_kept,
            gossip.flushes_skipped,
        ))
    }

    /// Shutdown barrier.
    pub fn sync(&self) -> Result<()> {
        self.transport.barrier()
    }

    /// Leave the cluster. Call after `sync` on every rank.
    pub fn finalize(&self) -> Result<()> {
        self.transport.finalize()?;
        info!(rank = self.rank(), "cluster finalized");
        Ok(())
    }
}
