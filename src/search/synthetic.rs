//! Synthetic search used to exercise the cluster layer without an engine.
//!
//! Each iteration visits `nodes_per_depth * depth` pseudo-random positions.
//! A table hit at sufficient draft is reused as a cutoff; otherwise a new
//! entry is written through the cluster. Remote entries merged by gossip
//! therefore show up as cutoffs on every rank, which is the effect the
//! cluster layer exists to provide.

use crate::cluster::{Cluster, EntryBuffer};
use crate::search::config::SearchConfig;
use crate::search::report::Line;
use crate::search::SearchWorker;
use crate::tt::{Bound, Depth, Move, TtEntry, Value};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Nodes between stop-signal polls and counter flushes.
const POLL_EVERY: u64 = 64;

/// Probability of a simulated tablebase probe hit.
const TB_HIT_RATE: f64 = 0.002;

const SCORE_RANGE: Value = 400;

pub struct SyntheticSearch {
    rng: ChaCha8Rng,
    key_space: u64,
    nodes_per_depth: u64,
    cutoffs: u64,
}

impl SyntheticSearch {
    pub fn new(seed: Option<u64>, config: &SearchConfig) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_os_rng(),
        };
        Self {
            rng,
            key_space: config.key_space.max(1),
            nodes_per_depth: config.nodes_per_depth.max(1),
            cutoffs: 0,
        }
    }

    /// Table hits reused instead of searched.
    pub fn cutoffs(&self) -> u64 {
        self.cutoffs
    }

    fn random_move(&mut self) -> Move {
        self.rng.random_range(1..4096)
    }

    fn random_bound(&mut self) -> Bound {
        match self.rng.random_range(0..3) {
            0 => Bound::Upper,
            1 => Bound::Lower,
            _ => Bound::Exact,
        }
    }
}

impl SearchWorker for SyntheticSearch {
    fn search_depth(
        &mut self,
        depth: Depth,
        cluster: &Cluster,
        cache: &mut EntryBuffer,
    ) -> Option<Line> {
        let depth = depth.max(1);
        let mut best = Line::new(self.random_move(), self.random_move(), depth, -SCORE_RANGE);
        let nodes = self.nodes_per_depth * depth as u64;
        let mut unreported = 0u64;

        for n in 0..nodes {
            if n % POLL_EVERY == 0 {
                cluster.counters().add_nodes(unreported);
                unreported = 0;
                if cluster.signals_poll() {
                    return None;
                }
            }
            unreported += 1;

            let key = self.rng.random_range(0..self.key_space);
            let draft = depth - self.rng.random_range(0..depth);

            if let Some(hit) = cluster.table().probe(key)
                && hit.depth >= draft
            {
                self.cutoffs += 1;
                if hit.depth >= depth && hit.bound == Bound::Exact && hit.value > best.score {
                    best = Line::new(hit.mv, self.random_move(), depth, hit.value);
                }
                continue;
            }

            if self.rng.random_bool(TB_HIT_RATE) {
                cluster.counters().add_tb_hits(1);
            }

            let bound = self.random_bound();
            let mv = self.random_move();
            let value = self.rng.random_range(-SCORE_RANGE..=SCORE_RANGE);
            let entry = TtEntry::new(bound, draft, value, bound == Bound::Exact, mv, value);
            cluster.save(cache, key, entry);

            if draft == depth && bound == Bound::Exact && value > best.score {
                best = Line::new(mv, self.random_move(), depth, value);
            }
        }
        cluster.counters().add_nodes(unreported);

        // Iteration boundary: let an in-flight gossip round finish
        cluster.send_recv(cache);
        Some(best)
    }
}
