//! Search lines and per-episode reports

use crate::cluster::{ClusterTotals, GossipSnapshot, MoveInfo};
use crate::search::format_move;
use crate::tt::{Depth, Move, Value};
use std::cmp::Ordering;

/// Best line from one completed iteration of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub mv: Move,
    pub ponder: Move,
    pub depth: Depth,
    pub score: Value,
    pub pv: String,
}

impl Line {
    pub fn new(mv: Move, ponder: Move, depth: Depth, score: Value) -> Self {
        Self {
            mv,
            ponder,
            depth,
            score,
            pv: format!("{} {}", format_move(mv), format_move(ponder)),
        }
    }

    /// Deeper iterations win, then higher scores.
    pub fn compare(&self, other: &Self) -> Ordering {
        self.depth
            .cmp(&other.depth)
            .then_with(|| self.score.cmp(&other.score))
    }

    pub fn to_move_info(&self) -> MoveInfo {
        MoveInfo {
            mv: self.mv,
            ponder: self.ponder,
            depth: self.depth,
            score: self.score,
            ..Default::default()
        }
    }
}

/// What one rank knows at the end of an episode.
///
/// On the root `best` and `pv` are the cluster-wide decision; elsewhere they
/// are the rank's own result.
#[derive(Debug, Clone)]
pub struct EpisodeReport {
    pub rank: usize,
    pub episode: u64,
    pub best: MoveInfo,
    pub pv: String,
    /// Deepest iteration completed by any worker on this rank
    pub depth_reached: Depth,
    pub totals: ClusterTotals,
    pub gossip: GossipSnapshot,
}

impl EpisodeReport {
    pub fn bestmove(&self) -> String {
        format!(
            "bestmove {} ponder {}",
            format_move(self.best.mv),
            format_move(self.best.ponder)
        )
    }

    /// Format the report as a human-readable string
    pub fn format_summary(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("Episode: {}\n", self.episode));
        s.push_str(&format!(
            "Best: {} (score {}, depth {}, rank {})\n",
            format_move(self.best.mv),
            self.best.score,
            self.best.depth,
            self.best.rank
        ));
        s.push_str(&format!("PV: {}\n", self.pv));
        s.push_str(&self.totals.format_summary());
        s.push_str(&format!(
            "Gossip rounds: {} posted, {} completed, {} flushes skipped\n",
            self.gossip.rounds_posted, self.gossip.rounds_completed, self.gossip.flushes_skipped
        ));
        s.push_str(&format!(
            "Gossip entries: {} sent, {} merged, {} kept\n",
            self.gossip.entries_sent, self.gossip.entries_merged, self.gossip.entries_kept
        ));
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_compare() {
        let shallow = Line::new(1, 2, 5, 300);
        let deep = Line::new(3, 4, 6, -20);
        let deep_better = Line::new(5, 6, 6, 10);
        assert_eq!(deep.compare(&shallow), Ordering::Greater);
        assert_eq!(deep_better.compare(&deep), Ordering::Greater);
        assert_eq!(deep.compare(&deep.clone()), Ordering::Equal);
    }

    #[test]
    fn test_line_pv_text() {
        let line = Line::new((12 << 6) | 28, (52 << 6) | 36, 7, 15);
        assert_eq!(line.pv, "e2e4 e7e5");
        let info = line.to_move_info();
        assert_eq!(info.depth, 7);
        assert_eq!(info.score, 15);
    }
}
