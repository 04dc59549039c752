//! Episode-end selection of the cluster-wide best move.
//!
//! Every rank submits its locally best [`MoveInfo`] together with the
//! principal variation text that produced it. The root orders candidates by
//! score, then depth, then lowest rank, so the winner does not depend on the
//! order in which candidates arrive.

use crate::cluster::topology::RankTopology;
use crate::error::{ClusterError, Result};
use crate::transport::Transport;
use crate::tt::{Depth, MOVE_NONE, Move, Value};
use std::cmp::Ordering;
use tracing::info;

/// One rank's best result for an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MoveInfo {
    pub mv: Move,
    /// Expected reply, `MOVE_NONE` if unknown.
    pub ponder: Move,
    pub depth: Depth,
    pub score: Value,
    /// Rank that computed this result.
    pub rank: usize,
    /// Episode the result belongs to.
    pub episode: u64,
}

impl MoveInfo {
    pub fn new(mv: Move, ponder: Move, depth: Depth, score: Value, rank: usize, episode: u64) -> Self {
        Self {
            mv,
            ponder,
            depth,
            score,
            rank,
            episode,
        }
    }

    pub fn has_move(&self) -> bool {
        self.mv != MOVE_NONE
    }

    /// Total order used to pick the winner; the better result is `Greater`.
    pub fn rank_against(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| self.depth.cmp(&other.depth))
            .then_with(|| other.rank.cmp(&self.rank))
    }
}

/// A rank's submission: its best move and the trace that justifies it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Candidate {
    pub info: MoveInfo,
    pub pv: String,
}

impl Candidate {
    pub fn new(info: MoveInfo, pv: impl Into<String>) -> Self {
        Self {
            info,
            pv: pv.into(),
        }
    }
}

/// The best candidate under [`MoveInfo::rank_against`]. A rank that never
/// completed an iteration submits no move; such candidates only win when no
/// rank has a move.
pub fn select_winner(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates.iter().max_by(|a, b| {
        a.info
            .has_move()
            .cmp(&b.info.has_move())
            .then_with(|| a.info.rank_against(&b.info))
    })
}

/// Gather every rank's candidate on the root and replace `info` and `pv`
/// there with the winner's. Other ranks keep their own values.
///
/// Blocking; call once per episode after all ranks have stopped.
pub fn pick_moves(
    transport: &dyn Transport,
    topology: &RankTopology,
    episode: u64,
    info: &mut MoveInfo,
    pv: &mut String,
) -> Result<()> {
    info.rank = topology.rank();
    info.episode = episode;

    let Some(candidates) = transport.gather(Candidate::new(*info, pv.clone()))? else {
        return Ok(());
    };

    if let Some(stale) = candidates.iter().find(|c| c.info.episode != episode) {
        return Err(ClusterError::RoundMismatch {
            expected: episode,
            found: stale.info.episode,
            rank: stale.info.rank,
        });
    }

    if let Some(winner) = select_winner(&candidates) {
        info!(
            episode,
            winner = winner.info.rank,
            score = winner.info.score,
            depth = winner.info.depth,
            candidates = candidates.len(),
            "cluster best move selected"
        );
        *info = winner.info;
        pv.clone_from(&winner.pv);
    }
    Ok(())
}
