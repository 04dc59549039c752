//! Search subsystem seam.
//!
//! The cluster layer never looks inside a search. A [`SearchWorker`] runs one
//! iterative-deepening iteration at a time on one thread, writes table entries
//! through [`Cluster::save`], polls [`Cluster::signals_poll`] from its hot loop
//! and reports its best [`Line`] when an iteration completes.
//!
//! [`SyntheticSearch`] stands in for a real engine; the [`driver`] runs one
//! episode over a simulated cluster of ranks.

pub mod config;
pub mod driver;
pub mod report;
pub mod synthetic;

pub use config::SearchConfig;
pub use driver::{connect, run_cluster, run_rank};
pub use report::{EpisodeReport, Line};
pub use synthetic::SyntheticSearch;

use crate::cluster::{Cluster, EntryBuffer};
use crate::tt::{Depth, MOVE_NONE, Move};

/// One search thread.
pub trait SearchWorker: Send {
    /// Search one iteration at `depth`. Returns `None` if the stop signal
    /// arrived before the iteration completed.
    fn search_depth(
        &mut self,
        depth: Depth,
        cluster: &Cluster,
        cache: &mut EntryBuffer,
    ) -> Option<Line>;
}

/// Coordinate notation for a packed move: 6 bits `from`, 6 bits `to`.
pub fn format_move(mv: Move) -> String {
    if mv == MOVE_NONE {
        return "0000".to_string();
    }
    let square = |sq: u16| {
        let file = (b'a' + (sq % 8) as u8) as char;
        let rank = (b'1' + (sq / 8) as u8) as char;
        format!("{file}{rank}")
    };
    format!("{}{}", square((mv >> 6) & 63), square(mv & 63))
}
