//! Cluster layer for a lazy-SMP style game-tree search.
//!
//! Independent search processes ("ranks") share high-depth transposition
//! table entries by gossip, stop together when the root says so, and agree on
//! a single best move at the end of each search episode.

pub mod cluster;
pub mod error;
pub mod search;
pub mod transport;
pub mod tt;

pub use cluster::{Cluster, ClusterConfig};
pub use error::{ClusterError, Result};
