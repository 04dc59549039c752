//! Error types for the cluster layer.
//!
//! Only topology and collective failures are errors. A send or receive that
//! has not completed yet is `Poll::Pending`, and a full entry cache rejecting
//! an offer is `Offer::Rejected`; neither ever shows up here.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClusterError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error("invalid cluster config: {0}")]
    InvalidConfig(String),
    #[error("cluster membership is not initialized")]
    NotInitialized,
    #[error("cluster membership was already finalized")]
    AlreadyFinalized,
    #[error("operation `{0}` may only be performed by the root rank")]
    NotRoot(&'static str),
    #[error("rank {rank} is unreachable")]
    PeerUnreachable { rank: usize },
    #[error("collective `{op}` did not complete within {waited:?}")]
    CollectiveTimeout { op: &'static str, waited: Duration },
    #[error("rank {rank} reported episode {found}, expected {expected}")]
    RoundMismatch {
        expected: u64,
        found: u64,
        rank: usize,
    },
    #[error("rank {rank} is outside a cluster of size {size}")]
    InvalidRank { rank: usize, size: usize },
}

impl ClusterError {
    /// Whether the whole run must terminate. Nothing in this crate recovers
    /// from a fatal error in place; rank loss during a collective ends the run.
    pub fn is_fatal(&self) -> bool {
        match self {
            ClusterError::InvalidConfig(_) | ClusterError::NotRoot(_) => false,
            ClusterError::NotInitialized
            | ClusterError::AlreadyFinalized
            | ClusterError::PeerUnreachable { .. }
            | ClusterError::CollectiveTimeout { .. }
            | ClusterError::RoundMismatch { .. }
            | ClusterError::InvalidRank { .. } => true,
        }
    }
}
