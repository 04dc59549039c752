//! Rank topology and the join/leave lifecycle of a transport.

use crate::error::{ClusterError, Result};
use crate::transport::ROOT;
use std::sync::atomic::{AtomicU8, Ordering};

/// Which rank this process is and how many there are. Fixed for the lifetime
/// of the membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RankTopology {
    rank: usize,
    size: usize,
}

impl RankTopology {
    pub fn new(rank: usize, size: usize) -> Result<Self> {
        if rank >= size {
            return Err(ClusterError::InvalidRank { rank, size });
        }
        Ok(Self { rank, size })
    }

    /// The degenerate single-process topology.
    pub fn single() -> Self {
        Self { rank: ROOT, size: 1 }
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.rank == ROOT
    }

    /// Split `0..total` into `size` contiguous parts and return this rank's.
    pub fn partition(&self, total: usize) -> std::ops::Range<usize> {
        let base = total / self.size;
        let extra = total % self.size;
        let start = self.rank * base + self.rank.min(extra);
        let len = base + usize::from(self.rank < extra);
        start..start + len
    }
}

const UNJOINED: u8 = 0;
const ACTIVE: u8 = 1;
const LEFT: u8 = 2;

/// Join/leave state of one transport endpoint.
///
/// `join` and `leave` are each idempotent. Leaving without ever joining is an
/// error, and so is joining again after leaving.
#[derive(Debug, Default)]
pub struct Membership {
    state: AtomicU8,
}

impl Membership {
    pub fn join(&self) -> Result<()> {
        match self
            .state
            .compare_exchange(UNJOINED, ACTIVE, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) | Err(ACTIVE) => Ok(()),
            Err(_) => Err(ClusterError::AlreadyFinalized),
        }
    }

    pub fn leave(&self) -> Result<()> {
        match self
            .state
            .compare_exchange(ACTIVE, LEFT, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) | Err(LEFT) => Ok(()),
            Err(_) => Err(ClusterError::NotInitialized),
        }
    }

    pub fn ensure_active(&self) -> Result<()> {
        match self.state.load(Ordering::Acquire) {
            ACTIVE => Ok(()),
            LEFT => Err(ClusterError::AlreadyFinalized),
            _ => Err(ClusterError::NotInitialized),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.load(Ordering::Acquire) == ACTIVE
    }
}
