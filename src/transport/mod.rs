//! Transport runtime: rank enumeration and message passing between ranks.
//!
//! Non-blocking operations follow a post/poll shape: posting returns an opaque
//! [`Request`], and testing the request yields [`Poll::Pending`] until the
//! operation completes. Collectives (`gather`, `all_reduce_sum`, `barrier`)
//! block and are only used at episode boundaries and shutdown.
//!
//! A gossip batch is an array of at most `cache_capacity` records, the
//! capacity every rank is configured with. Only the filled prefix travels;
//! receivers append what arrives and never assume a full batch.
//!
//! Two implementations are provided:
//! - [`LocalTransport`]: a single rank; every operation completes locally.
//! - [`MeshTransport`]: N ranks inside one process, connected only through
//!   channels. Used by the driver and the multi-rank tests.

pub mod local;
pub mod mesh;

pub use local::LocalTransport;
pub use mesh::{MeshTransport, create_mesh};

use crate::cluster::decision::Candidate;
use crate::cluster::topology::RankTopology;
use crate::error::Result;
use crate::tt::KeyedEntry;
use std::fmt;

/// Rank that owns I/O, time management and the final decision.
pub const ROOT: usize = 0;

/// Completion state of a posted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll<T> {
    Pending,
    Ready(T),
}

impl<T> Poll<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Poll::Ready(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Poll::Pending)
    }
}

/// Handle for a posted non-blocking send or receive.
///
/// The tag is the gossip round for gossip traffic and the episode for stop
/// signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Request {
    tag: u64,
}

impl Request {
    pub fn new(tag: u64) -> Self {
        Self { tag }
    }

    pub fn tag(&self) -> u64 {
        self.tag
    }
}

/// Message-passing substrate shared by all threads of one rank.
///
/// Collectives must be entered by every rank in the same order, from a single
/// thread per rank.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Join the cluster. Calling it again while joined is a no-op.
    fn init(&self) -> Result<RankTopology>;

    /// Leave the cluster. Fails with `NotInitialized` if `init` never succeeded.
    fn finalize(&self) -> Result<()>;

    /// Rank id and cluster size; only valid between `init` and `finalize`.
    fn topology(&self) -> Result<RankTopology>;

    /// Post a receive for every peer's batch of `round`.
    fn post_gossip_recv(&self, round: u64) -> Request;

    /// Post a send of `batch` to every peer as this rank's share of `round`.
    /// `batch` never exceeds the configured cache capacity.
    fn post_gossip_send(&self, round: u64, batch: &[KeyedEntry]) -> Request;

    /// Complete when all peers' batches for the round have arrived; they are
    /// appended to `into` in rank order.
    fn test_gossip_recv(&self, request: &Request, into: &mut Vec<KeyedEntry>) -> Poll<()>;

    fn test_gossip_send(&self, request: &Request) -> Poll<()>;

    /// Post a receive for the stop signal of `episode`.
    fn post_stop_recv(&self, episode: u64) -> Request;

    fn test_stop_recv(&self, request: &Request) -> Poll<()>;

    /// Fan the stop signal of `episode` out to every peer. Best-effort.
    fn send_stop(&self, episode: u64);

    /// Collect every rank's candidate on the root. Returns `Some` on the root
    /// only.
    fn gather(&self, candidate: Candidate) -> Result<Option<Vec<Candidate>>>;

    /// Cluster-wide sum of `value`, returned on every rank.
    fn all_reduce_sum(&self, value: u64) -> Result<u64>;

    fn barrier(&self) -> Result<()>;
}
