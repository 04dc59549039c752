//! Single-process transport.
//!
//! Size is always 1 and rank always 0, so gossip rounds complete immediately
//! with nothing received, collectives return the local value, and no stop
//! signal ever arrives from elsewhere.

use crate::cluster::decision::Candidate;
use crate::cluster::topology::{Membership, RankTopology};
use crate::error::Result;
use crate::transport::{Poll, Request, Transport};
use crate::tt::KeyedEntry;

#[derive(Debug, Default)]
pub struct LocalTransport {
    membership: Membership,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for LocalTransport {
    fn init(&self) -> Result<RankTopology> {
        self.membership.join()?;
        Ok(RankTopology::single())
    }

    fn finalize(&self) -> Result<()> {
        self.membership.leave()
    }

    fn topology(&self) -> Result<RankTopology> {
        self.membership.ensure_active()?;
        Ok(RankTopology::single())
    }

    fn post_gossip_recv(&self, round: u64) -> Request {
        Request::new(round)
    }

    fn post_gossip_send(&self, round: u64, _batch: &[KeyedEntry]) -> Request {
        Request::new(round)
    }

    fn test_gossip_recv(&self, _request: &Request, _into: &mut Vec<KeyedEntry>) -> Poll<()> {
        Poll::Ready(())
    }

    fn test_gossip_send(&self, _request: &Request) -> Poll<()> {
        Poll::Ready(())
    }

    fn post_stop_recv(&self, episode: u64) -> Request {
        Request::new(episode)
    }

    fn test_stop_recv(&self, _request: &Request) -> Poll<()> {
        Poll::Pending
    }

    fn send_stop(&self, _episode: u64) {}

    fn gather(&self, candidate: Candidate) -> Result<Option<Vec<Candidate>>> {
        self.membership.ensure_active()?;
        Ok(Some(vec![candidate]))
    }

    fn all_reduce_sum(&self, value: u64) -> Result<u64> {
        self.membership.ensure_active()?;
        Ok(value)
    }

    fn barrier(&self) -> Result<()> {
        self.membership.ensure_active()
    }
}
