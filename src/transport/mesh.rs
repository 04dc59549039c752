//! In-process multi-rank transport.
//!
//! Each rank owns one inbound channel and a sender to every rank. Ranks share
//! no state other than those channels, so a mesh behaves like N separate
//! processes exchanging messages. Arrived messages are sorted into a
//! per-rank mailbox by whichever thread happens to drain the inbox.

use crate::cluster::decision::Candidate;
use crate::cluster::topology::{Membership, RankTopology};
use crate::error::{ClusterError, Result};
use crate::transport::{Poll, ROOT, Request, Transport};
use crate::tt::KeyedEntry;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const DEFAULT_COLLECTIVE_TIMEOUT: Duration = Duration::from_secs(30);
const WAIT_SLICE: Duration = Duration::from_millis(5);

/// Message on the wire between two ranks.
#[derive(Debug, Clone)]
enum Envelope {
    /// One rank's batch for a gossip round.
    Gossip {
        round: u64,
        from: usize,
        entries: Vec<KeyedEntry>,
    },
    /// Stop signal for an episode, only ever sent by the root.
    Stop { episode: u64 },
    Gather {
        seq: u64,
        candidate: Candidate,
    },
    Reduce {
        seq: u64,
        value: u64,
    },
    Barrier {
        seq: u64,
    },
}

#[derive(Debug, Default)]
struct Mailbox {
    gossip: BTreeMap<u64, Vec<(usize, Vec<KeyedEntry>)>>,
    stops: BTreeSet<u64>,
    gathered: HashMap<u64, Vec<Candidate>>,
    reduced: HashMap<u64, Vec<u64>>,
    barriers: HashMap<u64, usize>,
}

impl Mailbox {
    fn accept(&mut self, envelope: Envelope) {
        match envelope {
            Envelope::Gossip {
                round,
                from,
                entries,
            } => self.gossip.entry(round).or_default().push((from, entries)),
            Envelope::Stop { episode } => {
                self.stops.insert(episode);
            }
            Envelope::Gather { seq, candidate } => {
                self.gathered.entry(seq).or_default().push(candidate)
            }
            Envelope::Reduce { seq, value } => self.reduced.entry(seq).or_default().push(value),
            Envelope::Barrier { seq } => *self.barriers.entry(seq).or_default() += 1,
        }
    }
}

/// One rank's endpoint of an in-process mesh.
#[derive(Debug)]
pub struct MeshTransport {
    rank: usize,
    size: usize,
    peers: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    mailbox: Mutex<Mailbox>,
    membership: Membership,
    collective_seq: AtomicU64,
    collective_timeout: Duration,
}

/// Create `size` connected endpoints; endpoint `i` is rank `i`.
pub fn create_mesh(size: usize) -> Vec<MeshTransport> {
    let size = size.max(1);
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();

    receivers
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| MeshTransport {
            rank,
            size,
            peers: senders.clone(),
            inbox,
            mailbox: Mutex::new(Mailbox::default()),
            membership: Membership::default(),
            collective_seq: AtomicU64::new(0),
            collective_timeout: DEFAULT_COLLECTIVE_TIMEOUT,
        })
        .collect()
}

impl MeshTransport {
    /// Bound on how long a blocking collective waits for missing peers.
    pub fn with_collective_timeout(mut self, timeout: Duration) -> Self {
        self.collective_timeout = timeout;
        self
    }

    fn drain_inbox(&self, mailbox: &mut Mailbox) {
        while let Ok(envelope) = self.inbox.try_recv() {
            mailbox.accept(envelope);
        }
    }

    fn other_ranks(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.size).filter(move |&r| r != self.rank)
    }

    fn send_to(&self, rank: usize, envelope: Envelope) -> Result<()> {
        self.peers[rank]
            .send(envelope)
            .map_err(|_| ClusterError::PeerUnreachable { rank })
    }

    fn broadcast(&self, envelope: Envelope) -> Result<()> {
        for rank in self.other_ranks() {
            self.send_to(rank, envelope.clone())?;
        }
        Ok(())
    }

    fn next_seq(&self) -> u64 {
        self.collective_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Block until `ready` extracts a value from the mailbox or the collective
    /// timeout expires.
    fn wait_for<T>(
        &self,
        op: &'static str,
        mut ready: impl FnMut(&mut Mailbox) -> Option<T>,
    ) -> Result<T> {
        let deadline = Instant::now() + self.collective_timeout;
        loop {
            {
                let mut mailbox = self.mailbox.lock();
                self.drain_inbox(&mut mailbox);
                if let Some(value) = ready(&mut mailbox) {
                    return Ok(value);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ClusterError::CollectiveTimeout {
                    op,
                    waited: self.collective_timeout,
                });
            }

            match self.inbox.recv_timeout((deadline - now).min(WAIT_SLICE)) {
                Ok(envelope) => self.mailbox.lock().accept(envelope),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ClusterError::PeerUnreachable { rank: self.rank });
                }
            }
        }
    }
}

impl Transport for MeshTransport {
    fn init(&self) -> Result<RankTopology> {
        self.membership.join()?;
        RankTopology::new(self.rank, self.size)
    }

    fn finalize(&self) -> Result<()> {
        self.membership.leave()
    }

    fn topology(&self) -> Result<RankTopology> {
        self.membership.ensure_active()?;
        RankTopology::new(self.rank, self.size)
    }

    fn post_gossip_recv(&self, round: u64) -> Request {
        Request::new(round)
    }

    fn post_gossip_send(&self, round: u64, batch: &[KeyedEntry]) -> Request {
        for rank in self.other_ranks() {
            let envelope = Envelope::Gossip {
                round,
                from: self.rank,
                entries: batch.to_vec(),
            };
            if self.send_to(rank, envelope).is_err() {
                debug!(rank = self.rank, peer = rank, round, "gossip batch dropped");
            }
        }
        Request::new(round)
    }

    fn test_gossip_recv(&self, request: &Request, into: &mut Vec<KeyedEntry>) -> Poll<()> {
        // Another thread of this rank holds the mailbox; try again next poll.
        let Some(mut mailbox) = self.mailbox.try_lock() else {
            return Poll::Pending;
        };
        self.drain_inbox(&mut mailbox);

        let round = request.tag();
        let arrived = mailbox.gossip.get(&round).map_or(0, Vec::len);
        if arrived < self.size - 1 {
            return Poll::Pending;
        }

        let mut batches = mailbox.gossip.remove(&round).unwrap_or_default();
        batches.sort_by_key(|(from, _)| *from);
        for (_, entries) in batches {
            into.extend(entries);
        }
        Poll::Ready(())
    }

    fn test_gossip_send(&self, _request: &Request) -> Poll<()> {
        // Channel sends are buffered, so a posted send is complete at once.
        Poll::Ready(())
    }

    fn post_stop_recv(&self, episode: u64) -> Request {
        Request::new(episode)
    }

    fn test_stop_recv(&self, request: &Request) -> Poll<()> {
        let Some(mut mailbox) = self.mailbox.try_lock() else {
            return Poll::Pending;
        };
        self.drain_inbox(&mut mailbox);

        let episode = request.tag();
        // Signals from earlier episodes are stale.
        mailbox.stops = mailbox.stops.split_off(&episode);
        if mailbox.stops.remove(&episode) {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }

    fn send_stop(&self, episode: u64) {
        for rank in self.other_ranks() {
            if self.send_to(rank, Envelope::Stop { episode }).is_err() {
                warn!(rank = self.rank, peer = rank, episode, "stop signal not delivered");
            }
        }
    }

    fn gather(&self, candidate: Candidate) -> Result<Option<Vec<Candidate>>> {
        self.membership.ensure_active()?;
        let seq = self.next_seq();

        if self.rank != ROOT {
            self.send_to(ROOT, Envelope::Gather { seq, candidate })?;
            return Ok(None);
        }

        let expected = self.size - 1;
        let mut all = self.wait_for("gather", |mailbox| {
            let arrived = mailbox.gathered.get(&seq).map_or(0, Vec::len);
            (arrived >= expected).then(|| mailbox.gathered.remove(&seq).unwrap_or_default())
        })?;
        all.push(candidate);
        Ok(Some(all))
    }

    fn all_reduce_sum(&self, value: u64) -> Result<u64> {
        self.membership.ensure_active()?;
        let seq = self.next_seq();
        self.broadcast(Envelope::Reduce { seq, value })?;

        let expected = self.size - 1;
        let others = self.wait_for("all_reduce_sum", |mailbox| {
            let arrived = mailbox.reduced.get(&seq).map_or(0, Vec::len);
            (arrived >= expected).then(|| mailbox.reduced.remove(&seq).unwrap_or_default())
        })?;
        Ok(others.into_iter().fold(value, u64::wrapping_add))
    }

    fn barrier(&self) -> Result<()> {
        self.membership.ensure_active()?;
        let seq = self.next_seq();
        self.broadcast(Envelope::Barrier { seq })?;

        let expected = self.size - 1;
        self.wait_for("barrier", |mailbox| {
            let arrived = mailbox.barriers.get(&seq).copied().unwrap_or(0);
            if arrived >= expected {
                mailbox.barriers.remove(&seq);
                Some(())
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::decision::MoveInfo;
    use crate::tt::{Bound, TtEntry};
    use std::thread;

    fn keyed(key: u64, depth: i32) -> KeyedEntry {
        KeyedEntry::new(key, TtEntry::new(Bound::Lower, depth, 0, false, 1, 0))
    }

    #[test]
    fn test_create_mesh() {
        let mesh = create_mesh(4);
        assert_eq!(mesh.len(), 4);
        for (i, endpoint) in mesh.iter().enumerate() {
            let topology = endpoint.init().unwrap();
            assert_eq!(topology.rank(), i);
            assert_eq!(topology.size(), 4);
            assert_eq!(topology.is_root(), i == 0);
        }
    }

    #[test]
    fn test_gossip_round_completes_when_all_peers_sent() {
        let mesh = create_mesh(3);
        for endpoint in &mesh {
            endpoint.init().unwrap();
        }

        let recv = mesh[0].post_gossip_recv(0);
        mesh[0].post_gossip_send(0, &[keyed(10, 5)]);

        let mut received = Vec::new();
        assert!(mesh[0].test_gossip_recv(&recv, &mut received).is_pending());

        mesh[2].post_gossip_send(0, &[keyed(30, 7)]);
        assert!(mesh[0].test_gossip_recv(&recv, &mut received).is_pending());

        mesh[1].post_gossip_send(0, &[keyed(20, 6)]);
        assert!(mesh[0].test_gossip_recv(&recv, &mut received).is_ready());

        // Batches land in rank order regardless of arrival order
        let keys: Vec<_> = received.iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![20, 30]);
    }

    #[test]
    fn test_gossip_rounds_do_not_mix() {
        let mesh = create_mesh(2);
        mesh[1].post_gossip_send(1, &[keyed(2, 9)]);

        let mut received = Vec::new();
        let round0 = mesh[0].post_gossip_recv(0);
        assert!(mesh[0].test_gossip_recv(&round0, &mut received).is_pending());

        let round1 = mesh[0].post_gossip_recv(1);
        assert!(mesh[0].test_gossip_recv(&round1, &mut received).is_ready());
        assert_eq!(received, vec![keyed(2, 9)]);
    }

    #[test]
    fn test_stale_stop_is_ignored() {
        let mesh = create_mesh(2);
        mesh[0].send_stop(1);

        let req = mesh[1].post_stop_recv(2);
        assert!(mesh[1].test_stop_recv(&req).is_pending());

        mesh[0].send_stop(2);
        assert!(mesh[1].test_stop_recv(&req).is_ready());
    }

    #[test]
    fn test_collectives_across_threads() {
        let mesh = create_mesh(3);
        let handles: Vec<_> = mesh
            .into_iter()
            .map(|endpoint| {
                thread::spawn(move || {
                    let topology = endpoint.init().unwrap();
                    let rank = topology.rank();
                    let sum = endpoint.all_reduce_sum(rank as u64 + 1).unwrap();
                    let candidate =
                        Candidate::new(MoveInfo::new(1, 0, 10, rank as i32, rank, 0), "pv");
                    let gathered = endpoint.gather(candidate).unwrap();
                    endpoint.barrier().unwrap();
                    endpoint.finalize().unwrap();
                    (rank, sum, gathered.map(|g| g.len()))
                })
            })
            .collect();

        for handle in handles {
            let (rank, sum, gathered) = handle.join().unwrap();
            assert_eq!(sum, 6);
            if rank == ROOT {
                assert_eq!(gathered, Some(3));
            } else {
                assert_eq!(gathered, None);
            }
        }
    }

    #[test]
    fn test_collective_times_out_without_peers() {
        let mut mesh = create_mesh(2);
        let lonely = mesh
            .remove(0)
            .with_collective_timeout(Duration::from_millis(20));
        lonely.init().unwrap();

        let err = lonely.barrier().unwrap_err();
        assert!(matches!(err, ClusterError::CollectiveTimeout { op: "barrier", .. }));
        assert!(err.is_fatal());
    }
}
