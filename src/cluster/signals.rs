//! Cluster-wide stop signal.
//!
//! Only the root originates a stop; every other rank keeps one receive posted
//! and notices the signal from `signals_poll`, which search threads call from
//! their hot loop. Once set, the stop flag stays set until the next episode
//! re-initializes the broadcaster.

use crate::cluster::topology::RankTopology;
use crate::error::{ClusterError, Result};
use crate::transport::{Request, Transport};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tracing::{debug, info};

#[derive(Debug)]
pub struct SignalBroadcaster {
    topology: RankTopology,
    stop: AtomicBool,
    episode: AtomicU64,
    pending: Mutex<Option<Request>>,
    calls: AtomicU32,
    poll_interval: u32,
}

impl SignalBroadcaster {
    pub fn new(topology: RankTopology, poll_interval: u32) -> Self {
        Self {
            topology,
            stop: AtomicBool::new(false),
            episode: AtomicU64::new(0),
            pending: Mutex::new(None),
            calls: AtomicU32::new(0),
            poll_interval: poll_interval.max(1),
        }
    }

    /// Start a new episode: clear the stop flag and post the stop receive.
    pub fn signals_init(&self, transport: &dyn Transport, episode: u64) {
        let mut pending = self.pending.lock();
        self.episode.store(episode, Ordering::Release);
        self.calls.store(0, Ordering::Relaxed);
        self.stop.store(false, Ordering::Release);
        *pending = Some(transport.post_stop_recv(episode));
        debug!(rank = self.topology.rank(), episode, "stop receive posted");
    }

    /// Non-blocking check for the stop signal. Returns the current stop state.
    #[inline]
    pub fn signals_poll(&self, transport: &dyn Transport) -> bool {
        if self.stop.load(Ordering::Acquire) {
            return true;
        }

        let calls = self.calls.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        if calls % self.poll_interval != 0 {
            return false;
        }

        // Another thread is already testing the receive.
        let Some(mut pending) = self.pending.try_lock() else {
            return self.stop.load(Ordering::Acquire);
        };
        if let Some(request) = pending.as_ref()
            && transport.test_stop_recv(request).is_ready()
        {
            let episode = request.tag();
            self.stop.store(true, Ordering::Release);
            *pending = Some(transport.post_stop_recv(episode));
            debug!(rank = self.topology.rank(), episode, "stop signal received");
        }
        self.stop.load(Ordering::Acquire)
    }

    /// Set the stop flag locally and fan it out to every other rank.
    pub fn broadcast_stop(&self, transport: &dyn Transport) -> Result<()> {
        if !self.topology.is_root() {
            return Err(ClusterError::NotRoot("broadcast_stop"));
        }
        if !self.stop.swap(true, Ordering::AcqRel) {
            let episode = self.episode.load(Ordering::Acquire);
            transport.send_stop(episode);
            info!(episode, ranks = self.topology.size(), "stop broadcast");
        }
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn episode(&self) -> u64 {
        self.episode.load(Ordering::Acquire)
    }
}
