//! Double-buffered, non-blocking exchange of cached entries between ranks.
//!
//! One exchanger serves all worker threads of a rank. A worker that wants to
//! flush its cache calls [`GossipExchanger::send_recv`]; whoever wins the
//! round gate drives the state machine one step and everyone else returns at
//! once:
//!
//! ```text
//! Idle --post recv, post send--> InFlight --both complete--> merge --> Idle
//! ```
//!
//! At most one round is in flight per rank. The receive for a round is posted
//! before its send. Received entries are handed to the local table, which
//! alone decides whether to keep them. A flush attempt that finds the
//! previous round still in flight is skipped, not queued: the worker keeps its
//! cache and tries again on a later call.

use crate::cluster::cache::EntryBuffer;
use crate::transport::{Poll, Request, Transport};
use crate::tt::{KeyedEntry, TranspositionTable};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// What one call to `send_recv` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Another thread of this rank is driving the exchange.
    Busy,
    /// Nothing in flight and the cache is not ready.
    Idle,
    /// The previous round is still in flight.
    Pending,
    /// A round was posted with this many local entries.
    Posted { round: u64, sent: usize },
    /// A round completed; `merged` entries were delivered to the table and
    /// `kept` of them were stored.
    Completed {
        round: u64,
        merged: usize,
        kept: usize,
    },
}

#[derive(Debug)]
enum Phase {
    Idle,
    InFlight {
        send: Request,
        recv: Request,
        send_done: bool,
        recv_done: bool,
        skipped: u32,
    },
}

#[derive(Debug)]
struct ExchangeState {
    round: u64,
    parity: usize,
    recv_slots: [Vec<KeyedEntry>; 2],
    send_buf: Vec<KeyedEntry>,
    phase: Phase,
}

/// Counters describing the exchange so far.
#[derive(Debug, Default)]
pub struct GossipStats {
    rounds_posted: AtomicU64,
    rounds_completed: AtomicU64,
    entries_sent: AtomicU64,
    entries_merged: AtomicU64,
    entries_kept: AtomicU64,
    flushes_skipped: AtomicU64,
    rounds_stalled: AtomicU64,
}

/// Point-in-time copy of [`GossipStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GossipSnapshot {
    pub rounds_posted: u64,
    pub rounds_completed: u64,
    pub entries_sent: u64,
    pub entries_merged: u64,
    /// Remote entries the local table chose to store.
    pub entries_kept: u64,
    pub flushes_skipped: u64,
    /// Rounds that reached the stall warning threshold.
    pub rounds_stalled: u64,
}

impl GossipStats {
    pub fn snapshot(&self) -> GossipSnapshot {
        GossipSnapshot {
            rounds_posted: self.rounds_posted.load(Ordering::Relaxed),
            rounds_completed: self.rounds_completed.load(Ordering::Relaxed),
            entries_sent: self.entries_sent.load(Ordering::Relaxed),
            entries_merged: self.entries_merged.load(Ordering::Relaxed),
            entries_kept: self.entries_kept.load(Ordering::Relaxed),
            flushes_skipped: self.flushes_skipped.load(Ordering::Relaxed),
            rounds_stalled: self.rounds_stalled.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub struct GossipExchanger {
    rank: usize,
    // try_lock on this mutex is the round gate: the guard is the token that
    // lets exactly one thread advance the state machine.
    state: Mutex<ExchangeState>,
    stats: GossipStats,
    batch_capacity: usize,
    stall_warning_after: u32,
}

impl GossipExchanger {
    /// `batch_capacity` bounds every batch this rank sends; it matches the
    /// capacity of the worker caches feeding the exchange.
    pub fn new(rank: usize, batch_capacity: usize, stall_warning_after: u32) -> Self {
        let batch_size = batch_capacity.max(1);
        Self {
            rank,
            state: Mutex::new(ExchangeState {
                round: 0,
                parity: 0,
                recv_slots: [Vec::with_capacity(batch_size), Vec::with_capacity(batch_size)],
                send_buf: Vec::with_capacity(batch_size),
                phase: Phase::Idle,
            }),
            stats: GossipStats::default(),
            batch_capacity: batch_size,
            stall_warning_after,
        }
    }

    pub fn stats(&self) -> GossipSnapshot {
        self.stats.snapshot()
    }

    /// Whether a posted round has not completed yet. Returns `false` while
    /// another thread holds the gate.
    pub fn is_in_flight(&self) -> bool {
        self.state
            .try_lock()
            .is_some_and(|state| matches!(state.phase, Phase::InFlight { .. }))
    }

    /// Drive one step of the exchange on behalf of the worker owning `cache`.
    pub fn send_recv(
        &self,
        transport: &dyn Transport,
        cache: &mut EntryBuffer,
        table: &dyn TranspositionTable,
    ) -> Step {
        let Some(mut guard) = self.state.try_lock() else {
            return Step::Busy;
        };
        let state = &mut *guard;

        let mut completed = None;
        if matches!(state.phase, Phase::InFlight { .. }) {
            match self.complete_round(state, transport, table) {
                Some(step) => completed = Some(step),
                None => {
                    if cache.is_ready() {
                        self.skip_flush(state);
                    }
                    return Step::Pending;
                }
            }
        }

        if cache.is_ready() {
            return self.post_round(state, transport, cache);
        }
        completed.unwrap_or(Step::Idle)
    }

    fn post_round(
        &self,
        state: &mut ExchangeState,
        transport: &dyn Transport,
        cache: &mut EntryBuffer,
    ) -> Step {
        let round = state.round;
        let slot = &mut state.recv_slots[state.parity];
        slot.clear();

        // Receive first so a fast peer never sends into nothing.
        let recv = transport.post_gossip_recv(round);

        state.send_buf.clear();
        cache.take_into(&mut state.send_buf);
        state.send_buf.truncate(self.batch_capacity);
        let send = transport.post_gossip_send(round, &state.send_buf);
        let sent = state.send_buf.len();

        state.phase = Phase::InFlight {
            send,
            recv,
            send_done: false,
            recv_done: false,
            skipped: 0,
        };
        self.stats.rounds_posted.fetch_add(1, Ordering::Relaxed);
        self.stats
            .entries_sent
            .fetch_add(sent as u64, Ordering::Relaxed);
        debug!(rank = self.rank, round, sent, "gossip round posted");

        Step::Posted { round, sent }
    }

    /// Poll the in-flight round; merge and flip parity once both halves are
    /// done. Returns `None` while still pending.
    fn complete_round(
        &self,
        state: &mut ExchangeState,
        transport: &dyn Transport,
        table: &dyn TranspositionTable,
    ) -> Option<Step> {
        let parity = state.parity;
        let Phase::InFlight {
            send,
            recv,
            send_done,
            recv_done,
            ..
        } = &mut state.phase
        else {
            return None;
        };

        if !*recv_done {
            *recv_done = transport
                .test_gossip_recv(recv, &mut state.recv_slots[parity])
                .is_ready();
        }
        if !*send_done {
            *send_done = matches!(transport.test_gossip_send(send), Poll::Ready(()));
        }
        if !(*send_done && *recv_done) {
            return None;
        }

        let round = state.round;
        let received = &state.recv_slots[parity];
        let kept = received
            .iter()
            .filter(|keyed| table.save(keyed.key, keyed.entry))
            .count();
        let merged = received.len();

        state.phase = Phase::Idle;
        state.parity ^= 1;
        state.round += 1;
        self.stats.rounds_completed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .entries_merged
            .fetch_add(merged as u64, Ordering::Relaxed);
        self.stats
            .entries_kept
            .fetch_add(kept as u64, Ordering::Relaxed);
        debug!(rank = self.rank, round, merged, kept, "gossip round merged");

        Some(Step::Completed {
            round,
            merged,
            kept,
        })
    }

    fn skip_flush(&self, state: &mut ExchangeState) {
        self.stats.flushes_skipped.fetch_add(1, Ordering::Relaxed);
        if let Phase::InFlight { skipped, .. } = &mut state.phase {
            *skipped += 1;
            if *skipped == self.stall_warning_after {
                self.stats.rounds_stalled.fetch_add(1, Ordering::Relaxed);
                warn!(
                    rank = self.rank,
                    round = state.round,
                    skipped = *skipped,
                    "gossip round stalled; peers may have stopped flushing"
                );
            }
        }
    }
}
