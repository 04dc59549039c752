//! Episode driver: worker threads per rank, ranks as threads.
//!
//! Within a rank, a coordinator loop collects completed iterations from its
//! workers over a channel and, on the root, enforces the time and node
//! limits by broadcasting the stop signal. Once every worker has finished and
//! the stop has been observed, the rank joins the end-of-episode collectives:
//! best-move selection followed by the counter reductions.

use crate::cluster::{Cluster, ClusterConfig, MoveInfo};
use crate::error::{ClusterError, Result};
use crate::search::config::SearchConfig;
use crate::search::report::{EpisodeReport, Line};
use crate::search::synthetic::SyntheticSearch;
use crate::search::SearchWorker;
use crate::transport::{LocalTransport, Transport, create_mesh};
use crate::tt::{Depth, SharedTable, TranspositionTable};
use crossbeam_channel::{RecvTimeoutError, Sender, unbounded};
use std::cmp::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const COORDINATOR_TICK: Duration = Duration::from_millis(1);

/// Message sent from a worker to its rank's coordinator.
#[derive(Debug)]
enum WorkerMessage {
    Iteration { worker_id: usize, line: Line },
    Finished { worker_id: usize, depth: Depth },
}

/// Run one episode on this rank. Every rank of the cluster must call this
/// with the same episode number.
pub fn run_rank(cluster: &Cluster, config: &SearchConfig, episode: u64) -> Result<EpisodeReport> {
    config.validate()?;
    cluster.counters().reset();
    cluster.signals_init(episode);

    let start = Instant::now();
    let deadline = config.time_limit.map(|t| start + t);
    let threads = cluster.config().threads_per_rank;
    let (to_coordinator, from_workers) = unbounded();

    let mut best: Option<Line> = None;

    thread::scope(|scope| -> Result<()> {
        for worker_id in 0..threads {
            let tx = to_coordinator.clone();
            let seed = config.worker_seed(cluster.rank(), threads, worker_id);
            scope.spawn(move || run_worker(worker_id, cluster, config, seed, tx));
        }
        drop(to_coordinator);

        let mut finished = 0;
        loop {
            if cluster.is_root() && !cluster.is_stopped() {
                let out_of_time = deadline.is_some_and(|d| Instant::now() >= d);
                let out_of_nodes = config
                    .node_limit
                    .is_some_and(|n| cluster.counters().nodes() >= n);
                if out_of_time || out_of_nodes || finished >= threads {
                    cluster.broadcast_stop()?;
                }
            }

            if finished >= threads && cluster.signals_poll() {
                break;
            }

            match from_workers.recv_timeout(COORDINATOR_TICK) {
                Ok(WorkerMessage::Iteration { worker_id, line }) => {
                    let improves = best
                        .as_ref()
                        .is_none_or(|b| line.compare(b) == Ordering::Greater);
                    if improves {
                        debug!(
                            rank = cluster.rank(),
                            worker_id,
                            depth = line.depth,
                            score = line.score,
                            "rank best improved"
                        );
                        if let Some(progress) = cluster.cluster_info(line.depth) {
                            info!("{progress}");
                        }
                        best = Some(line);
                    }
                }
                Ok(WorkerMessage::Finished { worker_id, depth }) => {
                    debug!(rank = cluster.rank(), worker_id, depth, "worker finished");
                    finished += 1;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    finished = threads;
                    thread::sleep(COORDINATOR_TICK);
                }
            }
        }
        Ok(())
    })?;

    let elapsed = start.elapsed();
    let depth_reached = best.as_ref().map_or(0, |l| l.depth);
    let (mut info, mut pv) = match best {
        Some(line) => (line.to_move_info(), line.pv),
        None => (MoveInfo::default(), String::new()),
    };

    cluster.pick_moves(&mut info, &mut pv)?;
    let totals = cluster.totals(elapsed)?;

    Ok(EpisodeReport {
        rank: cluster.rank(),
        episode,
        best: info,
        pv,
        depth_reached,
        totals,
        gossip: cluster.gossip_stats(),
    })
}

/// Iterative deepening on one thread until the stop signal or `max_depth`.
fn run_worker(
    worker_id: usize,
    cluster: &Cluster,
    config: &SearchConfig,
    seed: Option<u64>,
    to_coordinator: Sender<WorkerMessage>,
) {
    let mut search = SyntheticSearch::new(seed, config);
    let mut cache = cluster.new_cache();
    let mut completed = 0;

    for depth in 1..=config.max_depth {
        let Some(line) = search.search_depth(depth, cluster, &mut cache) else {
            break;
        };
        completed = depth;
        let _ = to_coordinator.send(WorkerMessage::Iteration { worker_id, line });
    }

    let _ = to_coordinator.send(WorkerMessage::Finished {
        worker_id,
        depth: completed,
    });
}

/// Transport endpoints for `ranks` ranks in this process, in rank order.
/// A single rank needs no message passing at all.
pub fn connect(cluster_config: &ClusterConfig, ranks: usize) -> Vec<Arc<dyn Transport>> {
    if ranks <= 1 {
        return vec![Arc::new(LocalTransport::new())];
    }
    create_mesh(ranks)
        .into_iter()
        .map(|t| {
            Arc::new(t.with_collective_timeout(cluster_config.collective_timeout))
                as Arc<dyn Transport>
        })
        .collect()
}

/// Spin up `ranks` ranks in this process, run one episode on each and shut
/// the cluster down. Reports are returned in rank order; the first is the
/// root's.
pub fn run_cluster(
    cluster_config: &ClusterConfig,
    search_config: &SearchConfig,
    ranks: usize,
) -> Result<Vec<EpisodeReport>> {
    if ranks == 0 {
        return Err(ClusterError::InvalidConfig(
            "at least one rank is required".to_string(),
        ));
    }
    cluster_config.validate()?;
    search_config.validate()?;

    let transports = connect(cluster_config, ranks);

    info!(
        ranks,
        threads = cluster_config.threads_per_rank,
        "starting cluster episode"
    );

    let results: Vec<Result<EpisodeReport>> = thread::scope(|scope| {
        let handles: Vec<_> = transports
            .into_iter()
            .map(|transport| {
                scope.spawn(move || -> Result<EpisodeReport> {
                    let table: Arc<dyn TranspositionTable> = Arc::new(SharedTable::new());
                    let cluster = Cluster::init(cluster_config.clone(), transport, table)?;
                    let report = run_rank(&cluster, search_config, 1)?;
                    cluster.sync()?;
                    cluster.finalize()?;
                    Ok(report)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    });

    let mut reports = results.into_iter().collect::<Result<Vec<_>>>()?;
    reports.sort_by_key(|r| r.rank);
    Ok(reports)
}
