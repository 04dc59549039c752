use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use ttcluster::cluster::{Cluster, ClusterConfig, MoveInfo};
use ttcluster::transport::{Transport, create_mesh};
use ttcluster::tt::{Bound, SharedTable, TranspositionTable, TtEntry};

/// Run `body` once per rank of an `n`-rank mesh, each on its own thread, and
/// return the results in rank order.
fn with_ranks<T, F>(n: usize, config: ClusterConfig, body: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(&Cluster, &SharedTable) -> T + Send + Sync + 'static,
{
    let body = Arc::new(body);
    let handles: Vec<_> = create_mesh(n)
        .into_iter()
        .map(|transport| {
            let body = Arc::clone(&body);
            let config = config.clone();
            thread::spawn(move || {
                let table = Arc::new(SharedTable::new());
                let transport: Arc<dyn Transport> = Arc::new(transport);
                let cluster = Cluster::init(config, transport, table.clone()).unwrap();
                let out = body(&cluster, &table);
                cluster.sync().unwrap();
                cluster.finalize().unwrap();
                (cluster.rank(), out)
            })
        })
        .collect();

    let mut results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    results.sort_by_key(|(rank, _)| *rank);
    results.into_iter().map(|(_, out)| out).collect()
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

#[test]
fn test_stop_reaches_all_ranks() {
    let observed = with_ranks(4, ClusterConfig::default().with_threads(1), |cluster, _| {
        cluster.signals_init(1);
        cluster.sync().unwrap();
        if cluster.is_root() {
            cluster.broadcast_stop().unwrap();
        }
        let stopped = wait_until(|| cluster.signals_poll());
        // Stays set for the rest of the episode
        stopped && cluster.signals_poll()
    });
    assert_eq!(observed, vec![true; 4]);
}

#[test]
fn test_non_root_stop_is_rejected() {
    let results = with_ranks(2, ClusterConfig::default().with_threads(1), |cluster, _| {
        cluster.signals_init(1);
        cluster.broadcast_stop().is_ok()
    });
    assert_eq!(results, vec![true, false]);
}

#[test]
fn test_counters_sum_across_ranks() {
    let per_rank = [100u64, 250, 75];
    let totals = with_ranks(3, ClusterConfig::default().with_threads(1), move |cluster, _| {
        cluster.counters().add_nodes(per_rank[cluster.rank()]);
        cluster.counters().add_tb_hits(1);
        (
            cluster.nodes_searched().unwrap(),
            cluster.tb_hits().unwrap(),
        )
    });
    assert_eq!(totals, vec![(425, 3); 3]);
}

#[test]
fn test_gossip_delivers_deep_entries() {
    let config = ClusterConfig::default()
        .with_threads(1)
        .with_cache_capacity(2)
        .with_min_gossip_depth(4);

    let snapshots = with_ranks(2, config, |cluster, table| {
        let base = 100 * cluster.rank() as u64;
        let mut cache = cluster.new_cache();
        cluster.save(&mut cache, base + 1, TtEntry::new(Bound::Exact, 9, 30, true, 7, 30));
        cluster.save(&mut cache, base + 2, TtEntry::new(Bound::Lower, 6, 10, false, 8, 10));
        // Below the gossip depth; stays local
        cluster.save(&mut cache, base + 3, TtEntry::new(Bound::Upper, 2, -5, false, 9, -5));

        assert!(wait_until(|| {
            cluster.send_recv(&mut cache);
            cluster.gossip_stats().rounds_completed >= 1
        }));
        cluster.sync().unwrap();
        (table.snapshot(), cluster.tt_saves().unwrap())
    });

    let (rank0, saves) = &snapshots[0];
    let (rank1, _) = &snapshots[1];
    assert_eq!(rank0.get(&101).map(|e| e.depth), Some(9));
    assert_eq!(rank0.get(&102).map(|e| e.depth), Some(6));
    assert!(!rank0.contains_key(&103));
    assert_eq!(rank1.get(&1).map(|e| e.value), Some(30));
    assert!(!rank1.contains_key(&3));
    assert_eq!(*saves, 4);
}

#[test]
fn test_gossip_respects_local_replacement() {
    let config = ClusterConfig::default()
        .with_threads(1)
        .with_cache_capacity(1)
        .with_min_gossip_depth(1);

    let kept = with_ranks(2, config, |cluster, table| {
        let mut cache = cluster.new_cache();
        // Both ranks write key 42; rank 1 has the deeper result
        let depth = if cluster.rank() == 1 { 12 } else { 5 };
        cluster.save(&mut cache, 42, TtEntry::new(Bound::Exact, depth, 0, true, 1, 0));
        assert!(wait_until(|| {
            cluster.send_recv(&mut cache);
            cluster.gossip_stats().rounds_completed >= 1
        }));
        table.probe(42).map(|e| e.depth)
    });
    assert_eq!(kept, vec![Some(12), Some(12)]);
}

#[test]
fn test_tie_resolves_to_lowest_rank() {
    let picks = with_ranks(4, ClusterConfig::default().with_threads(1), |cluster, _| {
        cluster.signals_init(3);
        let mut info = MoveInfo::new(10 + cluster.rank() as u16, 0, 20, 15, 0, 0);
        let mut pv = format!("pv{}", cluster.rank());
        cluster.pick_moves(&mut info, &mut pv).unwrap();
        (info, pv)
    });

    let (root_info, root_pv) = &picks[0];
    assert_eq!(root_info.rank, 0);
    assert_eq!(root_info.mv, 10);
    assert_eq!(root_pv, "pv0");
    for (rank, (info, pv)) in picks.iter().enumerate().skip(1) {
        assert_eq!(info.rank, rank);
        assert_eq!(*pv, format!("pv{rank}"));
    }
}

#[test]
fn test_best_score_wins_over_depth() {
    let picks = with_ranks(3, ClusterConfig::default().with_threads(1), |cluster, _| {
        cluster.signals_init(1);
        let (depth, score) = match cluster.rank() {
            0 => (30, 5),
            1 => (10, 80),
            _ => (25, 80),
        };
        let mut info = MoveInfo::new(1, 2, depth, score, 0, 0);
        let mut pv = String::new();
        cluster.pick_moves(&mut info, &mut pv).unwrap();
        info
    });
    assert_eq!(picks[0].rank, 2);
    assert_eq!(picks[0].depth, 25);
    assert_eq!(picks[0].episode, 1);
}

#[test]
fn test_cluster_info_only_on_root() {
    let lines = with_ranks(3, ClusterConfig::default().with_threads(1), |cluster, _| {
        cluster.cluster_info(7)
    });
    assert!(lines[0].as_deref().is_some_and(|l| l.contains("cluster ranks 3")));
    assert_eq!(lines[1], None);
    assert_eq!(lines[2], None);
}

#[test]
fn test_stalled_round_reported_after_threshold() {
    let config = ClusterConfig::default()
        .with_threads(1)
        .with_cache_capacity(1)
        .with_min_gossip_depth(1)
        .with_stall_warning_after(2);

    let stats = with_ranks(2, config, |cluster, _| {
        let mut cache = cluster.new_cache();
        // Only the root flushes; its first round never completes
        if cluster.is_root() {
            for key in 1..=4 {
                cluster.save(&mut cache, key, TtEntry::new(Bound::Exact, 6, 0, true, 1, 0));
            }
        }
        cluster.gossip_stats()
    });

    assert_eq!(stats[0].rounds_posted, 1);
    assert_eq!(stats[0].flushes_skipped, 3);
    assert_eq!(stats[0].rounds_stalled, 1);
    assert_eq!(stats[1].rounds_stalled, 0);
}

#[test]
fn test_signal_poll_interval_delays_observation() {
    let config = ClusterConfig::default()
        .with_threads(1)
        .with_signal_poll_interval(3);

    let polls = with_ranks(2, config, |cluster, _| {
        cluster.signals_init(1);
        cluster.sync().unwrap();
        if cluster.is_root() {
            cluster.broadcast_stop().unwrap();
        }
        // The stop is in every inbox once this barrier completes
        cluster.sync().unwrap();
        (0..3).map(|_| cluster.signals_poll()).collect::<Vec<_>>()
    });

    assert_eq!(polls[0], vec![true, true, true]);
    assert_eq!(polls[1], vec![false, false, true]);
}
