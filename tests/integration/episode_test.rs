use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use ttcluster::cluster::{Cluster, ClusterConfig};
use ttcluster::search::{SearchConfig, SearchWorker, SyntheticSearch, run_cluster, run_rank};
use ttcluster::transport::LocalTransport;
use ttcluster::tt::SharedTable;

fn small_search() -> SearchConfig {
    SearchConfig::default()
        .with_time_limit(Duration::from_secs(20))
        .with_max_depth(5)
        .with_nodes_per_depth(128)
        .with_key_space(2048)
        .with_seed(11)
}

#[test]
fn test_multi_rank_episode() {
    let cluster_config = ClusterConfig::default()
        .with_threads(2)
        .with_cache_capacity(8)
        .with_min_gossip_depth(1);
    let search_config = SearchConfig::default()
        .with_time_limit(Duration::from_millis(300))
        .with_max_depth(64)
        .with_key_space(4096)
        .with_seed(7);

    let reports = run_cluster(&cluster_config, &search_config, 3).unwrap();
    assert_eq!(reports.len(), 3);

    let root = &reports[0];
    assert_eq!(root.rank, 0);
    assert_eq!(root.episode, 1);
    assert!(root.best.has_move());
    assert!(root.best.rank < 3);

    // The root's decision is at least as good as every other rank's own result
    for other in &reports[1..] {
        assert_ne!(root.best.rank_against(&other.best), Ordering::Less);
    }

    // Reductions agree on every rank
    for report in &reports {
        assert_eq!(report.totals.nodes_searched, root.totals.nodes_searched);
        assert_eq!(report.totals.tb_hits, root.totals.tb_hits);
        assert_eq!(report.totals.tt_saves, root.totals.tt_saves);
        assert_eq!(report.totals.ranks, 3);
    }
    assert!(root.totals.nodes_searched > 0);

    let merged: u64 = reports.iter().map(|r| r.gossip.entries_merged).sum();
    assert!(merged > 0);
}

#[test]
fn test_single_rank_episode_is_deterministic() {
    let cluster_config = ClusterConfig::default().with_threads(1);

    let first = run_cluster(&cluster_config, &small_search(), 1).unwrap();
    let second = run_cluster(&cluster_config, &small_search(), 1).unwrap();

    assert_eq!(first[0].best, second[0].best);
    assert_eq!(first[0].pv, second[0].pv);
    assert_eq!(first[0].depth_reached, 5);
    assert_eq!(first[0].totals.nodes_searched, 128 * (1 + 2 + 3 + 4 + 5));
    assert_eq!(first[0].gossip.entries_merged, 0);
}

#[test]
fn test_single_rank_matches_plain_search() {
    // The same worker driven directly, without the episode machinery
    let cluster = Cluster::init(
        ClusterConfig::default().with_threads(1),
        Arc::new(LocalTransport::new()),
        Arc::new(SharedTable::new()),
    )
    .unwrap();
    cluster.signals_init(1);
    let config = small_search();
    let mut search = SyntheticSearch::new(config.worker_seed(0, 1, 0), &config);
    let mut cache = cluster.new_cache();
    let mut best = None;
    for depth in 1..=config.max_depth {
        best = search.search_depth(depth, &cluster, &mut cache);
    }
    let best = best.unwrap();

    let reports = run_cluster(&ClusterConfig::default().with_threads(1), &config, 1).unwrap();
    assert_eq!(reports[0].best.mv, best.mv);
    assert_eq!(reports[0].best.score, best.score);
    assert_eq!(reports[0].pv, best.pv);
}

#[test]
fn test_consecutive_episodes_on_one_cluster() {
    let cluster = Cluster::init(
        ClusterConfig::default().with_threads(1),
        Arc::new(LocalTransport::new()),
        Arc::new(SharedTable::new()),
    )
    .unwrap();
    let config = small_search().with_max_depth(3);

    let first = run_rank(&cluster, &config, 1).unwrap();
    let second = run_rank(&cluster, &config, 2).unwrap();
    assert_eq!(first.best.episode, 1);
    assert_eq!(second.best.episode, 2);
    // Counters are per episode
    assert_eq!(second.totals.nodes_searched, 128 * (1 + 2 + 3));

    cluster.sync().unwrap();
    cluster.finalize().unwrap();
}
