use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;
use ttcluster::cluster::ClusterConfig;
use ttcluster::search::{SearchConfig, run_cluster};

// --- Command Line Arguments ---

#[derive(Parser)]
#[command(name = "ttcluster")]
#[command(about = "ttcluster - clustered lazy-SMP search coordinator")]
#[command(version)]
#[command(subcommand_required = true)]
#[command(arg_required_else_help = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one search episode over a simulated cluster
    Run {
        /// Number of ranks (1 runs without any message passing)
        #[arg(long, default_value = "2")]
        ranks: usize,
        /// Search threads per rank (default: number of CPU cores)
        #[arg(short = 'j', long)]
        threads: Option<usize>,
        /// Time limit in milliseconds, enforced by the root
        #[arg(long, default_value = "1000")]
        time_ms: u64,
        /// Node limit on the root rank
        #[arg(long)]
        nodes: Option<u64>,
        /// Deepest iteration to search
        #[arg(long, default_value = "16")]
        max_depth: i32,
        /// Base random seed for reproducible worker streams
        #[arg(long)]
        seed: Option<u64>,

        // --- Cluster tuning ---
        /// Entries held per worker for gossip
        #[arg(long, default_value = "64")]
        cache_capacity: usize,
        /// Cache fill that triggers a gossip round (default: cache capacity)
        #[arg(long)]
        flush_threshold: Option<usize>,
        /// Shallowest entry depth worth gossiping
        #[arg(long, default_value = "4")]
        min_gossip_depth: i32,

        /// Enable debug logging
        #[arg(short, long)]
        verbose: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "ttcluster=debug" } else { "ttcluster=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();

    match args.command {
        Commands::Run {
            ranks,
            threads,
            time_ms,
            nodes,
            max_depth,
            seed,
            cache_capacity,
            flush_threshold,
            min_gossip_depth,
            verbose,
        } => {
            init_tracing(verbose);

            let mut cluster_config = ClusterConfig::default()
                .with_cache_capacity(cache_capacity)
                .with_min_gossip_depth(min_gossip_depth);
            if let Some(t) = threads {
                cluster_config = cluster_config.with_threads(t);
            }
            if let Some(f) = flush_threshold {
                cluster_config = cluster_config.with_flush_threshold(f);
            }

            let search_config = SearchConfig::default()
                .with_time_limit(Duration::from_millis(time_ms))
                .with_node_limit_option(nodes)
                .with_max_depth(max_depth)
                .with_seed_option(seed);

            println!("Ranks: {}", ranks);
            println!("Threads per rank: {}", cluster_config.threads_per_rank);
            println!(
                "Gossip: cache {} / flush at {} / min depth {}",
                cluster_config.cache_capacity,
                cluster_config.flush_threshold,
                cluster_config.min_gossip_depth
            );
            println!();

            match run_cluster(&cluster_config, &search_config, ranks) {
                Ok(reports) => {
                    let Some(root) = reports.first() else {
                        error!("no rank reported");
                        std::process::exit(1);
                    };
                    println!("{}", root.bestmove());
                    println!();
                    println!("=== Cluster Statistics ===");
                    print!("{}", root.format_summary());

                    if verbose {
                        println!();
                        println!("=== Per-Rank Gossip ===");
                        for report in &reports {
                            println!(
                                "Rank {}: depth {} / rounds {} / sent {} / merged {} / kept {}",
                                report.rank,
                                report.depth_reached,
                                report.gossip.rounds_completed,
                                report.gossip.entries_sent,
                                report.gossip.entries_merged,
                                report.gossip.entries_kept
                            );
                        }
                    }
                }
                Err(e) => {
                    if e.is_fatal() {
                        error!(error = %e, "cluster failure, terminating");
                    } else {
                        error!(error = %e, "invalid invocation");
                    }
                    std::process::exit(1);
                }
            }
        }
    }
}
