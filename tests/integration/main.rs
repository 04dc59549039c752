mod cli_test;
mod cluster_test;
mod episode_test;
