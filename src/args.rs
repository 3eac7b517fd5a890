use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(term_width = 0)]
pub struct Args {
    /// Workload file (.json, .yaml, .yml or .toml), or a directory of workload files
    #[arg(short, long)]
    pub workload: PathBuf,

    /// Directory holding `<workload>_startup.sql|cql` scripts (defaults to the
    /// workload file's directory)
    #[arg(long)]
    pub script_dir: Option<PathBuf>,

    /// Only run the task with this name instead of selecting by weight
    #[arg(long)]
    pub task: Option<String>,

    /// Number of operations to perform per workload
    #[arg(long, default_value = "1000")]
    pub operation_count: u32,

    /// Number of concurrent clients
    #[arg(long, default_value = "1")]
    pub num_clients: u32,

    /// Ceiling on concurrently executing units within one batch
    #[arg(long, default_value = "100")]
    pub max_concurrency: usize,

    /// Seed for task selection and parameter generation
    #[arg(long)]
    pub seed: Option<u64>,

    /// Simulated per-call latency in milliseconds
    #[arg(long, default_value = "0")]
    pub latency_ms: u64,

    /// Fraction of simulated calls that fail
    #[arg(long, default_value = "0.0")]
    pub failure_rate: f64,

    /// Do not run startup scripts
    #[arg(long)]
    pub skip_startup: bool,

    /// Tokio worker threads
    #[arg(long, default_value_t = num_cpus::get())]
    pub worker_threads: usize,

    /// Thread stack size in bytes
    #[arg(long)]
    pub thread_stack_size: Option<usize>,

    /// Maximum number of blocking threads
    #[arg(long)]
    pub max_blocking_threads: Option<usize>,
}
