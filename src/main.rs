mod args;

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dbworkload::params::FakerRegistry;
use dbworkload::simulated::SimulatedClient;
use dbworkload::{ConcurrentMetrics, Engine, EngineConfig, StartupOutcome, StartupRunState, Workload};

use crate::args::Args;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dbworkload=info")),
        )
        .init();

    let args = Args::parse();
    let runtime = configure_runtime(&args)?;
    runtime.block_on(run(&args))
}

fn configure_runtime(args: &Args) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.worker_threads(args.worker_threads.max(1));

    if let Some(stack_size) = args.thread_stack_size {
        builder.thread_stack_size(stack_size);
    }

    if let Some(max_threads) = args.max_blocking_threads {
        builder.max_blocking_threads(max_threads);
    }

    builder
        .enable_all()
        .build()
        .context("failed to build tokio runtime")
}

async fn run(args: &Args) -> Result<()> {
    let faker = FakerRegistry::default();
    let workloads = if args.workload.is_dir() {
        Workload::load_dir(&args.workload, &faker)?
    } else {
        vec![Workload::load(&args.workload, &faker)?]
    };
    if workloads.is_empty() {
        anyhow::bail!("no workload files found in {}", args.workload.display());
    }

    let script_dir = match &args.script_dir {
        Some(dir) => dir.clone(),
        None if args.workload.is_dir() => args.workload.clone(),
        None => args
            .workload
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };

    let client = Arc::new(SimulatedClient::new(
        Duration::from_millis(args.latency_ms),
        args.failure_rate,
    ));

    for workload in workloads {
        let metrics = ConcurrentMetrics::default();
        let name = workload.name.clone();
        let script = if args.skip_startup {
            None
        } else {
            workload.load_startup_script(&script_dir)?
        };

        let engine = Arc::new(Engine::new(
            workload,
            client.clone(),
            Arc::new(metrics.clone()),
            EngineConfig {
                max_concurrency: args.max_concurrency,
                seed: args.seed,
                faker: faker.clone(),
            },
        )?);

        if let Some(script) = script {
            match engine.run_startup(&script, StartupRunState::global()).await {
                StartupOutcome::Ran(report) if report.failed > 0 => {
                    warn!(workload = %name, failed = report.failed, "startup script had failures")
                }
                outcome => info!(workload = %name, ?outcome, "startup"),
            }
        }

        run_concurrent_benchmark(engine, args).await?;

        println!("\nWorkload {} Results:", name);
        println!("{}", metrics.get_metrics().await);
    }

    Ok(())
}

async fn run_concurrent_benchmark(engine: Arc<Engine<SimulatedClient>>, args: &Args) -> Result<()> {
    let num_clients = args.num_clients.max(1);
    info!(
        workload = %engine.workload().name,
        clients = num_clients,
        operations = args.operation_count,
        "starting run"
    );

    if let Some(task) = &args.task {
        anyhow::ensure!(
            engine.workload().task(task).is_some(),
            "workload {} has no task named {}",
            engine.workload().name,
            task
        );
    }

    let total_operations = Arc::new(AtomicU32::new(0));
    let started = Instant::now();
    let mut handles = Vec::new();

    for client_id in 0..num_clients {
        let engine = engine.clone();
        let total_operations = total_operations.clone();
        let only_task = args.task.clone();
        let ops_per_client = client_share(args.operation_count, num_clients, client_id);

        let handle = task::spawn(async move {
            for i in 0..ops_per_client {
                if i > 0 && i % 1000 == 0 {
                    info!(client = client_id, progress = i, total = ops_per_client, "progress");
                }
                let result = match &only_task {
                    Some(name) => engine.dispatch_task(name).await?,
                    None => engine.step().await,
                };
                total_operations.fetch_add(result.units.len() as u32, Ordering::Relaxed);
            }
            Ok::<_, anyhow::Error>(())
        });

        handles.push(handle);
    }

    for handle in handles {
        handle.await??;
    }

    let elapsed = started.elapsed();
    let units = total_operations.load(Ordering::Relaxed);
    println!("\nRun Complete");
    println!("Total Units: {}", units);
    println!(
        "Throughput: {:.1} units/s",
        units as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    Ok(())
}

/// Operations assigned to `client_id`. The remainder of an uneven split goes
/// to the lowest-numbered clients, one each.
fn client_share(total: u32, clients: u32, client_id: u32) -> u32 {
    let clients = clients.max(1);
    total / clients + u32::from(client_id < total % clients)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uneven_operation_counts_are_fully_assigned() {
        let shares: Vec<u32> = (0..4).map(|id| client_share(10, 4, id)).collect();
        assert_eq!(shares, vec![3, 3, 2, 2]);
        assert_eq!(shares.iter().sum::<u32>(), 10);

        assert_eq!(client_share(3, 5, 2), 1);
        assert_eq!(client_share(3, 5, 3), 0);
        assert_eq!((0..7).map(|id| client_share(1000, 7, id)).sum::<u32>(), 1000);
    }
}
