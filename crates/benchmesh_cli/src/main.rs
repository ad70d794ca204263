//! BENCHMESH CLI
//!
//! Runs benchmark lifecycles on a seeded, in-memory cluster.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod node;

use benchmesh_core::NodeId;
use benchmesh_executor::{ExecutorConfig, ExecutorService};
use benchmesh_sim::{SimConfig, SimHarness, SimReport, SimSeed};
use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use node::ExecutorNode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "benchmesh")]
#[command(about = "BENCHMESH - Cluster-wide benchmark execution", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive one benchmark through a simulated cluster
    Simulate {
        /// Seed for every random decision
        #[arg(short, long, default_value_t = 42)]
        seed: u64,
        /// Number of benchmark nodes
        #[arg(short, long, default_value_t = 3)]
        nodes: usize,
        /// Message loss probability
        #[arg(short, long, default_value_t = 0.0)]
        loss: f64,
        /// Benchmark iterations
        #[arg(short, long, default_value_t = 100)]
        iterations: u64,
        /// Concurrent benchmark runs per node
        #[arg(long, default_value_t = 1)]
        bench_pool_size: usize,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate an executor config file and print it with defaults filled in
    Config {
        /// Path to a JSON config
        #[arg(short, long)]
        file: Option<String>,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("benchmesh=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Simulate {
            seed,
            nodes,
            loss,
            iterations,
            bench_pool_size,
            json,
        } => {
            let config = SimConfig::new(SimSeed::from_literal(seed))
                .with_nodes(nodes)
                .with_loss(loss)
                .with_iterations(iterations);
            let report = simulate(config, bench_pool_size).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(())
        }
        Commands::Config { file } => {
            let config = match file {
                Some(path) => {
                    let json = std::fs::read_to_string(&path)
                        .wrap_err_with(|| format!("reading {path}"))?;
                    ExecutorConfig::from_json(&json).wrap_err_with(|| format!("parsing {path}"))?
                }
                None => ExecutorConfig::new(NodeId::generate()),
            };
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn simulate(config: SimConfig, bench_pool_size: usize) -> Result<SimReport> {
    let executor_config =
        ExecutorConfig::new(NodeId::from("template")).with_bench_pool_size(bench_pool_size);
    executor_config.validate()?;

    tracing::info!(
        seed = config.seed.seed,
        nodes = config.nodes,
        loss = config.loss,
        "starting simulation"
    );
    let mut harness = SimHarness::new(config, |node_id, transport, backend| {
        let config = ExecutorConfig {
            node_id,
            ..executor_config.clone()
        };
        ExecutorService::new(config, backend, transport).map(ExecutorNode)
    })?;
    let report = harness.run_lifecycle().await?;
    Ok(report)
}

fn print_report(report: &SimReport) {
    let verdict = if report.succeeded() { "succeeded" } else { "did not complete" };
    println!("benchmark {} {verdict} (outcome {})", report.job_id, report.outcome);
    for (node_id, state) in &report.node_states {
        println!("  {node_id:<10} {state}");
    }
    for (action, count) in &report.messages {
        println!("  {action:<24} {count} sent");
    }
    println!("  dropped {}, leftover local state {}", report.dropped, report.leftover_jobs);
}
