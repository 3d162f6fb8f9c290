use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tierflow_keeper::{create_example_config, Keeper, KeeperConfig};
use tierflow_types::{PoolId, YearMonth};

#[derive(Parser, Debug)]
#[command(name = "tierflow-keeper")]
#[command(about = "Tierflow rewards batch jobs and administrator commands")]
struct Args {
    /// Path to keeper configuration file
    #[arg(short, long, default_value = "keeper.toml")]
    config: PathBuf,

    /// Log filter; takes priority over RUST_LOG and the configured level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tick settlement, rollup and reconciliation on their intervals until Ctrl-C
    Run,
    /// Settle due and pending self-income installments once
    Settle,
    /// Recompute monthly eligibility for a period
    Rollup {
        /// Calendar month as YYYY-MM
        #[arg(long)]
        period: YearMonth,
    },
    /// Audit the store and apply capped corrections
    Reconcile,
    /// Close a pool and pay it out
    DistributePool {
        #[arg(long)]
        pool_id: u64,
    },
    /// Write an example configuration file to the --config path
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::InitConfig = args.command {
        create_example_config(&args.config)
            .with_context(|| format!("writing example config to {}", args.config.display()))?;
        println!("Wrote example configuration to {}", args.config.display());
        return Ok(());
    }

    let config = KeeperConfig::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    init_logging(&config, args.log_level.as_deref());

    info!("Starting Tierflow keeper");
    let mut keeper = Keeper::open(config).context("opening keeper")?;
    let now = Utc::now();

    match args.command {
        Command::Run => {
            let iterations = keeper
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "could not listen for Ctrl-C");
                        std::future::pending::<()>().await;
                    }
                })
                .await?;
            info!(iterations, "keeper stopped");
        }
        Command::Settle => {
            let run = keeper.settle(now).await?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
        Command::Rollup { period } => {
            let run = keeper.rollup(period, now).await?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
        Command::Reconcile => {
            let report = keeper.reconcile(now).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::DistributePool { pool_id } => {
            let distribution = keeper.distribute_pool(PoolId(pool_id), now).await?;
            println!("{}", serde_json::to_string_pretty(&distribution)?);
        }
        Command::InitConfig => {}
    }

    Ok(())
}

fn init_logging(config: &KeeperConfig, cli_level: Option<&str>) {
    let env_filter = std::env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV).ok();
    let directive = config.log_directive(cli_level, env_filter.as_deref());
    let filter = tracing_subscriber::EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("Invalid log filter '{}': {}; falling back to info", directive, e);
        tracing_subscriber::EnvFilter::new("info")
    });

    if config.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
