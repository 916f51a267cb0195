//! Leaseq CLI - Operator commands against a Redis-backed queue

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use leaseq_core::application::{AutoScaler, Calculator, WorkerCounts};
use leaseq_core::{Item, WorkQueue};
use leaseq_infra_redis::RedisStore;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

#[derive(Parser)]
#[command(name = "leaseq")]
#[command(about = "Leaseq work queue CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Redis URL
    #[arg(long, env = "LEASEQ_REDIS_URL", default_value = DEFAULT_REDIS_URL)]
    redis_url: String,

    /// Queue name
    #[arg(short, long, env = "LEASEQ_QUEUE", default_value = "default")]
    queue: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an item to the queue
    Add {
        /// Payload (raw text, or JSON with --json)
        data: String,

        /// Item id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Validate the payload as JSON and store it compact
        #[arg(long)]
        json: bool,
    },

    /// Lease the oldest item
    Lease {
        /// Visibility timeout in seconds
        #[arg(short, long, default_value = "30")]
        lease_secs: u64,

        /// Wait for an item instead of returning at once
        #[arg(short, long)]
        block: bool,

        /// Wait limit in seconds when blocking (0 = forever)
        #[arg(short, long, default_value = "0")]
        timeout: u64,
    },

    /// Complete a leased item
    Complete {
        /// Item id
        item_id: String,
    },

    /// Requeue items whose lease expired
    Clean,

    /// Show list sizes
    Stats,

    /// Suggest worker counts for the current backlog
    Scale {
        /// Base workers running
        #[arg(long, default_value = "1")]
        base: i32,

        /// Fast workers running
        #[arg(long, default_value = "0")]
        fast: i32,

        /// Spot workers running
        #[arg(long, default_value = "0")]
        spot: i32,

        /// Seconds to drain the queue without spot workers
        #[arg(long, default_value = "300")]
        target: i32,

        /// Seconds to drain the queue with spot workers
        #[arg(long, default_value = "600")]
        spot_target: i32,

        /// Seconds one item takes on one worker
        #[arg(long, default_value = "10")]
        run: i32,

        /// Seconds for a new worker to become ready
        #[arg(long, default_value = "60")]
        spinup: i32,

        /// Fast workers above this become spot workers
        #[arg(long, default_value = "96")]
        max_fast: i32,
    },
}

#[derive(Tabled)]
struct ItemRow {
    id: String,
    bytes: usize,
    data: String,
}

impl From<&Item> for ItemRow {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id().to_string(),
            bytes: item.data().len(),
            data: String::from_utf8_lossy(item.data()).into_owned(),
        }
    }
}

#[derive(Tabled)]
struct ScaleRow {
    pool: &'static str,
    running: i32,
    suggested: i32,
}

impl ScaleRow {
    fn rows(running: WorkerCounts, suggested: WorkerCounts) -> Vec<Self> {
        vec![
            Self { pool: "base", running: running.base, suggested: suggested.base },
            Self { pool: "fast", running: running.fast, suggested: suggested.fast },
            Self { pool: "spot", running: running.spot, suggested: suggested.spot },
        ]
    }
}

#[derive(Tabled)]
struct StatsRow {
    queue: String,
    queued: u64,
    processing: u64,
}

async fn open_queue(cli: &Cli) -> Result<WorkQueue> {
    let store = RedisStore::connect(&cli.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    WorkQueue::new(cli.queue.as_str(), Arc::new(store)).context("Invalid queue name")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let queue = open_queue(&cli).await?;

    match cli.command {
        Commands::Add { data, id, json } => {
            let item = match (id, json) {
                (Some(id), false) => Item::with_id(id, data)?,
                (None, false) => Item::new(data),
                (id, true) => {
                    let value: serde_json::Value =
                        serde_json::from_str(&data).context("Invalid JSON payload")?;
                    match id {
                        Some(id) => Item::from_json_data_with_id(id, &value)?,
                        None => Item::from_json_data(&value)?,
                    }
                }
            };

            queue.add_item(&item).await?;

            println!("{}", "✓ Item added".green().bold());
            println!();
            println!("{}", Table::new(vec![ItemRow::from(&item)]));
        }

        Commands::Lease {
            lease_secs,
            block,
            timeout,
        } => {
            let leased = queue
                .lease(
                    Duration::from_secs(lease_secs),
                    block,
                    Duration::from_secs(timeout),
                )
                .await?;

            match leased {
                Some(item) => {
                    println!(
                        "{}",
                        format!("✓ Leased for {}s (session {})", lease_secs, queue.session())
                            .green()
                            .bold()
                    );
                    println!();
                    println!("{}", Table::new(vec![ItemRow::from(&item)]));
                }
                None => println!("{}", "No item available".yellow()),
            }
        }

        Commands::Complete { item_id } => {
            // Completion only looks at the id
            let item = Item::with_id(&item_id, Vec::<u8>::new())?;
            if queue.complete(&item).await? {
                println!("{}", format!("✓ Item {} completed", item_id).green().bold());
            } else {
                println!(
                    "{}",
                    format!("○ Item {} was not in processing (already completed?)", item_id)
                        .yellow()
                );
            }
        }

        Commands::Clean => {
            println!("{}", "Running clean...".cyan().bold());
            println!();

            let report = queue.light_clean().await?;
            println!("  {} {}", "Scanned:".bold(), report.scanned);
            println!("  {} {}", "Requeued:".bold(), report.requeued);
            println!("  {} {}", "Already removed:".bold(), report.already_removed);
            println!("  {} {}", "Forgotten:".bold(), report.forgotten);
            println!("  {} {}", "Recovered:".bold(), report.recovered);
            println!();
            if report.repaired() > 0 {
                println!("  {} {} item(s) back on the queue", "✓".green(), report.repaired());
            } else {
                println!("  ○ Nothing to repair");
            }
        }

        Commands::Stats => {
            let row = StatsRow {
                queue: queue.name().to_string(),
                queued: queue.queue_len().await?,
                processing: queue.processing_count().await?,
            };
            println!("{}", "Queue Status".cyan().bold());
            println!();
            println!("{}", Table::new(vec![row]));
        }

        Commands::Scale {
            base,
            fast,
            spot,
            target,
            spot_target,
            run,
            spinup,
            max_fast,
        } => {
            let calculator = Calculator::new(target, spot_target, run, spinup)?;
            let backlog = queue.queue_len().await?;
            let mut scaler = AutoScaler::new(Arc::new(queue), calculator).with_max_fast(max_fast);

            // Running workers are assumed ready
            let running = WorkerCounts::new(base, fast, spot);
            let suggested = scaler.tick(running, running).await?;

            println!("{}", format!("Scaling for {} queued item(s)", backlog).cyan().bold());
            println!();
            println!("{}", Table::new(ScaleRow::rows(running, suggested)));
        }
    }

    Ok(())
}
