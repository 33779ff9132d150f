//! # Streamer Worker
//!
//! Process entry point: loads configuration, wires the collaborators and
//! either runs the queue loop or enqueues a single action.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use streamer_worker::actions::{ActionContext, ActionName, ActionRegistry, Arguments};
use streamer_worker::config::{ConfigManager, WorkerConfig};
use streamer_worker::logging::init_structured_logging;
use streamer_worker::messaging::{InMemoryQueue, MessageQueue, PgmqQueue};
use streamer_worker::notify::TracingNotifier;
use streamer_worker::streamer::{InMemoryStreamerStore, LocalObjectStore};
use streamer_worker::worker::{TerminationReason, Worker};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "streamer-worker")]
#[command(about = "Ingest streamer reports from a task queue")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration directory (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Queue backend
    #[arg(long, value_enum, default_value = "memory")]
    queue: QueueBackend,

    /// JSON file with projects, devices, streamers and reports to preload
    #[arg(long)]
    seed: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum QueueBackend {
    Memory,
    Pgmq,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the queue until stopped
    Run,

    /// Validate arguments for an action and enqueue it
    Schedule {
        /// Action class name, with or without the `Action` suffix
        action: String,

        /// JSON object of arguments
        #[arg(long, default_value = "{}")]
        args: String,

        /// Delay before the message becomes visible, in seconds
        #[arg(long, default_value_t = 0)]
        delay: u64,
    },

    /// List registered actions
    Actions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let manager = ConfigManager::load_from_directory(cli.config_dir.clone())
        .context("Failed to load worker configuration")?;
    let config = manager.config().clone();
    init_structured_logging(&config.logging);
    info!(environment = %manager.environment(), "Configuration loaded");

    match cli.command {
        Commands::Actions => {
            for action in ActionRegistry::new().list() {
                println!("{:<28} {:<22} {}", action.name, action.module, action.label);
            }
            Ok(())
        }
        Commands::Schedule {
            ref action,
            ref args,
            delay,
        } => {
            let ctx = build_context(&cli, config).await?;
            schedule(&ctx, action, args, Duration::from_secs(delay)).await
        }
        Commands::Run => {
            let ctx = build_context(&cli, config).await?;
            let reason = run(ctx).await;
            process::exit(exit_code(reason));
        }
    }
}

async fn build_context(cli: &Cli, config: WorkerConfig) -> Result<ActionContext> {
    let queue: Arc<dyn MessageQueue> = match cli.queue {
        QueueBackend::Memory => Arc::new(InMemoryQueue::new()),
        QueueBackend::Pgmq => {
            let Some(url) = config.database.url.as_deref() else {
                bail!("database.url is required for the pgmq queue backend");
            };
            Arc::new(
                PgmqQueue::connect(url, config.database.max_connections)
                    .await
                    .context("Failed to connect to pgmq")?,
            )
        }
    };

    let store = match &cli.seed {
        Some(path) => InMemoryStreamerStore::from_seed_file(path)
            .with_context(|| format!("Failed to load seed file {}", path.display()))?,
        None => InMemoryStreamerStore::new(),
    };

    let notifier = TracingNotifier::new(config.worker.server_type.clone());
    let objects = LocalObjectStore::new(config.storage.root.clone());

    Ok(ActionContext::builder(config)
        .queue(queue)
        .streamer_store(Arc::new(store))
        .objects(Arc::new(objects))
        .notifier(Arc::new(notifier))
        .build())
}

async fn schedule(ctx: &ActionContext, action: &str, args: &str, delay: Duration) -> Result<()> {
    let name: ActionName = action
        .parse()
        .with_context(|| format!("Unknown action {action}"))?;
    let arguments: Map<String, Value> =
        serde_json::from_str(args).context("Arguments must be a JSON object")?;

    ctx.queue
        .ensure_queue(ctx.queue_name())
        .await
        .context("Failed to prepare queue")?;
    let message_id = ActionRegistry::new()
        .schedule(ctx, name, Arguments::from(arguments), delay)
        .await
        .with_context(|| format!("Failed to schedule {name}"))?;

    if ctx.queue.provider_name() == "in_memory" {
        warn!("Message was scheduled on the in-process queue and will be lost on exit");
    }
    println!("{message_id}");
    Ok(())
}

async fn run(ctx: ActionContext) -> Option<TerminationReason> {
    let worker = Worker::new(ctx);
    let running = worker.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, stopping after the current message");
            running.store(false, Ordering::SeqCst);
        }
    });

    let reason = worker.run().await;
    if let Some(reason) = reason {
        error!(worker_id = %worker.identity(), reason = %reason, "Worker terminated");
    }
    reason
}

fn exit_code(reason: Option<TerminationReason>) -> i32 {
    match reason {
        None | Some(TerminationReason::Halted) => 0,
        Some(TerminationReason::InternalError) => 1,
        Some(TerminationReason::Infrastructure) => 2,
    }
}
