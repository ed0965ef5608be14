mod deliver;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use switchboard_core::app::{App, AppBuilder};
use switchboard_core::config::Config;
use switchboard_core::domain::{MessageId, TaskId, TaskState};
use switchboard_core::ports::Deliverer;
use switchboard_core::queue::{Message, MessageStatus};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::deliver::{CommandDeliverer, Unconfigured};

#[derive(Parser)]
#[command(name = "switchboard", about = "Serialized agent message queue and task tracker")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "switchboard.toml")]
    config: PathBuf,

    /// Data directory (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatcher and inbox consumer until stopped
    Run,
    /// Ask a running `switchboard run` to stop
    Stop,
    #[command(flatten)]
    Admin(AdminCommand),
}

/// One-shot commands against the data directory; nothing is delivered.
#[derive(Subcommand)]
enum AdminCommand {
    /// Queue a message for delivery
    Enqueue {
        /// Recipient agent
        #[arg(long)]
        to: String,
        /// Sending agent
        #[arg(long, default_value = "cli")]
        from: String,
        #[arg(long, default_value = "")]
        tag: String,
        /// Higher is more urgent
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        priority: i32,
        payload: String,
    },
    /// Message bucket counts, lease state and task counts
    Status {
        #[arg(long)]
        json: bool,
    },
    /// List messages in a bucket (pending, processing, completed, failed)
    List {
        bucket: MessageStatus,
        #[arg(long)]
        json: bool,
    },
    /// Show one message
    Show { id: MessageId },
    /// Requeue a dead-lettered message with a fresh retry budget
    Retry { id: MessageId },
    /// Delete every message in the failed bucket
    ClearFailed,
    /// List tasks
    Tasks {
        #[arg(long)]
        state: Option<TaskState>,
        #[arg(long)]
        json: bool,
    },
    /// Show one task with its evidence
    Task { id: TaskId },
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build(config: Config, deliverer: Arc<dyn Deliverer>) -> anyhow::Result<App> {
    AppBuilder::new(config)
        .with_deliverer(deliverer)
        .build()
        .context("wire services")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("load config {}", cli.config.display()))?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    init_tracing(&config);

    match cli.command {
        Commands::Run => {
            let deliverer = CommandDeliverer::from_config(&config.delivery)
                .context("delivery.command is not configured; nothing could be delivered")?;
            run(build(config, Arc::new(deliverer))?).await
        }
        Commands::Stop => {
            let path = config.stop_path();
            std::fs::create_dir_all(&config.data_dir)
                .with_context(|| format!("create {}", config.data_dir.display()))?;
            std::fs::write(&path, b"stop\n")
                .with_context(|| format!("write {}", path.display()))?;
            println!("stop requested ({})", path.display());
            Ok(())
        }
        Commands::Admin(command) => admin(build(config, Arc::new(Unconfigured))?, command).await,
    }
}

async fn run(app: App) -> anyhow::Result<()> {
    let stop_path = app.config.stop_path();
    // a leftover sentinel from an earlier stop must not end this run
    remove_sentinel(&stop_path);
    let stop_check = Duration::from_millis(app.config.consumer.stop_check_ms);

    let runtime = app.start();
    info!(data_dir = %app.config.data_dir.display(), "switchboard running");

    let mut ticker = tokio::time::interval(stop_check);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("listen for ctrl-c")?;
                info!("interrupted");
                break;
            }
            _ = ticker.tick() => {
                if stop_path.exists() {
                    info!("stop sentinel found");
                    remove_sentinel(&stop_path);
                    break;
                }
                if runtime.is_finished() {
                    bail!("background loops exited unexpectedly");
                }
            }
        }
    }

    runtime.shutdown().await;
    Ok(())
}

fn remove_sentinel(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "could not remove stop sentinel");
    }
}

async fn admin(app: App, command: AdminCommand) -> anyhow::Result<()> {
    match command {
        AdminCommand::Enqueue {
            to,
            from,
            tag,
            priority,
            payload,
        } => {
            let id = app
                .dispatcher
                .enqueue(&from, &to, &payload, &tag, priority)
                .await?;
            println!("{id}");
        }
        AdminCommand::Status { json } => {
            let report = app.status.report().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let m = &report.messages;
                println!(
                    "messages  pending={} processing={} completed={} failed={}",
                    m.counts.pending, m.counts.processing, m.counts.completed, m.counts.failed
                );
                match &m.lease_holder {
                    Some(holder) => println!("lease     held by {holder}"),
                    None => println!("lease     free"),
                }
                let t = &report.tasks;
                println!(
                    "tasks     total={} new={} assigned={} in_progress={} completed={} failed={}",
                    t.total, t.new, t.assigned, t.in_progress, t.completed, t.failed
                );
            }
        }
        AdminCommand::List { bucket, json } => {
            let messages = app.dispatcher.list(bucket).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&messages)?);
            } else {
                for m in &messages {
                    print_message_line(m);
                }
            }
        }
        AdminCommand::Show { id } => match app.dispatcher.get(&id).await? {
            Some(message) => println!("{}", serde_json::to_string_pretty(&message)?),
            None => bail!("message {id} not found"),
        },
        AdminCommand::Retry { id } => {
            let message = app.dispatcher.retry_failed(&id).await?;
            println!("requeued {}", message.id);
        }
        AdminCommand::ClearFailed => {
            let removed = app.dispatcher.clear(MessageStatus::Failed).await?;
            println!("removed {removed} failed message(s)");
        }
        AdminCommand::Tasks { state, json } => {
            let tasks = app.orchestrator.list_tasks(state).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                for t in &tasks {
                    println!(
                        "{:<32} {:<12} {:<10} {}",
                        t.task_id,
                        t.state,
                        t.owner.as_deref().unwrap_or("-"),
                        t.intent
                    );
                }
            }
        }
        AdminCommand::Task { id } => match app.orchestrator.get_task(&id).await? {
            Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
            None => bail!("task {id} not found"),
        },
    }
    Ok(())
}

fn print_message_line(m: &Message) {
    println!(
        "{} {:<10} {} -> {} retries={}/{} {}",
        m.id,
        m.status,
        m.sender,
        m.recipient,
        m.retry_count,
        m.max_retries,
        m.error.as_deref().unwrap_or("")
    );
}
