//! Signalchain CLI
//!
//! Drives the intel pipeline from the command line. Results are printed to
//! stdout as JSON; logs go to stderr (`RUST_LOG` to tune).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use signalchain_core::agents::StageKind;
use signalchain_core::config::{get_runtime_path, PipelineConfig};
use signalchain_core::generator::Generators;
use signalchain_core::state::{IntelDb, NewWorkItem, WorkItemManager};
use signalchain_core::swarm::{MessageBus, PipelineWorker, ProcessedQuery, UuidIds};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Signalchain - market intel through a five-stage agent chain")]
struct Args {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Store a new intel item
    Ingest {
        /// Headline of the item
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        summary: Option<String>,
        /// Name of the source (feed, register, newsletter)
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Process a batch of unprocessed items, newest first
    Process {
        /// Items in this batch (config batch_limit when omitted)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Run one item through the pipeline
    ProcessItem {
        item_id: i64,
    },
    /// Show an item's latest run and its stage outputs
    Result {
        item_id: i64,
    },
    /// List completed runs, most recent first
    List {
        #[arg(short, long)]
        limit: Option<usize>,
        /// Only runs not yet marked read
        #[arg(long)]
        unread: bool,
    },
    /// Mark a completed run as read
    Read {
        run_id: i64,
    },
    /// Run counts and average audit score
    Stats,
    /// Inspect or edit stage system prompts
    Prompt {
        #[command(subcommand)]
        command: PromptCommand,
    },
}

#[derive(Subcommand)]
enum PromptCommand {
    /// List prompt slugs and versions
    List,
    /// Print a stage's prompt
    Show { stage: StageKind },
    /// Replace a stage's prompt
    Set {
        stage: StageKind,
        /// New prompt text
        #[arg(conflicts_with = "file", required_unless_present = "file")]
        content: Option<String>,
        /// Read the new prompt from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Worker over the configured stages, with stored prompts applied
fn build_worker(config: &PipelineConfig, db: &IntelDb) -> Result<PipelineWorker> {
    let generators = Generators::from_env(config.request_timeout())?;

    let mut stages = config.stage_configs();
    db.apply_prompts(&mut stages)?;

    let bus = MessageBus::standard(stages, &generators, Arc::new(UuidIds))
        .with_log_capacity(config.message_log_capacity);
    Ok(PipelineWorker::new(db, Arc::new(bus), config.worker_config()))
}

/// Worker for queries only; its bus has no stages
fn query_worker(config: &PipelineConfig, db: &IntelDb) -> PipelineWorker {
    let bus = MessageBus::new(Arc::new(UuidIds));
    PipelineWorker::new(db, Arc::new(bus), config.worker_config())
}

#[tokio::main]
async fn main() -> Result<()> {
    // API keys may live in <runtime>/.env or ./.env
    let _ = dotenvy::from_path(get_runtime_path().join(".env"));
    let _ = dotenvy::dotenv();
    init_logging();

    let args = Args::parse();
    let config = PipelineConfig::load().await?;
    let db = IntelDb::open_at(config.db_path())?;

    match db.seed_prompts() {
        Ok(count) if count > 0 => tracing::info!("Seeded {} default prompts", count),
        Ok(_) => {}
        Err(e) => tracing::warn!("Failed to seed prompts: {:#}", e),
    }

    match args.command {
        CliCommand::Ingest {
            title,
            summary,
            source,
            url,
            region,
            category,
        } => {
            let item = WorkItemManager::new(&db).insert(&NewWorkItem {
                summary,
                source_name: source,
                source_url: url,
                region,
                category,
                ..NewWorkItem::titled(title)
            })?;
            print_json(&item)?;
        }
        CliCommand::Process { limit } => {
            let worker = build_worker(&config, &db)?;
            let batch = worker.process_unprocessed_items(limit).await;
            print_json(&batch)?;
        }
        CliCommand::ProcessItem { item_id } => {
            let worker = build_worker(&config, &db)?;
            let outcome = worker.process_item(item_id).await;
            print_json(&outcome)?;
        }
        CliCommand::Result { item_id } => {
            let worker = query_worker(&config, &db);
            match worker.get_pipeline_result(item_id)? {
                Some(result) => print_json(&result)?,
                None => anyhow::bail!("No pipeline run for intel item {}", item_id),
            }
        }
        CliCommand::List { limit, unread } => {
            let worker = query_worker(&config, &db);
            let items = worker.get_processed_intel_items(&ProcessedQuery {
                limit,
                only_unread: unread,
            })?;
            print_json(&items)?;
        }
        CliCommand::Read { run_id } => {
            let worker = query_worker(&config, &db);
            worker.mark_pipeline_run_read(run_id)?;
            tracing::info!(run_id, "Marked pipeline run read");
        }
        CliCommand::Stats => {
            let worker = query_worker(&config, &db);
            print_json(&worker.get_processing_stats()?)?;
        }
        CliCommand::Prompt { command } => match command {
            PromptCommand::List => {
                let prompts: Vec<_> = db
                    .list_prompts()?
                    .into_iter()
                    .map(|(slug, version)| serde_json::json!({ "slug": slug, "version": version }))
                    .collect();
                print_json(&prompts)?;
            }
            PromptCommand::Show { stage } => {
                println!("{}", db.get_prompt(stage.as_str())?);
            }
            PromptCommand::Set {
                stage,
                content,
                file,
            } => {
                let content = match (content, file) {
                    (Some(content), _) => content,
                    (None, Some(path)) => tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read prompt file {:?}", path))?,
                    (None, None) => anyhow::bail!("Provide prompt text or --file"),
                };
                let version = db.set_prompt(stage.as_str(), &content)?;
                tracing::info!(stage = %stage, version, "Updated stage prompt");
            }
        },
    }

    Ok(())
}
