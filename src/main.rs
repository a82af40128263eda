use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use wispbit_cache::ReviewCache;
use wispbit_core::{OutputFormat, WispbitConfig};
use wispbit_llm::OpenAiClient;
use wispbit_review::{FileUpdate, ReviewObserver, ReviewOrchestrator, ReviewReport};
use wispbit_rules::discover_rules;

#[derive(Parser)]
#[command(
    name = "wispbit",
    version,
    about = "AI code review that enforces your codebase rules",
    long_about = "wispbit reviews your changed files against the markdown rules in \
                  .wispbit/rules directories, using an OpenAI-compatible model with \
                  workspace tools, and reports rule violations pinned to diff lines."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Workspace root (default: current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Review changed files against the workspace rules
    Review {
        /// Base revision to diff against (default: origin/main and friends)
        #[arg(long)]
        base: Option<String>,

        /// Skip the review cache entirely
        #[arg(long)]
        no_cache: bool,
    },
    /// Inspect the rules discovered in this workspace
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
    /// Manage the review cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Subcommand)]
enum RulesCommand {
    /// List every discovered rule with its scope and patterns
    List,
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Drop every cached review
    Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "wispbit=debug" } else { "wispbit=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("workspace root {} does not exist", root.display()))?;

    match cli.command {
        Command::Review { base, no_cache } => {
            run_review(&root, base.as_deref(), no_cache, cli.format).await
        }
        Command::Rules {
            command: RulesCommand::List,
        } => list_rules(&root, cli.format),
        Command::Cache {
            command: CacheCommand::Purge,
        } => {
            let cache = ReviewCache::open(&root)?;
            cache.purge().await?;
            eprintln!("cache purged");
            Ok(())
        }
    }
}

/// Streams per-file progress to stderr as the orchestrator reports it.
struct ProgressObserver;

impl ReviewObserver for ProgressObserver {
    fn on_start(&self, total_files: usize) {
        eprintln!("reviewing {total_files} changed file(s)");
    }

    fn on_update_file(&self, filename: &str, update: &FileUpdate) {
        match update {
            FileUpdate::Queued => {}
            FileUpdate::Processing => eprintln!("  {filename} ..."),
            FileUpdate::Completed { violations } => {
                eprintln!("  {filename}: {violations} violation(s)");
            }
            FileUpdate::Skipped { reason } => eprintln!("  {filename}: skipped ({reason})"),
        }
    }

    fn on_abort(&self) {
        eprintln!("cancelled; waiting for in-flight reviews to finish");
    }
}

async fn run_review(
    root: &std::path::Path,
    base: Option<&str>,
    no_cache: bool,
    format: OutputFormat,
) -> Result<()> {
    let config = WispbitConfig::load_or_default(root)?;

    let changes = wispbit_git::collect_changes(root, base)?;
    let rules = discover_rules(root)?;
    tracing::debug!(
        files = changes.files.len(),
        rules = rules.len(),
        base = %changes.diff_branch,
        "collected review inputs"
    );

    let api_key = std::env::var(&config.llm.api_key_env).ok();
    if api_key.is_none() {
        tracing::warn!(
            env = %config.llm.api_key_env,
            "API key environment variable not set; the endpoint may reject requests"
        );
    }

    let token = tokio_util::sync::CancellationToken::new();
    let client =
        OpenAiClient::new(config.llm.base_url.clone(), api_key)?.with_cancellation(token.clone());

    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    let orchestrator = ReviewOrchestrator::new(Arc::new(client), root.to_path_buf(), config)
        .with_cancellation(token);

    let cache = if no_cache {
        None
    } else {
        Some(ReviewCache::open(root)?)
    };

    let results = orchestrator
        .run(&changes.files, &rules, cache.as_ref(), &ProgressObserver)
        .await;
    let report = ReviewReport::from_results(results);

    match format {
        OutputFormat::Text => println!("\n{report}"),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn list_rules(root: &std::path::Path, format: OutputFormat) -> Result<()> {
    let rules = discover_rules(root)?;
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rules)?);
        }
        OutputFormat::Text => {
            if rules.is_empty() {
                println!("No rules found under .wispbit/rules directories.");
                return Ok(());
            }
            for rule in &rules {
                let scope = if rule.directory.is_empty() {
                    "workspace".to_string()
                } else {
                    rule.directory.clone()
                };
                println!("{} [{}] scope: {scope}", rule.name, rule.id);
                if !rule.include.is_empty() {
                    println!("  include: {}", rule.include.join(", "));
                }
            }
        }
    }
    Ok(())
}
