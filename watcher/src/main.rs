/*
watcher - single-binary main.rs
Runs one watch pass: fetch every configured source, report never-seen items as a digest.
*/

use anyhow::{Context, Result};
use clap::Parser;
use common::Config;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use watcher::delivery::{ConsoleDelivery, Delivery, FileDelivery};
use watcher::digest::{LinkSummarizer, Summarizer};
use watcher::llm::{LlmSummarizer, RemoteLlmProvider};
use watcher::pipeline;
use watcher::storage::Ledger;

#[derive(Parser, Debug)]
#[command(name = "watcher", about = "Report new competitor posts, releases and events as a digest")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Report what would be new without writing to the ledger
    #[arg(long)]
    dry_run: bool,

    /// Only consider items published in the last N hours (0 disables the filter)
    #[arg(long, value_name = "N")]
    since_hours: Option<u32>,

    /// Report the first N items of every source regardless of history
    #[arg(long, value_name = "N")]
    force_seed: Option<usize>,

    /// On an empty ledger, report at most N items per source and mark the rest seen
    #[arg(long, value_name = "N")]
    seed_latest: Option<usize>,

    /// Forget every seen item before running
    #[arg(long)]
    reset: bool,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let mut config = load_config(args.config.clone()).await?;
    apply_overrides(&mut config, &args);

    let ledger = Ledger::open(&config.database.path, config.selection.dry_run)
        .await
        .with_context(|| format!("failed to open ledger at {}", config.database.path))?;

    if args.reset {
        if ledger.is_dry_run() {
            warn!("--reset ignored in dry-run mode");
        } else {
            let removed = ledger.reset().await.context("failed to reset ledger")?;
            info!(removed, "ledger reset before run");
        }
    }

    let summarizer = build_summarizer(&config);

    let report = tokio::select! {
        res = pipeline::run(&config, &ledger, summarizer.as_ref()) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, aborting run");
            return Ok(());
        }
    };
    let report = match report {
        Ok(report) => report,
        Err(e) => {
            error!(%e, "run failed");
            ledger.close().await;
            return Err(e.into());
        }
    };
    ledger.close().await;

    for failure in &report.fetch.failures {
        warn!(source = %failure.source, "source skipped: {}", failure.error);
    }
    info!(
        mode = ?report.mode,
        fetched = report.fetch.items.len(),
        new = report.new_items.len(),
        "run finished"
    );

    let delivery: Box<dyn Delivery> = match config.delivery.as_ref().and_then(|d| d.output_path.clone()) {
        Some(path) => Box::new(FileDelivery::new(path)),
        None => Box::new(ConsoleDelivery),
    };
    if let Err(e) = delivery.deliver(&report.digest.subject, &report.digest).await {
        error!(%e, "delivery failed");
    }

    Ok(())
}

/// `config.default.toml` merged with `--config FILE`, or `config.toml` when present.
async fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = explicit {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    let config = match Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(%e, "failed to load configuration");
            return Err(e);
        }
    };
    info!(default = ?default_path, override = ?override_path, "configuration loaded");
    Ok(config)
}

fn apply_overrides(config: &mut Config, args: &Args) {
    let selection = &mut config.selection;
    if args.dry_run {
        selection.dry_run = true;
    }
    if let Some(h) = args.since_hours {
        selection.since_hours = h;
    }
    if let Some(n) = args.force_seed {
        selection.force_seed_per_source = n;
    }
    if let Some(n) = args.seed_latest {
        selection.seed_latest_per_source = n;
    }
}

fn build_summarizer(config: &Config) -> Box<dyn Summarizer> {
    let llm_config = config.llm.clone().unwrap_or_default();
    match RemoteLlmProvider::from_config(&llm_config) {
        Some(provider) => {
            info!("LLM summarizer initialized: {}", provider.model());
            Box::new(LlmSummarizer::new(provider))
        }
        None => {
            info!("no LLM key configured, digest uses plain links");
            Box::new(LinkSummarizer)
        }
    }
}
