use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sentryfeed_common::Config;
use sentryfeed_http::HttpClient;
use sentryfeed_process::Processor;
use sentryfeed_scheduler::SourceManager;
use sentryfeed_store::Store;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sentryfeed", about = "Threat-intel ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load/sync sources from a catalog file, running migrations first.
    Init {
        #[arg(long)]
        config: String,
    },
    /// Run one check_source cycle, optionally scoped to a single source.
    Collect {
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        force: bool,
    },
    /// Diff and apply the on-disk source catalog.
    SyncSources {
        #[arg(long)]
        config: String,
        #[arg(long)]
        remove: bool,
    },
    /// Recompute threat-hunting and quality scores for stored articles.
    Rescore {
        #[arg(long)]
        article_id: Option<uuid::Uuid>,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Print per-source counts, dedup rates, and last-check outcomes.
    Stats {
        #[arg(long)]
        source: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sentryfeed=info".parse().unwrap()))
        .init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "fatal error");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Command::Init { config: path } => cmd_init(&config, &path).await,
        Command::Collect { source, dry_run, force } => cmd_collect(&config, source, dry_run, force).await,
        Command::SyncSources { config: path, remove } => cmd_sync_sources(&config, &path, remove).await,
        Command::Rescore { article_id, force, dry_run } => cmd_rescore(&config, article_id, force, dry_run).await,
        Command::Stats { source } => cmd_stats(&config, source).await,
    }
}

async fn cmd_init(config: &Config, catalog_path: &str) -> Result<ExitCode> {
    let store = Store::connect(&config.database_url).await?;
    store.migrate().await?;

    let yaml = match std::fs::read_to_string(catalog_path) {
        Ok(y) => y,
        Err(e) => {
            error!(path = catalog_path, error = %e, "failed to read catalog file");
            return Ok(ExitCode::from(2));
        }
    };

    let manager = SourceManager::new(&store);
    match manager.sync(&yaml, false).await {
        Ok((diff, _)) => {
            info!(added_or_updated = diff.added_or_updated, "init complete");
            Ok(ExitCode::from(0))
        }
        Err(e) => {
            error!(error = %e, "catalog validation failed");
            Ok(ExitCode::from(2))
        }
    }
}

async fn cmd_sync_sources(config: &Config, catalog_path: &str, remove: bool) -> Result<ExitCode> {
    let store = Store::connect(&config.database_url).await?;
    let yaml = std::fs::read_to_string(catalog_path).context("reading catalog file")?;
    let manager = SourceManager::new(&store);
    match manager.sync(&yaml, remove).await {
        Ok((diff, _)) => {
            info!(added_or_updated = diff.added_or_updated, deactivated = diff.deactivated, "sync-sources complete");
            Ok(ExitCode::from(0))
        }
        Err(e) => {
            error!(error = %e, "sync-sources failed validation");
            Ok(ExitCode::from(2))
        }
    }
}

async fn cmd_collect(config: &Config, source_identifier: Option<String>, dry_run: bool, force: bool) -> Result<ExitCode> {
    let store = Store::connect(&config.database_url).await?;
    let client = HttpClient::new(config.user_agent.clone());
    let discriminators = store.load_discriminators().await?;
    let processor = Processor::new(store.clone(), discriminators, config.auto_trigger_threshold);
    let runtime = sentryfeed_scheduler::Runtime::new(
        client,
        store.clone(),
        processor,
        config.worker_concurrency,
        CancellationToken::new(),
    );

    let now = chrono::Utc::now();
    let manager = SourceManager::new(&store);
    let mut due = manager.due_sources(now).await?;

    if let Some(identifier) = &source_identifier {
        due.retain(|s| &s.identifier == identifier);
        if due.is_empty() {
            error!(identifier, "no matching active due source (use sync-sources first, or the source isn't due yet)");
            return Ok(ExitCode::from(2));
        }
    }

    if dry_run {
        for s in &due {
            info!(identifier = %s.identifier, "would check (dry-run)");
        }
        return Ok(ExitCode::from(0));
    }

    let total = due.len();
    let failures = runtime.run_due_sources_with_force(due, force).await;

    if failures > 0 && failures < total {
        info!(failures, total, "some sources failed this cycle");
        return Ok(ExitCode::from(3));
    }
    if failures > 0 && failures == total {
        error!(failures, total, "every due source failed this cycle");
        return Ok(ExitCode::from(1));
    }

    Ok(ExitCode::from(0))
}

/// Recomputes quality and threat-hunting scores for stored articles, without
/// re-fetching or re-running dedup (SPEC_FULL §0 supplemented `rescore`
/// operation, grounded in `sentryfeed-process::{quality, threat_hunting}`).
async fn cmd_rescore(
    config: &Config,
    article_id: Option<uuid::Uuid>,
    force: bool,
    dry_run: bool,
) -> Result<ExitCode> {
    let store = Store::connect(&config.database_url).await?;
    let discriminators = store.load_discriminators().await?;

    let articles = store.list_articles(None, article_id).await?;
    if articles.is_empty() {
        if let Some(id) = article_id {
            error!(article_id = %id, "no such article");
            return Ok(ExitCode::from(2));
        }
        info!("no stored articles to rescore");
        return Ok(ExitCode::from(0));
    }

    let mut rescored = 0u32;
    let mut unchanged = 0u32;
    for article in &articles {
        let quality = sentryfeed_process::quality::score(&sentryfeed_process::quality::QualityInput {
            title: &article.title,
            content: &article.content,
            published_at: article.published_at,
        });
        let threat = sentryfeed_process::threat_hunting::score(&article.content, &discriminators);

        let changed = (quality - article.quality_score).abs() > f64::EPSILON
            || threat.score != article.threat_hunting_score;
        if !changed && !force {
            unchanged += 1;
            continue;
        }

        rescored += 1;
        if dry_run {
            info!(article_id = %article.id, old_quality = article.quality_score, new_quality = quality, old_threat = article.threat_hunting_score, new_threat = threat.score, "would rescore (dry-run)");
            continue;
        }

        let mut metadata = serde_json::Map::new();
        if let serde_json::Value::Object(existing) = serde_json::to_value(&article.metadata)? {
            metadata = existing;
        }
        metadata.insert("threat_hunting".to_string(), serde_json::to_value(&threat)?);

        store
            .update_article_scores(article.id, quality, threat.score, serde_json::Value::Object(metadata))
            .await?;
        info!(article_id = %article.id, quality, threat_score = threat.score, "rescored");
    }

    info!(total = articles.len(), rescored, unchanged, "rescore complete");
    Ok(ExitCode::from(0))
}

/// Per-source counts, dedup rates, and last-check outcomes (SPEC_FULL §0
/// supplemented feature 1).
async fn cmd_stats(config: &Config, source: Option<String>) -> Result<ExitCode> {
    let store = Store::connect(&config.database_url).await?;
    let manager = SourceManager::new(&store);

    if let Some(identifier) = source {
        let Some(found) = manager.all_sources().await?.into_iter().find(|s| s.identifier == identifier) else {
            error!(identifier, "no such source");
            return Ok(ExitCode::from(2));
        };
        let Some(stats) = store.source_stats(found.id).await? else {
            error!(identifier, "no such source");
            return Ok(ExitCode::from(2));
        };
        info!(
            identifier = %stats.source.identifier,
            health = ?stats.state.health,
            consecutive_failures = stats.state.consecutive_failures,
            articles = stats.article_count,
            avg_quality = stats.avg_quality_score,
            avg_threat_hunting = stats.avg_threat_hunting_score,
            last_check_at = ?stats.last_check.as_ref().map(|c| c.started_at),
            last_check_error = ?stats.last_check.as_ref().and_then(|c| c.error_kind.clone()),
            "source stats"
        );
        return Ok(ExitCode::from(0));
    }

    let all = manager.all_sources().await?;
    let mut total_articles = 0i64;
    for s in &all {
        if let Some(stats) = store.source_stats(s.id).await? {
            total_articles += stats.article_count;
            info!(
                identifier = %s.identifier,
                active = s.active,
                health = ?stats.state.health,
                articles = stats.article_count,
                avg_quality = stats.avg_quality_score,
                "source summary"
            );
        }
    }
    info!(sources = all.len(), total_articles, "aggregate stats complete");
    Ok(ExitCode::from(0))
}
