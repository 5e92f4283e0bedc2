use anyhow::Context;
use clap::{Parser, Subcommand};
use news_pipeline::{
    FeedTransport, HttpTransport, HttpTransportConfig, Keyword, MemoryStorage, NewsPipeline,
    PgStorage, Settings, Source, Storage,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "news-pipeline", about = "Feed ingestion and scoring pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler daemon with the standard collection and
    /// processing jobs.
    Run,
    /// Fetch all active sources once and exit.
    Collect,
    /// Score pending items once and exit.
    Process {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Re-score already-scored items against the current keyword table.
    Reevaluate {
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("loading settings")?;

    let storage: Arc<dyn Storage> = match env::var("DATABASE_URL") {
        Ok(url) => {
            info!("connecting to database");
            Arc::new(
                PgStorage::connect(&url)
                    .await
                    .context("connecting to database")?,
            )
        }
        Err(_) => {
            warn!("DATABASE_URL not set, using in-memory storage (demo mode)");
            let storage = Arc::new(MemoryStorage::new());
            seed_demo_data(storage.as_ref()).await?;
            storage
        }
    };

    let transport: Arc<dyn FeedTransport> = Arc::new(HttpTransport::new(HttpTransportConfig {
        timeout: Duration::from_secs(settings.fetch_timeout_secs),
        ..HttpTransportConfig::default()
    })?);

    let pipeline = NewsPipeline::new(storage, transport, settings);

    match cli.command {
        Command::Run => {
            pipeline.register_default_jobs().await?;
            pipeline.start().await;
            info!("pipeline running, press ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
            pipeline.stop().await;
        }
        Command::Collect => {
            let outcomes = pipeline.collect_all().await?;
            for outcome in &outcomes {
                info!(
                    "source {}: {:?}, {} new items",
                    outcome.source_id, outcome.status, outcome.new_items
                );
            }
        }
        Command::Process { limit } => {
            let outcome = pipeline.process_pending(limit).await;
            info!("processed {} items ({:?})", outcome.processed, outcome.status);
        }
        Command::Reevaluate { limit } => {
            let outcome = pipeline.reevaluate(limit).await;
            info!("reevaluated {} items ({:?})", outcome.processed, outcome.status);
        }
    }

    let stats = pipeline.stats().await?;
    info!(
        "stats: {} active sources ({} unhealthy), {} new items, {} scored",
        stats.active_sources, stats.unhealthy_sources, stats.new_items, stats.scored_items
    );

    Ok(())
}

/// Seeds a few well-known feeds and keywords so demo mode has something
/// to chew on.
async fn seed_demo_data(storage: &dyn Storage) -> anyhow::Result<()> {
    let feeds = [
        ("BBC News", "https://feeds.bbci.co.uk/news/rss.xml"),
        ("ABC News AU", "https://www.abc.net.au/news/feed/51120/rss.xml"),
    ];
    for (name, url) in feeds {
        storage.add_source(Source::new(name, url)).await?;
    }

    for (term, weight) in [("international students", 2.5), ("visa", 2.0), ("housing", 1.5)] {
        storage.add_keyword(Keyword::new(term, weight)).await?;
    }
    Ok(())
}
