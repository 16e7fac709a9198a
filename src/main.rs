use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use feedworker::config::Config;
use feedworker::feed::RemoteFetcher;
use feedworker::storage::{Database, DatabaseError};
use feedworker::util::validate_feed_url;
use feedworker::worker::Scheduler;

#[derive(Parser, Debug)]
#[command(name = "feedworker", about = "Poll RSS feeds and store new entries in SQLite")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, value_name = "FILE", default_value = "feedworker.toml")]
    config: PathBuf,

    /// Database file (overrides config and FEEDWORKER_DB)
    #[arg(long, value_name = "FILE")]
    database: Option<String>,

    /// Run a single fetch cycle and exit
    #[arg(long)]
    once: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ingestion loop (default)
    Run,
    /// Create a user and print its id and API key
    AddUser {
        #[arg(long)]
        name: String,
    },
    /// Subscribe a user to a feed
    AddFeed {
        /// Owning user id
        #[arg(long, value_name = "ID")]
        user: Uuid,
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
    },
    /// List subscribed feeds with their last fetch time
    ListFeeds,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    config.apply_env();
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let db = match Database::open(&config.database_path).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Database '{}' is locked by another process.",
                config.database_path
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!(
                "Failed to open database '{}': {}",
                config.database_path,
                e
            ));
        }
    };

    match args.command.unwrap_or(Command::Run) {
        Command::AddUser { name } => {
            let user = db.create_user(&name).await.context("Failed to create user")?;
            println!("Created user {} ({})", user.name, user.id);
            println!("API key: {}", user.api_key);
        }
        Command::AddFeed { user, name, url } => {
            let url = validate_feed_url(&url).context("Invalid feed URL")?;
            let feed = db
                .create_feed(user, &name, url.as_str())
                .await
                .context("Failed to create feed")?;
            println!("Added feed {} ({}) -> {}", feed.name, feed.id, feed.url);
        }
        Command::ListFeeds => {
            for feed in db.list_feeds().await.context("Failed to list feeds")? {
                let fetched = feed
                    .last_fetched_at
                    .map(|ts| ts.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!("{}  {}  {}  (last fetched: {})", feed.id, feed.name, feed.url, fetched);
            }
        }
        Command::Run => run(db, &config, args.once).await?,
    }

    Ok(())
}

async fn run(db: Database, config: &Config, once: bool) -> Result<()> {
    let worker_config = config.worker_config().context("Invalid worker configuration")?;
    let fetcher = RemoteFetcher::new(
        &config.user_agent,
        config.request_timeout(),
        config.max_feed_bytes,
    )
    .context("Failed to build HTTP client")?;

    let scheduler = Scheduler::new(Arc::new(db), Arc::new(fetcher), worker_config);

    if once {
        let report = scheduler.run_cycle().await;
        println!(
            "Fetched {} feeds: {} failed, {} new entries",
            report.selected,
            report.failed(),
            report.stored()
        );
        return Ok(());
    }

    scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
