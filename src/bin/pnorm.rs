use std::path::PathBuf;

use anyhow::{bail, Result};
use catalog_normalizer::cli::{classify, ingest, recategorize, sessions, stats};
use catalog_normalizer::tracing::init_tracing;
use catalog_normalizer::util::env;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pnorm", version, about = "Product normalization and classification CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Normalize, classify and store scraped records from a JSON Lines file
    Ingest {
        /// Input file, or `-` for stdin
        input: PathBuf,
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
        /// Replacement taxonomy document (defaults to TAXONOMY_PATH / built-in)
        #[arg(long)]
        taxonomy: Option<PathBuf>,
        /// Stamp every record with this RFC3339 time instead of now
        #[arg(long)]
        scraped_at: Option<DateTime<Utc>>,
        /// Skip writing one scrape-session row per website
        #[arg(long, default_value_t = false)]
        no_sessions: bool,
    },
    /// Show which category a single product would get, and why
    Classify {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        url: String,
        #[arg(long)]
        brand: Option<String>,
        /// Category hint as a scraper would report it
        #[arg(long)]
        hint: Option<String>,
        #[arg(long)]
        taxonomy: Option<PathBuf>,
    },
    /// Re-run the classifier over stored products
    Recategorize {
        #[arg(long)]
        db_url: Option<String>,
        #[arg(long)]
        taxonomy: Option<PathBuf>,
        /// Write changes back (default is a dry run)
        #[arg(long, default_value_t = false)]
        apply: bool,
    },
    /// Print product and session counts
    Stats {
        #[arg(long)]
        db_url: Option<String>,
    },
    /// List recent scrape sessions, newest first
    Sessions {
        #[arg(long)]
        db_url: Option<String>,
        #[arg(long)]
        website: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Delete scrape sessions older than the retention window
    PruneSessions {
        #[arg(long)]
        db_url: Option<String>,
        /// Days to keep (defaults to SESSION_RETENTION_DAYS or 30)
        #[arg(long)]
        days: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    init_tracing("info")?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            input,
            db_url,
            taxonomy,
            scraped_at,
            no_sessions,
        } => {
            let database_url = resolve_database_url(db_url)?;
            ingest::run(ingest::IngestConfig {
                database_url,
                taxonomy_path: taxonomy,
                input,
                scraped_at,
                log_sessions: !no_sessions,
            })
            .await
        }
        Commands::Classify {
            title,
            url,
            brand,
            hint,
            taxonomy,
        } => {
            classify::run(classify::ClassifyConfig {
                taxonomy_path: taxonomy,
                title,
                url,
                brand,
                hint,
            })
            .await
        }
        Commands::Recategorize {
            db_url,
            taxonomy,
            apply,
        } => {
            let database_url = resolve_database_url(db_url)?;
            recategorize::run(recategorize::RecategorizeConfig {
                database_url,
                taxonomy_path: taxonomy,
                apply,
            })
            .await
        }
        Commands::Stats { db_url } => {
            let database_url = resolve_database_url(db_url)?;
            stats::run(stats::StatsConfig { database_url }).await
        }
        Commands::Sessions {
            db_url,
            website,
            limit,
        } => {
            let database_url = resolve_database_url(db_url)?;
            sessions::run(sessions::SessionsConfig {
                database_url,
                website,
                limit,
            })
            .await
        }
        Commands::PruneSessions { db_url, days } => {
            let database_url = resolve_database_url(db_url)?;
            sessions::prune(sessions::PruneConfig { database_url, days }).await
        }
    }
}

fn resolve_database_url(db_url: Option<String>) -> Result<String> {
    if let Some(url) = db_url {
        let trimmed = url.trim();
        if !trimmed.is_empty() {
            info!(url = %env::redact_db_url(trimmed), "using database url from --db-url");
            return Ok(trimmed.to_string());
        }
    }

    let env_url = env::db_url();
    let trimmed = env_url.trim();
    if trimmed.is_empty() {
        bail!("database URL is empty; set DATABASE_URL or pass --db-url");
    }
    info!(url = %env::redact_db_url(trimmed), "using database url from environment");
    Ok(trimmed.to_string())
}
