use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::info;

use crate::util::env as env_util;

#[derive(Debug, Clone)]
pub struct SessionsConfig {
    pub database_url: String,
    pub website: Option<String>,
    pub limit: u32,
}

pub async fn run(cfg: SessionsConfig) -> Result<()> {
    let store = super::open_store(&cfg.database_url).await?;
    let sessions = store
        .recent_sessions(cfg.website.as_deref(), cfg.limit)
        .await
        .context("failed to list scrape sessions")?;
    super::print_json(&sessions)
}

#[derive(Debug, Clone)]
pub struct PruneConfig {
    pub database_url: String,
    /// Keep this many days of history (defaults to SESSION_RETENTION_DAYS).
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
struct PruneReport {
    retention_days: i64,
    deleted: u64,
}

pub async fn prune(cfg: PruneConfig) -> Result<()> {
    let days = cfg.days.unwrap_or_else(env_util::session_retention_days);
    if days < 0 {
        bail!("retention must be zero or more days, got {days}");
    }
    let window = Duration::try_days(days).context("retention window out of range")?;
    let store = super::open_store(&cfg.database_url).await?;
    let cutoff = Utc::now() - window;
    let deleted = store
        .prune_sessions(cutoff)
        .await
        .context("failed to prune scrape sessions")?;
    info!(retention_days = days, deleted, cutoff = %cutoff, "pruned scrape sessions");
    super::print_json(&PruneReport {
        retention_days: days,
        deleted,
    })
}
