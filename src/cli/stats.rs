use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct StatsConfig {
    pub database_url: String,
}

pub async fn run(cfg: StatsConfig) -> Result<()> {
    let store = super::open_store(&cfg.database_url).await?;
    let stats = store.stats().await.context("failed to read store stats")?;
    super::print_json(&stats)
}
