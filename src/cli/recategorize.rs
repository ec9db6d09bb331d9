use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::orchestrator::Pipeline;

#[derive(Debug, Clone)]
pub struct RecategorizeConfig {
    pub database_url: String,
    pub taxonomy_path: Option<PathBuf>,
    /// Write changed categories back; otherwise only report them.
    pub apply: bool,
}

pub async fn run(cfg: RecategorizeConfig) -> Result<()> {
    let taxonomy = super::load_taxonomy(cfg.taxonomy_path.as_deref())?;
    let store = super::open_store(&cfg.database_url).await?;
    let report = Pipeline::new(taxonomy, store)
        .recategorize(cfg.apply)
        .await
        .context("recategorize failed")?;
    super::print_json(&report)
}
