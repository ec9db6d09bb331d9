//! Command runners behind the `pnorm` binary. Each takes a plain config
//! struct and returns `anyhow::Result<()>`, printing JSON to stdout.
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::database_ops::store::{connect_store, ProductStore};
use crate::taxonomy::Taxonomy;
use crate::util::env as env_util;

pub mod classify;
pub mod ingest;
pub mod recategorize;
pub mod sessions;
pub mod stats;

pub(crate) fn load_taxonomy(path: Option<&Path>) -> Result<Arc<Taxonomy>> {
    let env_path = env_util::taxonomy_path();
    let path = path.or(env_path.as_deref());
    let taxonomy = Taxonomy::load(path).with_context(|| match path {
        Some(p) => format!("failed to load taxonomy from {}", p.display()),
        None => "failed to load built-in taxonomy".to_string(),
    })?;
    Ok(Arc::new(taxonomy))
}

pub(crate) async fn open_store(database_url: &str) -> Result<Arc<dyn ProductStore>> {
    let store = connect_store(database_url, env_util::max_connections())
        .await
        .with_context(|| {
            format!(
                "failed to open store at {}",
                env_util::redact_db_url(database_url)
            )
        })?;
    info!(backend = store.backend(), "store ready");
    Ok(store)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{out}");
    Ok(())
}
