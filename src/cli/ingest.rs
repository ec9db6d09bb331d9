use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::error::IngestError;
use crate::model::RawRecord;
use crate::orchestrator::{Pipeline, RunOptions, RunSummary};

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub database_url: String,
    pub taxonomy_path: Option<PathBuf>,
    /// JSON Lines file, or `-` for stdin.
    pub input: PathBuf,
    pub scraped_at: Option<DateTime<Utc>>,
    pub log_sessions: bool,
}

/// One raw record per non-blank line. A line that does not parse becomes a
/// malformed-input error for the runner to count.
pub fn read_records<R: BufRead>(
    reader: R,
) -> impl Iterator<Item = Result<RawRecord, IngestError>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let n = idx + 1;
            match line {
                Ok(l) if l.trim().is_empty() => None,
                Ok(l) => Some(
                    serde_json::from_str::<RawRecord>(&l)
                        .map_err(|e| IngestError::malformed(format!("line {n}: {e}"))),
                ),
                Err(e) => Some(Err(IngestError::malformed(format!("line {n}: {e}")))),
            }
        })
}

pub async fn ingest_from<R: BufRead>(cfg: &IngestConfig, reader: R) -> Result<RunSummary> {
    let taxonomy = super::load_taxonomy(cfg.taxonomy_path.as_deref())?;
    let store = super::open_store(&cfg.database_url).await?;
    let pipeline = Pipeline::new(taxonomy, store);
    let opts = RunOptions {
        scraped_at: cfg.scraped_at,
        log_sessions: cfg.log_sessions,
    };
    Ok(pipeline.run(read_records(reader), &opts).await)
}

pub async fn run(cfg: IngestConfig) -> Result<()> {
    let summary = if cfg.input.as_os_str() == "-" {
        ingest_from(&cfg, io::stdin().lock()).await?
    } else {
        let file = File::open(&cfg.input)
            .with_context(|| format!("failed to open {}", cfg.input.display()))?;
        ingest_from(&cfg, BufReader::new(file)).await?
    };
    super::print_json(&summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const BATCH: &str = r#"{"url":"https://leaders.jo/en/product/galaxy-s24/","title":"Samsung Galaxy S24","price":"439.000 JOD"}

{"url":"https://smartbuy-me.com/products/ww70","title":"Samsung WW70T3020BS 7KG Washer","price_text":"329 JOD","brand":"Samsung"}
not json at all
{"title":"no url here"}
"#;

    #[test]
    fn blank_lines_skipped_and_bad_lines_numbered() {
        let items: Vec<_> = read_records(Cursor::new(BATCH)).collect();
        assert_eq!(items.len(), 4);
        assert!(items[0].is_ok());
        assert_eq!(items[1].as_ref().unwrap().brand.as_deref(), Some("Samsung"));
        let err = items[2].as_ref().unwrap_err();
        assert!(err.is_malformed());
        assert!(err.to_string().contains("line 4"));
        assert!(items[3].is_ok());
    }

    #[tokio::test]
    async fn ingest_into_memory_store() {
        let cfg = IngestConfig {
            database_url: "memory://".into(),
            taxonomy_path: None,
            input: PathBuf::from("-"),
            scraped_at: None,
            log_sessions: false,
        };
        let summary = ingest_from(&cfg, Cursor::new(BATCH)).await.unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.failed, 0);
    }
}
