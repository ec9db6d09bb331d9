use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
    #[error("schema setup failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("unsupported database url scheme: {0}")]
    UnsupportedUrl(String),
    #[error("stored row for {url} is corrupt: {reason}")]
    Corrupt { url: String, reason: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    /// Missing or unusable identity; the record never reaches classification.
    #[error("malformed record: {reason}")]
    MalformedInput { reason: String },
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl IngestError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            reason: reason.into(),
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedInput { .. })
    }
}
