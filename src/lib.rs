pub mod classification;
pub mod cli;
pub mod database_ops;
pub mod error;
pub mod model;
pub mod normalization;
pub mod orchestrator;
pub mod taxonomy;
pub mod tracing;

pub mod util {
    pub mod env;
}

pub use classification::{CategoryClassifier, Classification, MatchStage};
pub use database_ops::{IngestionGate, ProductStore, UpsertOutcome};
pub use error::{IngestError, StoreError};
pub use model::{CanonicalRecord, Category, Currency, RawRecord};
pub use normalization::FieldNormalizer;
pub use orchestrator::{Pipeline, RunOptions, RunSummary};
pub use taxonomy::Taxonomy;
