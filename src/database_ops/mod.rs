pub mod ingest_gate;
pub mod memory;
pub mod postgres;
pub mod sqlite;
pub mod store;

pub use ingest_gate::IngestionGate;
pub use store::{connect_store, ProductStore, StoredProduct, UpsertOutcome};
