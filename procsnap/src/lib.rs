//! procsnap collector: ingests process snapshots from agents into SQLite and serves
//! the most recent one back in the same nested shape.

pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod payload;
pub mod query;
pub mod state;
pub mod store;
pub mod types;

pub use api::router;
pub use config::ServerConfig;
pub use error::{IngestError, QueryError, StoreError};
pub use ingest::IngestionService;
pub use query::QueryService;
pub use state::AppState;
pub use store::Store;
pub use types::{ProcessEntry, SnapshotId, SnapshotView, SystemInfo};
