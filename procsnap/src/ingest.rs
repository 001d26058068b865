//! Ingestion: authenticate, normalize, validate, persist.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::IngestError;
use crate::payload::parse_snapshot;
use crate::store::Store;
use crate::types::SnapshotId;

#[derive(Debug, Clone)]
pub struct IngestionService {
    store: Arc<Store>,
    expected_auth: String,
}

impl IngestionService {
    pub fn new(store: Arc<Store>, secret: &str) -> Self {
        Self {
            store,
            expected_auth: format!("Token {secret}"),
        }
    }

    /// `credential` is the raw `Authorization` header value, if any. It is checked
    /// before the body is looked at.
    pub fn ingest(&self, raw: &[u8], credential: Option<&str>) -> Result<SnapshotId, IngestError> {
        if credential != Some(self.expected_auth.as_str()) {
            warn!("rejected snapshot: bad or missing credential");
            return Err(IngestError::Unauthorized);
        }

        let now = Utc::now();
        let view = parse_snapshot(raw, now).map_err(|errs| {
            warn!(fields = errs.len(), "rejected snapshot: {errs}");
            IngestError::InvalidPayload(errs)
        })?;
        let hostname = view.hostname.clone();
        let (row, procs) = view.into_rows();
        let id = self.store.insert_snapshot(&row, &procs, now)?;
        debug!(id, %hostname, processes = procs.len(), "snapshot ingested");
        Ok(id)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}
