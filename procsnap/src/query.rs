//! Read path: reconstruct the most recent snapshot in wire shape.

use std::sync::Arc;

use crate::error::QueryError;
use crate::store::Store;
use crate::types::SnapshotView;

#[derive(Debug, Clone)]
pub struct QueryService {
    store: Arc<Store>,
}

impl QueryService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Greatest timestamp wins; ties go to the most recently inserted snapshot.
    /// Processes come back ordered by memory desc, cpu desc, pid asc.
    pub fn latest(&self) -> Result<SnapshotView, QueryError> {
        let (_, row, procs) = self.store.latest()?.ok_or(QueryError::NotFound)?;
        Ok(SnapshotView::from_rows(row, procs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::utc_micros;
    use chrono::Utc;

    #[test]
    fn empty_store_is_not_found() {
        let q = QueryService::new(Arc::new(Store::open_in_memory().unwrap()));
        assert!(matches!(q.latest(), Err(QueryError::NotFound)));
    }

    #[test]
    fn latest_reflects_inserted_view() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let raw = br#"{"hostname":"h","timestamp":"2024-05-01T00:00:00Z",
            "system":{"ram_gb":4.0},
            "processes":[{"pid":2,"name":"a","cpu":1.0,"memory":1.0},
                         {"pid":3,"name":"b","cpu":1.0,"memory":9.0}]}"#;
        let view = crate::payload::parse_snapshot(raw, Utc::now()).unwrap();
        let (row, procs) = view.into_rows();
        store.insert_snapshot(&row, &procs, Utc::now()).unwrap();

        let got = QueryService::new(store).latest().unwrap();
        assert_eq!(
            utc_micros::format(&got.timestamp),
            "2024-05-01T00:00:00.000000Z"
        );
        assert_eq!(got.system.ram_gb, 4.0);
        let pids: Vec<u32> = got.processes.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![3, 2]);
    }
}
