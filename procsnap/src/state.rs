//! Shared collector state handed to every request handler.

use std::sync::Arc;

use crate::ingest::IngestionService;
use crate::query::QueryService;
use crate::store::Store;

#[derive(Clone, Debug)]
pub struct AppState {
    pub ingest: IngestionService,
    pub query: QueryService,
}

impl AppState {
    pub fn new(store: Arc<Store>, api_key: &str) -> Self {
        Self {
            ingest: IngestionService::new(store.clone(), api_key),
            query: QueryService::new(store),
        }
    }
}
