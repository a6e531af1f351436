//! API shared state

use crate::ingest::PushIngestor;
use crate::storage::Store;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Storage for the read endpoints
    pub store: Store,

    /// Token-authenticated agent ingestion
    pub ingestor: PushIngestor,
}

impl ApiState {
    pub fn new(store: Store) -> Self {
        Self {
            ingestor: PushIngestor::new(store.clone()),
            store,
        }
    }
}
