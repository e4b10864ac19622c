use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::AnalysisConfig;
use crate::storage::Pool;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<AnalysisConfig>,
    /// Held for the whole append-and-analyze step of an ingest, so the
    /// newest stored run always covers every stored event.
    pub ingest_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(pool: Pool, config: AnalysisConfig) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            ingest_lock: Arc::new(Mutex::new(())),
        }
    }
}
