//! procmine -- event-log reconstruction and process mining for manufacturing lines.
//!
//! This crate rebuilds activity executions and cases from raw lifecycle
//! events, then runs anomaly detection, bottleneck identification, temporal
//! aggregation, and failure-cause categorization over the result.

pub mod api;
pub mod bottleneck;
pub mod config;
pub mod detect;
pub mod events;
pub mod failures;
pub mod pipeline;
pub mod reconstruct;
pub mod report;
pub mod scope;
pub mod storage;
pub mod temporal;

use anyhow::{Context, Result};
use config::AnalysisConfig;

/// Start the query API over the database configured in `config`.
pub async fn serve(bind: &str, config: AnalysisConfig) -> Result<()> {
    let db_path = config.storage.db_path.clone();
    tracing::info!(db_path = %db_path.display(), "Initializing database");
    let pool = storage::open_pool(&db_path)?;

    let addr: std::net::SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address '{bind}'"))?;
    let app = api::router(api::state::AppState::new(pool, config));

    tracing::info!(%addr, "procmine listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
