// src/lib.rs
// Public library surface for the service binary and integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod store;

// ---- Re-exports for stable public API ----
pub use analyze::ai_adapter;
pub use crate::api::{create_router, AppState};
pub use crate::error::IngestError;
pub use crate::ingest::types::{FeedSource, NewsRecord, RunOutcome, RunReport, RunStats};
pub use crate::ingest::{run_once, Pipeline};

/// Install the fmt subscriber with `RUST_LOG` (default `news_ingest=info,warn`).
/// A subscriber installed by the host runtime wins; this is then a no-op.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_ingest=info,ingest=info,warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}
