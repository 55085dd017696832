// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod ingest;
pub mod matcher;
pub mod metrics;
pub mod rewrite;
pub mod scan;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::config::{ConfigHandle, Source, WatchConfig};
pub use crate::scan::{ScanSummary, Scanner};
pub use crate::store::{InsertOutcome, IntelStore};
