//! Defense Intel Monitor — Binary Entrypoint
//! Boots the Axum HTTP server, wiring the store, scanner, scheduler, and routes.
//!
//! See `README.md` for quickstart and endpoint reference.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use defense_intel_monitor::api::{self, AppState};
use defense_intel_monitor::config::{ConfigHandle, WatchConfig};
use defense_intel_monitor::ingest::feed::HttpFeedFetcher;
use defense_intel_monitor::ingest::scheduler::{spawn_scan_scheduler, SchedulerCfg};
use defense_intel_monitor::metrics::Metrics;
use defense_intel_monitor::rewrite;
use defense_intel_monitor::scan::{ScanCfg, Scanner};
use defense_intel_monitor::store::IntelStore;

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - INTEL_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("INTEL_DEV_LOG").ok().is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scan=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    // Initialize dev tracing early (no-op in production).
    enable_dev_tracing();

    let sched_cfg = SchedulerCfg::from_env();
    let metrics = Metrics::init(sched_cfg.interval_secs);

    // Watchlist: config file when present, built-in seed otherwise.
    let watchlist = WatchConfig::load_default().expect("Failed to load watchlist config");
    let config = ConfigHandle::new(watchlist);

    // An unreachable database is fatal at startup; mid-run insert errors are
    // handled per attempt by the scanner.
    let store = Arc::new(IntelStore::open_default().expect("Failed to open intel store"));

    let scanner = Arc::new(Scanner::new(
        Arc::new(HttpFeedFetcher::new()),
        Arc::clone(&store),
        config.clone(),
        ScanCfg::from_env(),
    ));

    // Periodic scans; the first one fires immediately.
    spawn_scan_scheduler(Arc::clone(&scanner), sched_cfg);

    let state = AppState {
        config,
        store,
        scanner,
        rewriter: rewrite::build_rewriter(),
    };
    let router = api::create_router(state).merge(metrics.router());

    Ok(router.into())
}
