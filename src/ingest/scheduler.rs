// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::scan::Scanner;

pub const ENV_SCAN_INTERVAL_SECS: &str = "SCAN_INTERVAL_SECS";
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 600;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval_secs: u64,
}

impl SchedulerCfg {
    pub fn from_env() -> Self {
        let interval_secs = std::env::var(ENV_SCAN_INTERVAL_SECS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_SCAN_INTERVAL_SECS);
        Self { interval_secs }
    }
}

/// Spawn the periodic scan loop. The first tick fires immediately, so a
/// fresh deployment populates the store without waiting a full interval.
pub fn spawn_scan_scheduler(scanner: Arc<Scanner>, cfg: SchedulerCfg) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(cfg.interval_secs));
        loop {
            ticker.tick().await;
            let summary = scanner.run_full_scan().await;
            tracing::info!(
                target: "scan",
                sources = summary.sources_scanned,
                failed = summary.sources_failed,
                inserted = summary.matches_inserted,
                "scheduled scan tick"
            );
        }
    })
}
