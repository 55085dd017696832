// src/scan.rs
//! # Scan Orchestrator
//!
//! One full scan = fetch every enabled source, match entries against the
//! keyword list, insert matches into the store. Sources run as parallel
//! tasks bounded by a semaphore; a source failing (or hanging until its
//! fetch timeout) never takes down the scan, it just shows up in that
//! source's outcome.
//!
//! The scan snapshots the watchlist once at the start, so config edits made
//! mid-flight apply from the next scan on. Overlapping scans are tolerated:
//! the store's insert-if-absent makes them harmless.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::Semaphore;

use crate::config::{ConfigHandle, Source};
use crate::ingest::feed::FeedFetcher;
use crate::matcher::first_match;
use crate::store::{InsertOutcome, IntelStore, NewIntel};

pub const ENV_MAX_CONCURRENCY: &str = "SCAN_MAX_CONCURRENCY";
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("scan_runs_total", "Completed full scans.");
        describe_counter!("scan_entries_total", "Feed entries seen across all sources.");
        describe_counter!("scan_matches_total", "Entries that matched a keyword.");
        describe_counter!("scan_inserts_total", "Matches inserted as new records.");
        describe_counter!(
            "scan_duplicates_total",
            "Matches skipped because the title was already stored."
        );
        describe_counter!("scan_insert_errors_total", "Store errors during insert.");
        describe_counter!("scan_source_failures_total", "Sources whose scan failed.");
        describe_histogram!("scan_fetch_ms", "Per-source fetch+parse time in milliseconds.");
        describe_histogram!("scan_duration_ms", "Full scan duration in milliseconds.");
        describe_gauge!("scan_last_run_ts", "Unix ts when the last scan finished.");
    });
}

/// Outcome of scanning one source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub source_id: String,
    pub source_name: String,
    pub entries_seen: usize,
    pub matches_found: usize,
    pub matches_inserted: usize,
    pub failure: Option<String>,
}

/// Aggregate result of one full scan. Totals are sums over `outcomes`.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub started_at: String,
    pub finished_at: String,
    pub sources_scanned: usize,
    pub sources_failed: usize,
    pub entries_seen: usize,
    pub matches_found: usize,
    pub matches_inserted: usize,
    pub outcomes: Vec<SourceOutcome>,
}

#[derive(Clone, Copy, Debug)]
pub struct ScanCfg {
    pub max_concurrency: usize,
}

impl ScanCfg {
    pub fn from_env() -> Self {
        let max_concurrency = std::env::var(ENV_MAX_CONCURRENCY)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_CONCURRENCY);
        Self { max_concurrency }
    }
}

impl Default for ScanCfg {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

pub struct Scanner {
    fetcher: Arc<dyn FeedFetcher>,
    store: Arc<IntelStore>,
    config: ConfigHandle,
    cfg: ScanCfg,
    last: RwLock<Option<ScanSummary>>,
}

impl Scanner {
    pub fn new(
        fetcher: Arc<dyn FeedFetcher>,
        store: Arc<IntelStore>,
        config: ConfigHandle,
        cfg: ScanCfg,
    ) -> Self {
        Self {
            fetcher,
            store,
            config,
            cfg,
            last: RwLock::new(None),
        }
    }

    /// The last completed scan, for the debug surface.
    pub fn last_summary(&self) -> Option<ScanSummary> {
        self.last.read().expect("rwlock poisoned").clone()
    }

    /// Run one full scan and return its summary. Returns only after every
    /// spawned source scan has completed, success or failure.
    pub async fn run_full_scan(&self) -> ScanSummary {
        ensure_metrics_described();
        let started_at = now_stamp();
        let t0 = std::time::Instant::now();

        let snapshot = self.config.snapshot();
        let keywords: Arc<Vec<String>> = Arc::new(snapshot.keywords);
        let sources: Vec<Source> = snapshot.sources.into_iter().filter(|s| s.enabled).collect();

        let sem = Arc::new(Semaphore::new(self.cfg.max_concurrency));
        let mut handles = Vec::with_capacity(sources.len());

        for source in sources {
            let sem = Arc::clone(&sem);
            let fetcher = Arc::clone(&self.fetcher);
            let store = Arc::clone(&self.store);
            let keywords = Arc::clone(&keywords);
            let label = (source.id.clone(), source.name.clone());
            let handle = tokio::spawn(async move {
                let _permit = sem.acquire().await.expect("semaphore closed");
                scan_source(fetcher.as_ref(), store.as_ref(), &source, &keywords).await
            });
            handles.push((label, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for ((source_id, source_name), handle) in handles {
            let outcome = match handle.await {
                Ok(o) => o,
                Err(e) => {
                    tracing::error!(error = ?e, source = %source_id, "scan worker panicked");
                    counter!("scan_source_failures_total").increment(1);
                    SourceOutcome {
                        source_id,
                        source_name,
                        entries_seen: 0,
                        matches_found: 0,
                        matches_inserted: 0,
                        failure: Some(format!("worker failed: {e}")),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let summary = ScanSummary {
            started_at,
            finished_at: now_stamp(),
            sources_scanned: outcomes.len(),
            sources_failed: outcomes.iter().filter(|o| o.failure.is_some()).count(),
            entries_seen: outcomes.iter().map(|o| o.entries_seen).sum(),
            matches_found: outcomes.iter().map(|o| o.matches_found).sum(),
            matches_inserted: outcomes.iter().map(|o| o.matches_inserted).sum(),
            outcomes,
        };

        counter!("scan_runs_total").increment(1);
        gauge!("scan_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        histogram!("scan_duration_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        tracing::info!(
            target: "scan",
            sources = summary.sources_scanned,
            failed = summary.sources_failed,
            seen = summary.entries_seen,
            matched = summary.matches_found,
            inserted = summary.matches_inserted,
            "scan complete"
        );

        *self.last.write().expect("rwlock poisoned") = Some(summary.clone());
        summary
    }
}

async fn scan_source(
    fetcher: &dyn FeedFetcher,
    store: &IntelStore,
    source: &Source,
    keywords: &[String],
) -> SourceOutcome {
    let mut outcome = SourceOutcome {
        source_id: source.id.clone(),
        source_name: source.name.clone(),
        entries_seen: 0,
        matches_found: 0,
        matches_inserted: 0,
        failure: None,
    };

    let entries = match fetcher.fetch(&source.url).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, source = %source.id, url = %source.url, "fetch failed");
            counter!("scan_source_failures_total").increment(1);
            outcome.failure = Some(e.to_string());
            return outcome;
        }
    };

    outcome.entries_seen = entries.len();
    counter!("scan_entries_total").increment(entries.len() as u64);

    for entry in &entries {
        let keyword = match first_match(entry, keywords) {
            Some(k) => k,
            None => continue,
        };
        outcome.matches_found += 1;
        counter!("scan_matches_total").increment(1);

        let rec = NewIntel {
            source_name: source.name.clone(),
            category: source.category.clone(),
            title: entry.title.clone(),
            link: entry.link.clone(),
            summary: entry.summary.clone(),
            matched_keyword: keyword.to_string(),
        };
        match store.insert_if_absent(&rec) {
            Ok(InsertOutcome::Inserted(id)) => {
                outcome.matches_inserted += 1;
                counter!("scan_inserts_total").increment(1);
                tracing::info!(
                    target: "scan",
                    id,
                    source = %source.name,
                    keyword = %keyword,
                    title = %entry.title,
                    "match"
                );
            }
            Ok(InsertOutcome::AlreadyPresent) => {
                counter!("scan_duplicates_total").increment(1);
            }
            Err(e) => {
                // Not retried here; the next scan gets another shot.
                tracing::warn!(error = %e, title = %entry.title, "insert failed");
                counter!("scan_insert_errors_total").increment(1);
            }
        }
    }

    outcome
}

fn now_stamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
