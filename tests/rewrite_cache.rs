// tests/rewrite_cache.rs
//
// Caching-wrapper semantics: cache hits skip the provider, the daily budget
// counts only real provider calls, and exhaustion surfaces as a typed error.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use defense_intel_monitor::rewrite::{CachingRewriter, RewriteError, Rewriter};

/// Counts how many times the provider was actually invoked.
struct CountingRewriter {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Rewriter for CountingRewriter {
    async fn rewrite(&self, title: &str, _summary: &str) -> Result<String, RewriteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("post about {title}"))
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

fn counting(calls: &Arc<AtomicU32>) -> CountingRewriter {
    CountingRewriter {
        calls: Arc::clone(calls),
    }
}

#[tokio::test]
async fn cache_hit_skips_the_provider() {
    let dir = tempfile::tempdir().expect("tempdir");
    let calls = Arc::new(AtomicU32::new(0));
    let rw = CachingRewriter::new(counting(&calls), dir.path().to_path_buf(), 10);

    let a = rw.rewrite("Drone order", "500 units").await.expect("first call");
    let b = rw.rewrite("Drone order", "500 units").await.expect("second call");
    assert_eq!(a, b);
    assert_eq!(
        calls.load(Ordering::SeqCst),
        1,
        "the second call must come from the cache"
    );
}

#[tokio::test]
async fn distinct_inputs_call_the_provider_separately() {
    let dir = tempfile::tempdir().expect("tempdir");
    let calls = Arc::new(AtomicU32::new(0));
    let rw = CachingRewriter::new(counting(&calls), dir.path().to_path_buf(), 10);

    rw.rewrite("Drone order", "500 units").await.expect("first");
    rw.rewrite("Drone order", "600 units").await.expect("second");
    assert_eq!(calls.load(Ordering::SeqCst), 2, "different summary, different key");
}

#[tokio::test]
async fn daily_limit_exhausts_to_a_typed_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let calls = Arc::new(AtomicU32::new(0));
    let rw = CachingRewriter::new(counting(&calls), dir.path().to_path_buf(), 2);

    rw.rewrite("A", "").await.expect("first");
    rw.rewrite("B", "").await.expect("second");
    let err = rw.rewrite("C", "").await.expect_err("over budget");
    assert!(matches!(err, RewriteError::LimitReached));
    assert_eq!(calls.load(Ordering::SeqCst), 2, "the provider never saw 'C'");

    // Cached inputs still answer after exhaustion.
    let again = rw.rewrite("A", "").await.expect("cache hit past the limit");
    assert_eq!(again, "post about A");
}

#[tokio::test]
async fn budget_state_survives_a_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let calls = Arc::new(AtomicU32::new(0));
    {
        let rw = CachingRewriter::new(counting(&calls), dir.path().to_path_buf(), 1);
        rw.rewrite("A", "").await.expect("first");
    }

    // A fresh wrapper over the same directory picks up today's count.
    let rw = CachingRewriter::new(counting(&calls), dir.path().to_path_buf(), 1);
    let err = rw.rewrite("B", "").await.expect_err("budget persisted");
    assert!(matches!(err, RewriteError::LimitReached));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn provider_errors_do_not_consume_the_budget() {
    struct FailingRewriter;

    #[async_trait]
    impl Rewriter for FailingRewriter {
        async fn rewrite(&self, _title: &str, _summary: &str) -> Result<String, RewriteError> {
            Err(RewriteError::EmptyResponse)
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let rw = CachingRewriter::new(FailingRewriter, dir.path().to_path_buf(), 1);

    let err = rw.rewrite("A", "").await.expect_err("provider fails");
    assert!(matches!(err, RewriteError::EmptyResponse));
    // The failed call did not count, so the budget of one is still open.
    let err = rw.rewrite("B", "").await.expect_err("provider still fails");
    assert!(matches!(err, RewriteError::EmptyResponse), "not LimitReached");
}
