// tests/store_dedup.rs
//
// Dedup-store semantics under concurrent writers and across restarts.
// The in-memory cases cover races; the on-disk cases cover durability.

use std::sync::Arc;

use defense_intel_monitor::store::{InsertOutcome, IntelStore, NewIntel};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn rec(title: &str) -> NewIntel {
    NewIntel {
        source_name: "Breaking Defense".to_string(),
        category: "GEOPOLITICS".to_string(),
        title: title.to_string(),
        link: "https://example.test/item".to_string(),
        summary: "a matched entry".to_string(),
        matched_keyword: "Drone".to_string(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_inserts_of_one_title_insert_exactly_once() {
    let store = Arc::new(IntelStore::open_in_memory().expect("open store"));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.insert_if_absent(&rec("Shared headline")).expect("insert")
        }));
    }

    let mut inserted = 0;
    for h in handles {
        if matches!(h.await.expect("join"), InsertOutcome::Inserted(_)) {
            inserted += 1;
        }
    }
    assert_eq!(inserted, 1, "exactly one writer may win the title");
    assert_eq!(store.count().expect("count"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_inserts_of_distinct_titles_all_land() {
    let store = Arc::new(IntelStore::open_in_memory().expect("open store"));
    let mut rng = StdRng::seed_from_u64(7);

    let mut handles = Vec::new();
    for i in 0..24 {
        let store = Arc::clone(&store);
        let title = format!("Headline {i} / {}", rng.random_range(0..1_000_000u32));
        handles.push(tokio::spawn(async move {
            store.insert_if_absent(&rec(&title)).expect("insert")
        }));
    }
    for h in handles {
        assert!(matches!(h.await.expect("join"), InsertOutcome::Inserted(_)));
    }
    assert_eq!(store.count().expect("count"), 24);
}

#[test]
fn records_survive_reopen_and_still_dedup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("intel.db");

    {
        let store = IntelStore::open(&path).expect("open store");
        let first = store
            .insert_if_absent(&rec("Persistent headline"))
            .expect("insert");
        assert!(matches!(first, InsertOutcome::Inserted(_)));
    }

    let store = IntelStore::open(&path).expect("reopen store");
    assert_eq!(store.count().expect("count"), 1);
    assert_eq!(
        store
            .insert_if_absent(&rec("Persistent headline"))
            .expect("insert after reopen"),
        InsertOutcome::AlreadyPresent
    );
}

#[test]
fn open_creates_missing_parent_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("dirs").join("intel.db");
    let store = IntelStore::open(&path).expect("open store");
    store
        .insert_if_absent(&rec("Nested db headline"))
        .expect("insert");
    assert!(path.exists());
}
