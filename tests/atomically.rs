//! Retry driver tests: sequential commits, aborts, retry ceiling.

use jstm::{Error, Result, RetryConfig, Store, StoreOptions};
use serde_json::json;
use std::cell::Cell;

fn counter_store() -> Store {
    let store = Store::in_memory().expect("open store");
    store.new_tvar("c", json!(0)).expect("create counter");
    store
}

fn increment(store: &Store) -> Result<i64> {
    store.atomically(|tx| {
        let n: i64 = tx.read_tvar_as("c")?;
        tx.write_tvar("c", json!(n + 1))?;
        Ok(n + 1)
    })
}

// ============================================================================
// Sequential commits
// ============================================================================

#[test]
fn single_writer_increment_ten_times() {
    let store = counter_store();
    for _ in 0..10 {
        increment(&store).expect("commit");
    }
    let doc = store.snapshot_record("c").unwrap().expect("counter exists");
    assert_eq!(doc.value.as_i64(), Some(10));
    assert_eq!(doc.version, 10);
}

#[test]
fn closure_return_value_passes_through() {
    let store = counter_store();
    assert_eq!(increment(&store).unwrap(), 1);
    assert_eq!(increment(&store).unwrap(), 2);
}

#[test]
fn read_only_transaction_commits_without_bumping_versions() {
    let store = counter_store();
    let n: i64 = store.atomically(|tx| tx.read_tvar_as("c")).unwrap();
    assert_eq!(n, 0);
    assert_eq!(store.current_version("c").unwrap(), Some(0));
}

// ============================================================================
// Aborts
// ============================================================================

#[test]
fn closure_error_rolls_back_partial_writes() {
    let store = counter_store();
    let err = store
        .atomically(|tx| -> Result<()> {
            tx.write_tvar("c", json!(1))?;
            Err(Error::user("x"))
        })
        .unwrap_err();
    assert_eq!(err.to_string(), "x");

    let doc = store.snapshot_record("c").unwrap().expect("counter exists");
    assert_eq!(doc.value.as_i64(), Some(0));
    assert_eq!(doc.version, 0);
}

#[test]
fn closure_error_is_not_retried() {
    let store = counter_store();
    let runs = Cell::new(0u32);
    let _ = store.atomically(|_tx| -> Result<()> {
        runs.set(runs.get() + 1);
        Err(Error::user("boom"))
    });
    assert_eq!(runs.get(), 1);
}

#[test]
fn missing_tvar_read_propagates_without_retry() {
    let store = Store::in_memory().unwrap();
    let runs = Cell::new(0u32);
    let err = store
        .atomically(|tx| {
            runs.set(runs.get() + 1);
            tx.read_tvar("ghost")
        })
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(runs.get(), 1);
}

// ============================================================================
// Retry ceiling
// ============================================================================

#[test]
fn persistent_conflicts_surface_as_max_retries() {
    let store = Store::open(
        StoreOptions::ephemeral().with_retry(RetryConfig::default().with_max_attempts(3)),
    )
    .unwrap();
    store.new_tvar("c", json!(0)).unwrap();
    let saboteur = store.new_handle();

    let runs = Cell::new(0u32);
    let err = store
        .atomically(|tx| -> Result<()> {
            runs.set(runs.get() + 1);
            let n: i64 = tx.read_tvar_as("c")?;
            // A competing commit lands between our read and our commit,
            // so every attempt conflicts.
            saboteur.atomically(|other| {
                let m: i64 = other.read_tvar_as("c")?;
                other.write_tvar("c", json!(m + 1))
            })?;
            tx.write_tvar("c", json!(n + 100))?;
            Ok(())
        })
        .unwrap_err();

    match err {
        Error::MaxRetriesExceeded { attempts } => assert_eq!(attempts, 3),
        other => panic!("expected MaxRetriesExceeded, got {:?}", other),
    }
    // The closure ran once per attempt
    assert_eq!(runs.get(), 3);
}

#[test]
fn conflicted_attempt_eventually_succeeds() {
    let store = counter_store();
    let saboteur = store.new_handle();

    // Sabotage only the first attempt; the retry should commit.
    let first = Cell::new(true);
    store
        .atomically(|tx| {
            let n: i64 = tx.read_tvar_as("c")?;
            if first.get() {
                first.set(false);
                saboteur.atomically(|other| {
                    let m: i64 = other.read_tvar_as("c")?;
                    other.write_tvar("c", json!(m + 1))
                })?;
            }
            tx.write_tvar("c", json!(n + 10))
        })
        .unwrap();

    // First attempt read 0, conflicted; retry read 1 and wrote 11.
    let doc = store.snapshot_record("c").unwrap().unwrap();
    assert_eq!(doc.value.as_i64(), Some(11));
    assert_eq!(doc.version, 2);
}

// ============================================================================
// Nested transactions
// ============================================================================

#[test]
fn nested_atomically_on_same_store_commits_independently() {
    let store = Store::in_memory().unwrap();
    store.new_tvar("log", json!([])).unwrap();
    store.new_tvar("n", json!(0)).unwrap();

    let err = store
        .atomically(|tx| -> Result<()> {
            tx.write_tvar("n", json!(7))?;
            // Inner transaction: independent commit, not atomic with us
            store.atomically(|inner| inner.update_tvar_path("log", "[0]", json!("ran")))?;
            Err(Error::user("outer abort"))
        })
        .unwrap_err();
    assert_eq!(err.to_string(), "outer abort");

    let log = store.snapshot_record("log").unwrap().unwrap();
    assert_eq!(log.value.as_inner(), &json!(["ran"]));
    let n = store.snapshot_record("n").unwrap().unwrap();
    assert_eq!(n.value.as_i64(), Some(0));
}
