//! Conflict handling of the SQLite document store when another connection
//! holds the write lock.

use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use engagement_lib::settings::AggregationSettings;
use engagement_lib::storage::DocRef;
use engagement_lib::{AggregationStore, Database, PipelineError, TransactionalStore};
use rusqlite::Connection;
use serde_json::json;
use tempfile::TempDir;

/// A second connection that has taken the write lock.
fn lock_writer(path: &Path) -> Connection {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch("BEGIN IMMEDIATE").unwrap();
    conn
}

#[tokio::test]
async fn test_exhausted_retries_surface_as_conflict() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.sqlite3");
    let db = Database::new(path.clone()).unwrap().with_transaction_attempts(2);
    let blocker = lock_writer(&path);

    let doc = DocRef::new("meetings", "standup");
    let err = db
        .transaction("write", move |txn| txn.write(&doc, &json!({"title": "Standup"})))
        .await
        .unwrap_err();
    blocker.execute_batch("ROLLBACK").unwrap();

    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::TransactionConflict { attempts }) => assert_eq!(*attempts, 2),
        other => panic!("expected a typed conflict, got {other:?} from {err:#}"),
    }
    assert!(db.get(&DocRef::new("meetings", "standup")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_write_lands_once_the_lock_clears() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.sqlite3");
    let db = Database::new(path.clone()).unwrap().with_transaction_attempts(10);

    let (locked_tx, locked_rx) = mpsc::channel();
    let holder = thread::spawn(move || {
        let conn = lock_writer(&path);
        locked_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(400));
        conn.execute_batch("COMMIT").unwrap();
    });
    locked_rx.recv().unwrap();

    let doc = DocRef::new("meetings", "standup");
    let body = json!({"title": "Standup"});
    let expected = body.clone();
    db.transaction("write", move |txn| txn.write(&doc, &body))
        .await
        .unwrap();
    holder.join().unwrap();

    let stored = db.get(&DocRef::new("meetings", "standup")).await.unwrap();
    assert_eq!(stored, Some(expected));
}

#[tokio::test]
async fn test_configured_attempt_budget_bounds_aggregate_updates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.sqlite3");
    let settings = AggregationSettings {
        max_transaction_attempts: 1,
        ..AggregationSettings::default()
    };
    let db = Database::from_settings(path.clone(), &settings).unwrap();
    let store = AggregationStore::new(db, settings.bucket_width_ms).unwrap();
    let blocker = lock_writer(&path);

    let err = store
        .update_participant_aggregate("standup", "ana", 1_700_000_000_000, 0.5)
        .await
        .unwrap_err();
    blocker.execute_batch("ROLLBACK").unwrap();

    assert!(matches!(err, PipelineError::TransactionConflict { attempts: 1 }));
    assert!(err.is_retryable());
    assert!(store
        .participant_aggregate("standup", "ana")
        .await
        .unwrap()
        .is_none());
}
