//! `TransactionalStore`: read-modify-write over JSON documents with
//! conflict retry.
//!
//! A transaction body may run more than once (every conflict re-runs it from
//! scratch), so it must be a pure function of what it reads.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::warn;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::{
    connection::Database,
    helpers::{apply_increment, is_conflict},
};
use crate::error::PipelineError;
use crate::storage::DocRef;

/// Operations available inside one transaction.
pub trait DocumentTxn {
    /// Read a document as of this transaction.
    fn read(&self, doc: &DocRef) -> Result<Option<Value>>;

    /// Create or replace a document.
    fn write(&self, doc: &DocRef, body: &Value) -> Result<()>;

    /// Create the document from `seed` if absent, then add each delta to its
    /// numeric field (dotted paths allowed). Returns the updated document.
    fn atomic_increment(&self, doc: &DocRef, seed: &Value, deltas: &[(&str, f64)]) -> Result<Value>;
}

impl<'t> dyn DocumentTxn + 't {
    pub fn read_as<T: DeserializeOwned>(&self, doc: &DocRef) -> Result<Option<T>> {
        self.read(doc)?
            .map(|value| {
                serde_json::from_value(value).with_context(|| format!("malformed document {doc}"))
            })
            .transpose()
    }

    pub fn write_as<T: Serialize>(&self, doc: &DocRef, value: &T) -> Result<()> {
        let body = serde_json::to_value(value)
            .with_context(|| format!("failed to serialize document {doc}"))?;
        self.write(doc, &body)
    }
}

#[async_trait]
pub trait TransactionalStore: Clone + Send + Sync + 'static {
    /// Run `body` atomically, re-running it on write conflicts.
    async fn transaction<T, F>(&self, label: &str, body: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&dyn DocumentTxn) -> Result<T> + Send + 'static;

    async fn get(&self, doc: &DocRef) -> Result<Option<Value>>;

    /// All documents of a collection as `(id, body)`, ordered by id.
    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>>;

    /// The most recently written document of a collection.
    async fn latest(&self, collection: &str) -> Result<Option<Value>>;
}

struct SqliteTxn<'c> {
    conn: &'c Connection,
}

impl DocumentTxn for SqliteTxn<'_> {
    fn read(&self, doc: &DocRef) -> Result<Option<Value>> {
        read_document(self.conn, doc)
    }

    fn write(&self, doc: &DocRef, body: &Value) -> Result<()> {
        write_document(self.conn, doc, body)
    }

    fn atomic_increment(&self, doc: &DocRef, seed: &Value, deltas: &[(&str, f64)]) -> Result<Value> {
        let mut current = match read_document(self.conn, doc)? {
            Some(existing) => existing,
            None => seed.clone(),
        };
        for (field, delta) in deltas {
            apply_increment(&mut current, field, *delta)
                .with_context(|| format!("increment on {doc}"))?;
        }
        write_document(self.conn, doc, &current)?;
        Ok(current)
    }
}

pub(crate) fn read_document(conn: &Connection, doc: &DocRef) -> Result<Option<Value>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM documents WHERE collection = ?1 AND doc_id = ?2",
            params![doc.collection, doc.id],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("failed to read {doc}"))?;

    body.map(|raw| {
        serde_json::from_str(&raw).with_context(|| format!("stored document {doc} is not JSON"))
    })
    .transpose()
}

fn write_document(conn: &Connection, doc: &DocRef, body: &Value) -> Result<()> {
    let serialized = serde_json::to_string(body)?;
    conn.execute(
        "INSERT INTO documents (collection, doc_id, body, version, revision, updated_at)
         VALUES (?1, ?2, ?3, 1, (SELECT COALESCE(MAX(revision), 0) + 1 FROM documents), ?4)
         ON CONFLICT(collection, doc_id) DO UPDATE SET
             body = excluded.body,
             version = documents.version + 1,
             revision = excluded.revision,
             updated_at = excluded.updated_at",
        params![doc.collection, doc.id, serialized, Utc::now().to_rfc3339()],
    )
    .with_context(|| format!("failed to write {doc}"))?;
    Ok(())
}

fn conflict_backoff(attempt: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..10);
    Duration::from_millis(10 * u64::from(attempt) + jitter)
}

fn attempt_once<T, F>(conn: &mut Connection, body: &F) -> Result<T>
where
    F: Fn(&dyn DocumentTxn) -> Result<T>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = body(&SqliteTxn { conn: &tx })?;
    tx.commit()?;
    Ok(value)
}

fn run_transaction<T, F>(conn: &mut Connection, label: &str, attempts: u32, body: &F) -> Result<T>
where
    F: Fn(&dyn DocumentTxn) -> Result<T>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match attempt_once(conn, body) {
            Ok(value) => return Ok(value),
            Err(err) if is_conflict(&err) && attempt < attempts => {
                warn!("transaction '{label}' conflicted (attempt {attempt}/{attempts}); retrying");
                std::thread::sleep(conflict_backoff(attempt));
            }
            Err(err) if is_conflict(&err) => {
                warn!("transaction '{label}' gave up after {attempts} attempts: {err:#}");
                return Err(PipelineError::TransactionConflict { attempts }.into());
            }
            Err(err) => return Err(err.context(format!("transaction '{label}' failed"))),
        }
    }
}

#[async_trait]
impl TransactionalStore for Database {
    async fn transaction<T, F>(&self, label: &str, body: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&dyn DocumentTxn) -> Result<T> + Send + 'static,
    {
        let label = label.to_string();
        let attempts = self.max_transaction_attempts;
        self.execute(move |conn| run_transaction(conn, &label, attempts, &body))
            .await
    }

    async fn get(&self, doc: &DocRef) -> Result<Option<Value>> {
        self.get_document(doc).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>> {
        self.list_documents(collection).await
    }

    async fn latest(&self, collection: &str) -> Result<Option<Value>> {
        self.latest_document(collection).await
    }
}
