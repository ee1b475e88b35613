use anyhow::{Context, Result};
use rusqlite::params;
use serde_json::Value;

use crate::db::{connection::Database, transactional::read_document};
use crate::storage::DocRef;

fn parse_body(collection: &str, id: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw)
        .with_context(|| format!("stored document {collection}/{id} is not JSON"))
}

impl Database {
    /// Fetch a single document outside any transaction.
    pub async fn get_document(&self, doc: &DocRef) -> Result<Option<Value>> {
        let doc = doc.clone();
        self.execute(move |conn| read_document(conn, &doc)).await
    }

    /// List a collection's direct documents, ordered by id.
    pub async fn list_documents(&self, collection: &str) -> Result<Vec<(String, Value)>> {
        let collection = collection.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT doc_id, body FROM documents
                 WHERE collection = ?1
                 ORDER BY doc_id ASC",
            )?;

            let rows = stmt.query_map(params![collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut documents = Vec::new();
            for row in rows {
                let (id, raw) = row?;
                let body = parse_body(&collection, &id, &raw)?;
                documents.push((id, body));
            }
            Ok(documents)
        })
        .await
    }

    /// The document in `collection` written most recently.
    pub async fn latest_document(&self, collection: &str) -> Result<Option<Value>> {
        let collection = collection.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT doc_id, body FROM documents
                 WHERE collection = ?1
                 ORDER BY revision DESC
                 LIMIT 1",
            )?;

            let mut rows = stmt.query(params![collection])?;
            match rows.next()? {
                Some(row) => {
                    let id: String = row.get(0)?;
                    let raw: String = row.get(1)?;
                    Ok(Some(parse_body(&collection, &id, &raw)?))
                }
                None => Ok(None),
            }
        })
        .await
    }
}
