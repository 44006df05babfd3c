use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio_rusqlite::Connection;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("Database connection error: {0}")]
    Connection(String),
}

/// What the manifest remembers about one ingested document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestEntry {
    pub document_id: String,
    pub fingerprint: String,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// SQLite record of which documents are in the index and in what version.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Connection>,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?;
            }
        }

        let conn = Connection::open(path)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        let db = Self { conn: Arc::new(conn) };
        db.initialize().await?;
        Ok(db)
    }

    pub async fn in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        let db = Self { conn: Arc::new(conn) };
        db.initialize().await?;
        Ok(db)
    }

    async fn initialize(&self) -> Result<(), DatabaseError> {
        self.conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS indexed_documents (
                    document_id TEXT PRIMARY KEY,
                    fingerprint TEXT NOT NULL,
                    chunk_count INTEGER NOT NULL,
                    ingested_at TEXT NOT NULL
                );"
            )?;
            Ok(())
        })
        .await?;

        info!("Manifest initialized successfully");
        Ok(())
    }

    pub async fn record_document(&self, entry: &ManifestEntry) -> Result<(), DatabaseError> {
        let document_id = entry.document_id.clone();
        let fingerprint = entry.fingerprint.clone();
        let chunk_count = entry.chunk_count.to_string();
        let ingested_at = entry.ingested_at.to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO indexed_documents (document_id, fingerprint, chunk_count, ingested_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    [&document_id, &fingerprint, &chunk_count, &ingested_at],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    pub async fn get_document(&self, document_id: &str) -> Result<Option<ManifestEntry>, DatabaseError> {
        let document_id = document_id.to_string();
        let rows = self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT document_id, fingerprint, chunk_count, ingested_at
                     FROM indexed_documents
                     WHERE document_id = ?1"
                )?;

                let rows = stmt.query_map([&document_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?;

                let mut found = Vec::new();
                for row in rows {
                    found.push(row?);
                }
                Ok(found)
            })
            .await?;

        Ok(rows.into_iter().next().map(Self::into_entry))
    }

    pub async fn list_documents(&self) -> Result<Vec<ManifestEntry>, DatabaseError> {
        let rows = self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT document_id, fingerprint, chunk_count, ingested_at
                     FROM indexed_documents
                     ORDER BY document_id"
                )?;

                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?;

                let mut documents = Vec::new();
                for row in rows {
                    documents.push(row?);
                }
                Ok(documents)
            })
            .await?;

        Ok(rows.into_iter().map(Self::into_entry).collect())
    }

    pub async fn remove_document(&self, document_id: &str) -> Result<bool, DatabaseError> {
        let document_id = document_id.to_string();
        let removed = self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    "DELETE FROM indexed_documents WHERE document_id = ?1",
                    [&document_id],
                )?;
                Ok(changed)
            })
            .await?;

        Ok(removed > 0)
    }

    fn into_entry((document_id, fingerprint, chunk_count, ingested_at): (String, String, i64, String)) -> ManifestEntry {
        ManifestEntry {
            document_id,
            fingerprint,
            chunk_count: chunk_count.max(0) as usize,
            ingested_at: DateTime::parse_from_rfc3339(&ingested_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, fingerprint: &str, chunks: usize) -> ManifestEntry {
        ManifestEntry {
            document_id: id.to_string(),
            fingerprint: fingerprint.to_string(),
            chunk_count: chunks,
            ingested_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn records_and_replaces_documents() {
        let db = Database::in_memory().await.unwrap();
        db.record_document(&entry("algoritmalar.pdf", "v1", 4)).await.unwrap();
        db.record_document(&entry("algoritmalar.pdf", "v2", 6)).await.unwrap();

        let stored = db.get_document("algoritmalar.pdf").await.unwrap().unwrap();
        assert_eq!(stored.fingerprint, "v2");
        assert_eq!(stored.chunk_count, 6);
        assert_eq!(db.list_documents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lists_in_name_order_and_removes() {
        let db = Database::in_memory().await.unwrap();
        db.record_document(&entry("b.pdf", "x", 1)).await.unwrap();
        db.record_document(&entry("a.pdf", "y", 2)).await.unwrap();

        let ids: Vec<String> = db.list_documents().await.unwrap()
            .into_iter()
            .map(|e| e.document_id)
            .collect();
        assert_eq!(ids, vec!["a.pdf", "b.pdf"]);

        assert!(db.remove_document("a.pdf").await.unwrap());
        assert!(!db.remove_document("a.pdf").await.unwrap());
        assert!(db.get_document("a.pdf").await.unwrap().is_none());
    }
}
