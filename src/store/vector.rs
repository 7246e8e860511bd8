//! Vector store adapter
//!
//! One SQLite database holds every collection: a `collections` table with
//! the declared dimension and metric, and a `points` table with the raw
//! vector bytes plus the JSON payload. Search narrows candidates with the
//! compiled filter conjunction in SQL, then scores them with cosine
//! similarity in process.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use serde_json::Value;
use tracing::debug;

use crate::embedding::cosine_similarity;
use crate::error::{MnemonError, Result};
use crate::store::filter::{compile_filters, FilterCond};

/// A stored point
#[derive(Debug, Clone)]
pub struct PointRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

/// A search hit with its cosine score
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Value,
}

/// SQLite-backed vector store
pub struct VectorStore {
    conn: Arc<Mutex<Connection>>,
}

impl VectorStore {
    /// Open or create the backing database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = if path.to_str() == Some(":memory:") {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        };
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=30000;

            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                dim INTEGER NOT NULL,
                metric TEXT NOT NULL DEFAULT 'cosine'
            );
            CREATE TABLE IF NOT EXISTS points (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                vector BLOB NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );
            "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Idempotent collection creation with cosine metric. Re-creating with
    /// a different dimension is an error.
    pub fn ensure_collection(&self, name: &str, dim: usize) -> Result<()> {
        let conn = self.conn.lock();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT dim FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(ignore_no_rows)?;
        match existing {
            Some(declared) if declared as usize != dim => Err(MnemonError::Database(format!(
                "collection '{name}' declared with dim {declared}, requested {dim}"
            ))),
            Some(_) => Ok(()),
            None => {
                conn.execute(
                    "INSERT INTO collections (name, dim, metric) VALUES (?1, ?2, 'cosine')",
                    params![name, dim as i64],
                )?;
                debug!(collection = name, dim, "created vector collection");
                Ok(())
            }
        }
    }

    fn collection_dim(&self, conn: &Connection, name: &str) -> Result<usize> {
        let dim: i64 = conn
            .query_row(
                "SELECT dim FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(|_| MnemonError::Database(format!("unknown collection '{name}'")))?;
        Ok(dim as usize)
    }

    /// Insert or replace the point with `point_id`
    pub fn upsert(
        &self,
        collection: &str,
        point_id: &str,
        vector: &[f32],
        payload: &Value,
    ) -> Result<()> {
        let conn = self.conn.lock();
        let dim = self.collection_dim(&conn, collection)?;
        if vector.len() != dim {
            return Err(MnemonError::InvalidInput(format!(
                "vector dimension {} does not match collection '{}' dim {}",
                vector.len(),
                collection,
                dim
            )));
        }
        conn.execute(
            "INSERT OR REPLACE INTO points (collection, id, vector, payload) VALUES (?1, ?2, ?3, ?4)",
            params![collection, point_id, vector_to_blob(vector), payload.to_string()],
        )?;
        Ok(())
    }

    /// Fetch a point by id
    pub fn get(&self, collection: &str, point_id: &str) -> Result<Option<PointRecord>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, vector, payload FROM points WHERE collection = ?1 AND id = ?2",
                params![collection, point_id],
                |row| {
                    let id: String = row.get(0)?;
                    let blob: Vec<u8> = row.get(1)?;
                    let payload: String = row.get(2)?;
                    Ok((id, blob, payload))
                },
            )
            .map(Some)
            .or_else(ignore_no_rows)?;
        row.map(|(id, blob, payload)| {
            Ok(PointRecord {
                id,
                vector: blob_to_vector(&blob),
                payload: serde_json::from_str(&payload)?,
            })
        })
        .transpose()
    }

    /// Delete points by id. Missing ids are ignored.
    pub fn delete(&self, collection: &str, point_ids: &[String]) -> Result<()> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("DELETE FROM points WHERE collection = ?1 AND id = ?2")?;
        for point_id in point_ids {
            stmt.execute(params![collection, point_id])?;
        }
        Ok(())
    }

    /// Cosine search over points matching the filter conjunction.
    /// Ties break on ascending id so runs are reproducible.
    pub fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        user_id: Option<&str>,
        filters: &[FilterCond],
    ) -> Result<Vec<ScoredPoint>> {
        let mut conditions: Vec<FilterCond> = Vec::with_capacity(filters.len() + 1);
        if let Some(user_id) = user_id {
            conditions.push(FilterCond::eq("user_id", user_id));
        }
        conditions.extend(filters.iter().cloned());
        let (filter_sql, mut filter_params) = compile_filters(&conditions)?;

        let conn = self.conn.lock();
        let dim = self.collection_dim(&conn, collection)?;
        if vector.len() != dim {
            return Err(MnemonError::InvalidInput(format!(
                "query vector dimension {} does not match collection '{}' dim {}",
                vector.len(),
                collection,
                dim
            )));
        }

        let sql = format!(
            "SELECT id, vector, payload FROM points WHERE collection = ? AND {filter_sql}"
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(collection.to_string())];
        params.append(&mut filter_params);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(param_refs.as_slice())?;

        let mut scored: Vec<ScoredPoint> = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            let payload: String = row.get(2)?;
            let score = cosine_similarity(vector, &blob_to_vector(&blob));
            scored.push(ScoredPoint {
                id,
                score,
                payload: serde_json::from_str(&payload)?,
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    /// Total points in a collection
    pub fn count(&self, collection: &str) -> Result<i64> {
        let conn = self.conn.lock();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM points WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?)
    }

    /// Round-trip latency of a trivial query, for health checks
    pub fn ping(&self) -> Result<f64> {
        let start = std::time::Instant::now();
        let conn = self.conn.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }
}

fn ignore_no_rows<T>(e: rusqlite::Error) -> std::result::Result<Option<T>, rusqlite::Error> {
    match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other),
    }
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
