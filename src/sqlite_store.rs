//! SQLite-backed [`VectorStore`].
//!
//! Records live in the `log_records` table keyed by `(collection, id)`.
//! Vectors are stored as little-endian f32 BLOBs and ranked by cosine
//! similarity in Rust after the timestamp filter is applied in SQL.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use loglens_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use loglens_core::models::{LogRecord, RetrievedLine, TimeFilter};
use loglens_core::store::{rank_top_k, VectorStore};

use crate::config::Config;
use crate::{db, migrate};

pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    /// Connect using `[db]` settings and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool, config.db.collection.clone()))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn score_row(row: &SqliteRow, query_vec: &[f32]) -> RetrievedLine {
    let blob: Vec<u8> = row.get("embedding");
    let vector = blob_to_vec(&blob);
    RetrievedLine {
        id: row.get("id"),
        text: row.get("text"),
        timestamp: row.get("timestamp"),
        score: cosine_similarity(query_vec, &vector) as f64,
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert(&self, records: &[LogRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO log_records (collection, id, text, timestamp, embedding, dims, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    text = excluded.text,
                    timestamp = excluded.timestamp,
                    embedding = excluded.embedding,
                    dims = excluded.dims,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&self.collection)
            .bind(&record.id)
            .bind(&record.text)
            .bind(record.timestamp)
            .bind(vec_to_blob(&record.vector))
            .bind(record.vector.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&TimeFilter>,
    ) -> Result<Vec<RetrievedLine>> {
        let rows = match filter {
            Some(f) => {
                sqlx::query(
                    "SELECT id, text, timestamp, embedding FROM log_records WHERE collection = ? AND timestamp >= ?",
                )
                .bind(&self.collection)
                .bind(f.since)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, text, timestamp, embedding FROM log_records WHERE collection = ?",
                )
                .bind(&self.collection)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let candidates = rows.iter().map(|row| score_row(row, vector)).collect();
        Ok(rank_top_k(candidates, k))
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM log_records WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}
