//! In-memory [`VectorStore`] for tests and embedding into other hosts.
//!
//! Records live in a `HashMap` behind `std::sync::RwLock`; queries are a
//! brute-force cosine scan.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{LogRecord, RetrievedLine, TimeFilter};

use super::{rank_top_k, VectorStore};

#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, LogRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a record by id.
    pub fn get(&self, id: &str) -> Option<LogRecord> {
        self.records.read().ok()?.get(id).cloned()
    }
}

fn poisoned() -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert(&self, records: &[LogRecord]) -> Result<()> {
        let mut stored = self.records.write().map_err(|_| poisoned())?;
        for record in records {
            stored.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&TimeFilter>,
    ) -> Result<Vec<RetrievedLine>> {
        let stored = self.records.read().map_err(|_| poisoned())?;
        let candidates = stored
            .values()
            .filter(|r| filter.map_or(true, |f| f.admits(r.timestamp)))
            .map(|r| RetrievedLine {
                id: r.id.clone(),
                text: r.text.clone(),
                timestamp: r.timestamp,
                score: cosine_similarity(vector, &r.vector) as f64,
            })
            .collect();
        Ok(rank_top_k(candidates, k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().map_err(|_| poisoned())?.len())
    }
}
