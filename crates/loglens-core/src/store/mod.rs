//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the only storage surface the ingestion and
//! retrieval pipeline needs: keyed upsert and nearest-neighbor query with
//! an optional timestamp lower bound. Backends (SQLite in the app crate,
//! [`memory::InMemoryStore`] here) own similarity and indexing.
//!
//! Each operation must be individually atomic and safe to call from many
//! tasks at once. The pipeline takes no lock around the store and does not
//! rely on isolation across operations.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{LogRecord, RetrievedLine, TimeFilter};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite records by id.
    ///
    /// Upserting an id that already exists replaces it in place; the store
    /// never holds two records with the same id.
    async fn upsert(&self, records: &[LogRecord]) -> Result<()>;

    /// Return up to `k` records ranked by descending similarity to
    /// `vector`, restricted to `timestamp >= filter.since` when a filter is
    /// given.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&TimeFilter>,
    ) -> Result<Vec<RetrievedLine>>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize>;
}

/// Rank candidates best-first and keep the top `k`.
///
/// Ties keep a stable order by id so results are deterministic.
pub fn rank_top_k(mut candidates: Vec<RetrievedLine>, k: usize) -> Vec<RetrievedLine> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates.truncate(k);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, score: f64) -> RetrievedLine {
        RetrievedLine {
            id: id.to_string(),
            text: id.to_string(),
            timestamp: 0.0,
            score,
        }
    }

    #[test]
    fn test_rank_orders_and_truncates() {
        let ranked = rank_top_k(vec![line("a", 0.1), line("b", 0.9), line("c", 0.5)], 2);
        let ids: Vec<&str> = ranked.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_rank_ties_by_id() {
        let ranked = rank_top_k(vec![line("z", 0.5), line("m", 0.5)], 5);
        assert_eq!(ranked[0].id, "m");
    }
}
