//! Query-time retrieval: question → embedding → filtered top-K → context.
//!
//! [`RetrievalService`] only composes the store request and formats the
//! answer. Similarity and indexing belong to the [`VectorStore`].

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::embedding::Embedder;
use crate::models::{RetrievedLine, TimeFilter};
use crate::store::VectorStore;
use crate::time_intent::TimeWindow;
use crate::timestamp::now_epoch;

/// Context returned when no stored line matches.
pub const NO_RESULTS: &str = "No relevant logs found.";

/// Number of lines handed to the model by default.
pub const DEFAULT_TOP_K: usize = 5;

/// Everything a query produced, for callers that want more than the blob.
#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    pub window: Option<TimeWindow>,
    pub filter: Option<TimeFilter>,
    pub lines: Vec<RetrievedLine>,
    pub context: String,
}

#[derive(Clone)]
pub struct RetrievalService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
}

impl RetrievalService {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Ranked lines for `query`, restricted by `filter` when present.
    pub async fn retrieve_lines(
        &self,
        query: &str,
        filter: Option<&TimeFilter>,
    ) -> Result<Vec<RetrievedLine>> {
        let vector = self.embedder.embed(query).await?;
        self.store.query(&vector, self.top_k, filter).await
    }

    /// Context blob for `query`: one line per hit, best first.
    pub async fn retrieve(&self, query: &str, filter: Option<&TimeFilter>) -> Result<String> {
        let lines = self.retrieve_lines(query, filter).await?;
        Ok(format_context(&lines))
    }

    /// Derive the time filter from the query's wording, then retrieve.
    pub async fn search(&self, query: &str) -> Result<Retrieval> {
        let window = TimeWindow::detect(query);
        let filter = window.map(|w| w.filter_at(now_epoch()));
        let lines = self.retrieve_lines(query, filter.as_ref()).await?;
        let context = format_context(&lines);
        Ok(Retrieval {
            window,
            filter,
            lines,
            context,
        })
    }
}

/// Join hit texts with newlines, or return [`NO_RESULTS`].
pub fn format_context(lines: &[RetrievedLine]) -> String {
    if lines.is_empty() {
        return NO_RESULTS.to_string();
    }
    lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
