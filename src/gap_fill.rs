//! Startup catch-up: reconcile the last N lines of the log with the store.
//!
//! Lines written while the process was down are picked up here. Because
//! records are keyed by content hash, re-reconciling lines that are already
//! stored just overwrites them in place.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use loglens_core::embedding::Embedder;
use loglens_core::models::{LogLine, LogRecord};
use loglens_core::store::VectorStore;

use crate::logfile;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GapFillStats {
    pub lines_scanned: usize,
    pub blank_skipped: usize,
    pub duplicates_skipped: usize,
    pub upserted: usize,
    /// Offset just past the last complete line that was scanned.
    pub end_offset: u64,
}

pub struct GapFillReconciler {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    max_lines: usize,
}

impl GapFillReconciler {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, max_lines: usize) -> Self {
        Self {
            embedder,
            store,
            max_lines,
        }
    }

    /// Reconcile the tail of `path`, creating the file if it is missing.
    pub async fn run(&self, path: &Path) -> Result<GapFillStats> {
        logfile::ensure_log_file(path)?;

        let owned: PathBuf = path.to_path_buf();
        let max_lines = self.max_lines;
        let snapshot = tokio::task::spawn_blocking(move || logfile::read_tail_lines(&owned, max_lines))
            .await
            .context("gap-fill reader task failed")??;

        let mut stats = GapFillStats {
            lines_scanned: snapshot.lines.len(),
            end_offset: snapshot.end_offset,
            ..Default::default()
        };

        let staged = stage_lines(snapshot.lines, &mut stats);
        if staged.is_empty() {
            tracing::info!(path = %path.display(), "gap fill: nothing to reconcile");
            return Ok(stats);
        }

        let texts: Vec<String> = staged.iter().map(|l| l.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        let records: Vec<LogRecord> = staged
            .iter()
            .zip(vectors)
            .map(|(line, vector)| LogRecord::from_line(line, vector))
            .collect();

        self.store.upsert(&records).await?;
        stats.upserted = records.len();

        tracing::info!(
            path = %path.display(),
            scanned = stats.lines_scanned,
            duplicates = stats.duplicates_skipped,
            upserted = stats.upserted,
            "gap fill complete"
        );
        Ok(stats)
    }
}

/// Drop blank lines and repeats, keeping the first occurrence in file order.
fn stage_lines(lines: Vec<LogLine>, stats: &mut GapFillStats) -> Vec<LogLine> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut staged = Vec::with_capacity(lines.len());
    for line in lines {
        if line.is_blank() {
            stats.blank_skipped += 1;
            continue;
        }
        if !seen.insert(line.id.clone()) {
            stats.duplicates_skipped += 1;
            continue;
        }
        staged.push(line);
    }
    staged
}
