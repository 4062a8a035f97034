//! Core data models that flow through ingestion and retrieval.

use serde::Serialize;

use crate::identity::line_id;
use crate::timestamp::extract_timestamp;

/// One line read from the log file.
///
/// `text` excludes the line terminator. `id` is derived from the exact
/// bytes the line was read from, so identical bytes always map to the
/// same id regardless of offset or observation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub id: String,
    pub text: String,
    pub offset: u64,
}

impl LogLine {
    /// Build a line from raw bytes, decoding permissively.
    pub fn from_bytes(bytes: &[u8], offset: u64) -> Self {
        Self {
            id: line_id(bytes),
            text: String::from_utf8_lossy(bytes).into_owned(),
            offset,
        }
    }

    /// Whitespace-only lines are never ingested.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// The persisted unit, keyed by line id.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub id: String,
    pub text: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub vector: Vec<f32>,
}

impl LogRecord {
    /// Pair a line with its embedding, stamping it from its own text.
    pub fn from_line(line: &LogLine, vector: Vec<f32>) -> Self {
        Self {
            id: line.id.clone(),
            text: line.text.clone(),
            timestamp: extract_timestamp(&line.text),
            vector,
        }
    }
}

/// Restricts a query to records with `timestamp >= since`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeFilter {
    pub since: f64,
}

impl TimeFilter {
    pub fn since(since: f64) -> Self {
        Self { since }
    }

    pub fn admits(&self, timestamp: f64) -> bool {
        timestamp >= self.since
    }
}

/// A stored line returned from a similarity query, best match first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedLine {
    pub id: String,
    pub text: String,
    pub timestamp: f64,
    /// Cosine similarity against the query vector.
    pub score: f64,
}
