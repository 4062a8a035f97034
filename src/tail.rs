//! Live tailing of the log file.
//!
//! [`TailWatcher`] owns the read cursor and turns appended bytes into
//! complete [`LogLine`]s. [`LineIngester`] embeds and upserts them one at a
//! time, in file order. [`SharedTail`] runs the file reads on the blocking
//! pool. [`watch_changes`] wires a filesystem watcher to a
//! [`Notify`] so the ingest loop wakes as soon as the file changes.
//!
//! # Rotation and truncation
//!
//! Every read compares the file with what the watcher last saw:
//!
//! - file shorter than the cursor → truncated, restart from offset 0
//! - different inode (Unix) → replaced, restart from offset 0
//! - file missing → recreate it empty, restart from offset 0

use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{watch, Notify};

use loglens_core::embedding::Embedder;
use loglens_core::models::{LogLine, LogRecord};
use loglens_core::store::VectorStore;

use crate::logfile;

type FileIdentity = (u64, u64);

#[cfg(unix)]
fn file_identity(meta: &fs::Metadata) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_identity(_meta: &fs::Metadata) -> Option<FileIdentity> {
    None
}

pub struct TailWatcher {
    path: PathBuf,
    /// Bytes read so far, including the unterminated fragment in `pending`.
    read_offset: u64,
    pending: Vec<u8>,
    identity: Option<FileIdentity>,
}

impl TailWatcher {
    /// Start tailing `path` at `offset`, creating the file if it is missing.
    ///
    /// An offset past the end of the file (the file shrank since it was
    /// measured) is clamped to the current length.
    pub fn open_at(path: &Path, offset: u64) -> Result<Self> {
        logfile::ensure_log_file(path)?;
        let meta = fs::metadata(path)
            .with_context(|| format!("Failed to stat log file: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            read_offset: offset.min(meta.len()),
            pending: Vec::new(),
            identity: file_identity(&meta),
        })
    }

    /// Start tailing at the current end of the file.
    pub fn open_at_end(path: &Path) -> Result<Self> {
        Self::open_at(path, u64::MAX)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset just past the last line handed out.
    pub fn cursor(&self) -> u64 {
        self.read_offset - self.pending.len() as u64
    }

    fn reset(&mut self) {
        self.read_offset = 0;
        self.pending.clear();
    }

    /// Read everything appended since the last call and return the complete
    /// lines, in file order.
    pub fn read_appended(&mut self) -> Result<Vec<LogLine>> {
        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "log file disappeared; recreating it");
                logfile::ensure_log_file(&self.path)?;
                self.reset();
                self.identity = fs::metadata(&self.path).ok().and_then(|m| file_identity(&m));
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to stat log file: {}", self.path.display()))
            }
        };

        let identity = file_identity(&meta);
        if identity != self.identity {
            tracing::info!(path = %self.path.display(), "log file replaced; reading from start");
            self.reset();
            self.identity = identity;
        } else if meta.len() < self.read_offset {
            tracing::info!(
                path = %self.path.display(),
                len = meta.len(),
                cursor = self.read_offset,
                "log file truncated; reading from start"
            );
            self.reset();
        }

        if meta.len() == self.read_offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)
            .with_context(|| format!("Failed to open log file: {}", self.path.display()))?;
        file.seek(SeekFrom::Start(self.read_offset))?;
        let mut appended = Vec::new();
        let n = file
            .read_to_end(&mut appended)
            .with_context(|| format!("Failed to read log file: {}", self.path.display()))?;
        self.read_offset += n as u64;
        self.pending.extend_from_slice(&appended);

        let base = self.read_offset - self.pending.len() as u64;
        let (lines, consumed) = logfile::split_complete_lines(&self.pending, base);
        self.pending.drain(..consumed);
        Ok(lines)
    }
}

/// A [`TailWatcher`] whose reads run on the blocking pool.
#[derive(Clone)]
pub struct SharedTail(Arc<Mutex<TailWatcher>>);

impl SharedTail {
    pub fn new(tail: TailWatcher) -> Self {
        Self(Arc::new(Mutex::new(tail)))
    }

    pub fn cursor(&self) -> u64 {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).cursor()
    }

    /// [`TailWatcher::read_appended`] on a `spawn_blocking` thread.
    pub async fn read_appended(&self) -> Result<Vec<LogLine>> {
        let inner = self.0.clone();
        tokio::task::spawn_blocking(move || {
            inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .read_appended()
        })
        .await
        .context("log read task failed")?
    }
}

/// Outcome of ingesting one batch of appended lines.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TailCycle {
    pub ingested: usize,
    pub failed: usize,
    /// Shutdown arrived before every line was attempted.
    pub interrupted: bool,
}

/// Embeds and upserts lines one record at a time.
#[derive(Clone)]
pub struct LineIngester {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl LineIngester {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    pub async fn ingest(&self, line: &LogLine) -> Result<()> {
        let vector = self.embedder.embed(&line.text).await?;
        self.store
            .upsert(&[LogRecord::from_line(line, vector)])
            .await
    }

    /// Ingest non-blank lines in order. Failures are logged and counted; the
    /// remaining lines are still attempted.
    ///
    /// Stops at the first shutdown signal, abandoning the line in flight.
    /// Lines left behind are picked up by the next gap-fill.
    pub async fn ingest_all(
        &self,
        lines: &[LogLine],
        shutdown: &mut watch::Receiver<bool>,
    ) -> TailCycle {
        let mut cycle = TailCycle::default();
        for line in lines.iter().filter(|l| !l.is_blank()) {
            if *shutdown.borrow() {
                cycle.interrupted = true;
                break;
            }
            let result = tokio::select! {
                _ = shutdown.changed() => {
                    cycle.interrupted = true;
                    break;
                }
                result = self.ingest(line) => result,
            };
            match result {
                Ok(()) => {
                    cycle.ingested += 1;
                    tracing::debug!(offset = line.offset, "ingested line");
                }
                Err(e) => {
                    cycle.failed += 1;
                    tracing::warn!(error = %e, offset = line.offset, "failed to ingest line");
                }
            }
        }
        if cycle.interrupted {
            tracing::info!(ingested = cycle.ingested, "line ingest interrupted by shutdown");
        }
        cycle
    }
}

/// Watch the directory holding `path` and signal `wake` whenever the file
/// itself is touched. The returned watcher must be kept alive.
pub fn watch_changes(path: &Path, wake: Arc<Notify>) -> Result<RecommendedWatcher> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path.file_name().map(|n| n.to_os_string());

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                let relevant = event.paths.is_empty()
                    || event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                if relevant {
                    wake.notify_one();
                }
            }
            Err(e) => tracing::warn!(error = %e, "file watcher error"),
        }
    })
    .context("Failed to create file watcher")?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch directory: {}", dir.display()))?;
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn append(path: &Path, bytes: &[u8]) {
        let mut f = fs::OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(bytes).unwrap();
    }

    fn texts(lines: &[LogLine]) -> Vec<String> {
        lines.iter().map(|l| l.text.clone()).collect()
    }

    #[test]
    fn test_open_at_end_skips_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("system.log");
        fs::write(&path, b"old\n").unwrap();

        let mut tail = TailWatcher::open_at_end(&path).unwrap();
        assert_eq!(tail.cursor(), 4);
        assert!(tail.read_appended().unwrap().is_empty());

        append(&path, b"new\n");
        assert_eq!(texts(&tail.read_appended().unwrap()), vec!["new"]);
        assert_eq!(tail.cursor(), 8);
    }

    #[test]
    fn test_fragment_waits_for_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("system.log");
        let mut tail = TailWatcher::open_at(&path, 0).unwrap();

        append(&path, b"L1\nL2 half");
        let lines = tail.read_appended().unwrap();
        assert_eq!(texts(&lines), vec!["L1"]);
        assert_eq!(tail.cursor(), 3);

        append(&path, b" done\n");
        let lines = tail.read_appended().unwrap();
        assert_eq!(texts(&lines), vec!["L2 half done"]);
        assert_eq!(lines[0].offset, 3);
        assert_eq!(tail.cursor(), 16);
    }

    #[test]
    fn test_cursor_is_monotonic_while_appending() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("system.log");
        let mut tail = TailWatcher::open_at(&path, 0).unwrap();
        let mut last = tail.cursor();
        for i in 0..20 {
            append(&path, format!("line {}\n", i).as_bytes());
            tail.read_appended().unwrap();
            assert!(tail.cursor() > last);
            last = tail.cursor();
        }
    }

    #[test]
    fn test_truncation_restarts_from_zero() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("system.log");
        fs::write(&path, b"a fairly long first line\nsecond\n").unwrap();
        let mut tail = TailWatcher::open_at_end(&path).unwrap();

        // Truncate in place (same inode) and write something shorter.
        fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        append(&path, b"fresh\n");

        assert_eq!(texts(&tail.read_appended().unwrap()), vec!["fresh"]);
        assert_eq!(tail.cursor(), 6);
    }

    #[test]
    fn test_missing_file_is_recreated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("system.log");
        fs::write(&path, b"before\n").unwrap();
        let mut tail = TailWatcher::open_at_end(&path).unwrap();

        fs::remove_file(&path).unwrap();
        assert!(tail.read_appended().unwrap().is_empty());
        assert!(path.exists());
        assert_eq!(tail.cursor(), 0);

        append(&path, b"after\n");
        assert_eq!(texts(&tail.read_appended().unwrap()), vec!["after"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_replaced_file_is_read_from_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("system.log");
        fs::write(&path, b"rotated away 1\nrotated away 2\n").unwrap();
        let mut tail = TailWatcher::open_at_end(&path).unwrap();

        // Rotate: move the old file aside and create a new, longer one.
        fs::rename(&path, dir.path().join("system.log.1")).unwrap();
        fs::write(&path, b"new file line one\nnew file line two\nthree\n").unwrap();

        assert_eq!(
            texts(&tail.read_appended().unwrap()),
            vec!["new file line one", "new file line two", "three"]
        );
    }

    #[tokio::test]
    async fn test_shared_tail_reads_on_blocking_pool() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("system.log");
        let tail = SharedTail::new(TailWatcher::open_at(&path, 0).unwrap());

        append(&path, b"one\ntwo\n");
        let lines = tail.read_appended().await.unwrap();
        assert_eq!(texts(&lines), vec!["one", "two"]);
        assert_eq!(tail.cursor(), 8);
        assert!(tail.read_appended().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_all_stops_when_already_shut_down() {
        let store = Arc::new(loglens_core::store::memory::InMemoryStore::new());
        let ingester = LineIngester::new(Arc::new(Unit), store.clone());
        let lines = vec![LogLine::from_bytes(b"a", 0), LogLine::from_bytes(b"b", 2)];

        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        let cycle = ingester.ingest_all(&lines, &mut rx).await;
        assert!(cycle.interrupted);
        assert_eq!(cycle.ingested, 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    struct Unit;

    #[async_trait::async_trait]
    impl Embedder for Unit {
        fn model_name(&self) -> &str {
            "unit"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }
}
