use anyhow::{bail, Result};
use async_trait::async_trait;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

use loglens::gap_fill::GapFillReconciler;
use loglens::service::{IngestPhase, IngestService, IngestSettings};
use loglens_core::embedding::Embedder;
use loglens_core::models::{LogRecord, RetrievedLine, TimeFilter};
use loglens_core::retrieval::{RetrievalService, NO_RESULTS};
use loglens_core::store::memory::InMemoryStore;
use loglens_core::store::VectorStore;

const KEYWORDS: &[&[&str]] = &[
    &["alice"],
    &["login", "logged"],
    &["disk", "full"],
    &["error", "failed"],
    &["L1"],
    &["L2"],
];

/// One axis per keyword group plus a constant axis, so no vector is zero.
/// Counts every text it embeds.
#[derive(Default)]
struct Keywords {
    embedded: AtomicUsize,
    /// Refuse batches larger than one text (simulates a failing gap-fill).
    single_only: bool,
}

#[async_trait]
impl Embedder for Keywords {
    fn model_name(&self) -> &str {
        "keywords"
    }
    fn dims(&self) -> usize {
        KEYWORDS.len() + 1
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.single_only && texts.len() > 1 {
            bail!("batch embedding unavailable");
        }
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v: Vec<f32> = KEYWORDS
                    .iter()
                    .map(|group| {
                        if group.iter().any(|k| t.contains(k)) {
                            1.0
                        } else {
                            0.0
                        }
                    })
                    .collect();
                v.push(0.1);
                v
            })
            .collect())
    }
}

/// Takes `delay` per call, like a remote embedder under load.
struct Slow {
    delay: Duration,
    started: AtomicUsize,
}

impl Slow {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for Slow {
    fn model_name(&self) -> &str {
        "slow"
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(texts.iter().map(|_| vec![1.0, 0.1]).collect())
    }
}

/// Remembers the order of upserted ids.
#[derive(Default)]
struct Recording {
    inner: InMemoryStore,
    order: Mutex<Vec<String>>,
}

#[async_trait]
impl VectorStore for Recording {
    async fn upsert(&self, records: &[LogRecord]) -> Result<()> {
        self.order
            .lock()
            .unwrap()
            .extend(records.iter().map(|r| r.text.clone()));
        self.inner.upsert(records).await
    }
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&TimeFilter>,
    ) -> Result<Vec<RetrievedLine>> {
        self.inner.query(vector, k, filter).await
    }
    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
}

fn settings(path: &Path) -> IngestSettings {
    IngestSettings {
        log_path: path.to_path_buf(),
        gap_fill_lines: 1000,
        poll_interval: Duration::from_millis(50),
    }
}

fn log_path(dir: &TempDir) -> PathBuf {
    dir.path().join("system.log")
}

fn append(path: &Path, text: &str) {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    f.write_all(text.as_bytes()).unwrap();
}

async fn wait_for_count(store: &dyn VectorStore, n: usize) {
    for _ in 0..200 {
        if store.count().await.unwrap() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!(
        "store never reached {} records (has {})",
        n,
        store.count().await.unwrap()
    );
}

async fn wait_for_phase(service: &IngestService, phase: IngestPhase) {
    for _ in 0..200 {
        if service.health().phase == phase {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("ingester never reached {:?}: {:?}", phase, service.health());
}

#[tokio::test]
async fn test_gap_fill_dedups_within_batch() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    append(
        &path,
        "host INFO: user alice logged in\n\
         host ERROR: disk full\n\
         \n\
         host INFO: user alice logged in\n",
    );

    let embedder = Arc::new(Keywords::default());
    let store = Arc::new(InMemoryStore::new());
    let stats = GapFillReconciler::new(embedder.clone(), store.clone(), 1000)
        .run(&path)
        .await
        .unwrap();

    assert_eq!(stats.lines_scanned, 4);
    assert_eq!(stats.blank_skipped, 1);
    assert_eq!(stats.duplicates_skipped, 1);
    assert_eq!(stats.upserted, 2);
    assert_eq!(embedder.embedded.load(Ordering::SeqCst), 2);
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_gap_fill_is_idempotent_across_restarts() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    append(&path, "a one\nb two\nc three\n");

    let embedder = Arc::new(Keywords::default());
    let store = Arc::new(InMemoryStore::new());
    for _ in 0..3 {
        GapFillReconciler::new(embedder.clone(), store.clone(), 1000)
            .run(&path)
            .await
            .unwrap();
    }
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_gap_fill_only_reads_last_lines() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    for i in 0..50 {
        append(&path, &format!("line {}\n", i));
    }

    let store = Arc::new(InMemoryStore::new());
    let stats = GapFillReconciler::new(Arc::new(Keywords::default()), store.clone(), 10)
        .run(&path)
        .await
        .unwrap();
    assert_eq!(stats.upserted, 10);
    assert_eq!(stats.end_offset, fs::metadata(&path).unwrap().len());
}

#[tokio::test]
async fn test_gap_fill_creates_missing_log() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/system.log");
    let stats = GapFillReconciler::new(
        Arc::new(Keywords::default()),
        Arc::new(InMemoryStore::new()),
        1000,
    )
    .run(&path)
    .await
    .unwrap();
    assert!(path.exists());
    assert_eq!(stats.upserted, 0);
}

#[tokio::test]
async fn test_appended_line_becomes_answerable() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    let embedder = Arc::new(Keywords::default());
    let store = Arc::new(InMemoryStore::new());

    let service = IngestService::spawn(settings(&path), embedder.clone(), store.clone());
    wait_for_phase(&service, IngestPhase::Watching).await;

    let line = "2025-12-17T16:16:00 host INFO: user alice logged in";
    append(&path, &format!("{}\n", line));
    wait_for_count(store.as_ref(), 1).await;

    let retrieval = RetrievalService::new(embedder, store.clone());
    let context = retrieval.retrieve("who logged in", None).await.unwrap();
    assert!(context.contains(line), "context was: {}", context);

    let health = service.stop().await.unwrap();
    assert_eq!(health.phase, IngestPhase::Stopped);
    assert_eq!(health.lines_ingested, 1);
    assert_eq!(health.cursor, line.len() as u64 + 1);
}

#[tokio::test]
async fn test_lines_land_in_order_while_queries_run() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    let embedder = Arc::new(Keywords::default());
    let store = Arc::new(Recording::default());

    let service = IngestService::spawn(settings(&path), embedder.clone(), store.clone());
    wait_for_phase(&service, IngestPhase::Watching).await;

    let retrieval = RetrievalService::new(embedder, store.clone());
    let mut queries = Vec::new();
    for _ in 0..4 {
        let retrieval = retrieval.clone();
        queries.push(tokio::spawn(async move {
            for _ in 0..25 {
                retrieval.search("what happened with L1 or L2 today").await?;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            anyhow::Ok(())
        }));
    }

    append(&path, "L1 first\n");
    append(&path, "L2 second\n");
    wait_for_count(store.as_ref(), 2).await;

    for q in queries {
        q.await.unwrap().unwrap();
    }
    assert_eq!(
        *store.order.lock().unwrap(),
        vec!["L1 first".to_string(), "L2 second".to_string()]
    );

    let context = retrieval.retrieve("L2", None).await.unwrap();
    assert!(context.starts_with("L2 second"));
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_restart_resumes_without_duplicates() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    append(&path, "before start\n");
    let embedder = Arc::new(Keywords::default());
    let store = Arc::new(InMemoryStore::new());

    let service = IngestService::spawn(settings(&path), embedder.clone(), store.clone());
    wait_for_phase(&service, IngestPhase::Watching).await;
    append(&path, "while running\n");
    wait_for_count(store.as_ref(), 2).await;
    service.stop().await.unwrap();

    // Written while the process was down.
    append(&path, "while stopped\n");

    let service = IngestService::spawn(settings(&path), embedder, store.clone());
    wait_for_phase(&service, IngestPhase::Watching).await;
    let health = service.stop().await.unwrap();

    assert_eq!(store.count().await.unwrap(), 3);
    assert_eq!(health.gap_fill.unwrap().upserted, 3);
}

#[tokio::test]
async fn test_partial_line_is_completed_by_tailer() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    append(&path, "complete line\npar");
    let embedder = Arc::new(Keywords::default());
    let store = Arc::new(InMemoryStore::new());

    let service = IngestService::spawn(settings(&path), embedder, store.clone());
    wait_for_phase(&service, IngestPhase::Watching).await;
    assert_eq!(store.count().await.unwrap(), 1);

    append(&path, "tial line\n");
    wait_for_count(store.as_ref(), 2).await;
    service.stop().await.unwrap();

    let id = loglens_core::identity::line_id(b"partial line");
    assert!(store.get(&id).is_some());
    assert!(store.get(&loglens_core::identity::line_id(b"par")).is_none());
}

#[tokio::test]
async fn test_truncated_log_is_reread_from_start() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    append(&path, "a long line that will be truncated away\n");
    let store = Arc::new(InMemoryStore::new());

    let service = IngestService::spawn(
        settings(&path),
        Arc::new(Keywords::default()),
        store.clone(),
    );
    wait_for_phase(&service, IngestPhase::Watching).await;

    fs::write(&path, b"fresh\n").unwrap();
    wait_for_count(store.as_ref(), 2).await;

    let health = service.stop().await.unwrap();
    assert_eq!(health.cursor, 6);
    assert!(store
        .get(&loglens_core::identity::line_id(b"fresh"))
        .is_some());
}

#[tokio::test]
async fn test_failed_gap_fill_still_tails() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    append(&path, "old one\nold two\n");
    let embedder = Arc::new(Keywords {
        single_only: true,
        ..Keywords::default()
    });
    let store = Arc::new(InMemoryStore::new());

    let service = IngestService::spawn(settings(&path), embedder, store.clone());
    wait_for_phase(&service, IngestPhase::Watching).await;
    let health = service.health();
    assert!(health.gap_fill.is_none());
    assert_eq!(health.ingest_errors, 1);

    append(&path, "new line\n");
    wait_for_count(store.as_ref(), 1).await;
    service.stop().await.unwrap();
    assert!(store
        .get(&loglens_core::identity::line_id(b"new line"))
        .is_some());
}

#[tokio::test]
async fn test_stop_interrupts_a_burst_of_slow_lines() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    let embedder = Arc::new(Slow::new(Duration::from_millis(500)));
    let store = Arc::new(InMemoryStore::new());

    let service = IngestService::spawn(settings(&path), embedder.clone(), store.clone());
    wait_for_phase(&service, IngestPhase::Watching).await;

    let burst: String = (0..10).map(|i| format!("burst line {}\n", i)).collect();
    append(&path, &burst);
    for _ in 0..200 {
        if embedder.started.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(embedder.started.load(Ordering::SeqCst) > 0);

    let began = Instant::now();
    let health = service.stop().await.unwrap();
    assert!(
        began.elapsed() < Duration::from_millis(500),
        "stop took {:?}",
        began.elapsed()
    );
    assert_eq!(health.phase, IngestPhase::Stopped);
    assert!(health.lines_ingested < 10);
    assert!(store.count().await.unwrap() < 10);
}

#[tokio::test]
async fn test_empty_store_yields_sentinel() {
    let retrieval = RetrievalService::new(
        Arc::new(Keywords::default()),
        Arc::new(InMemoryStore::new()),
    );
    assert_eq!(
        retrieval.retrieve("anything", None).await.unwrap(),
        NO_RESULTS
    );
}
