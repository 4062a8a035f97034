//! The supervised background ingester.
//!
//! [`IngestService::spawn`] starts one task that runs gap-fill once and then
//! tails the log until [`IngestService::stop`] is called. Progress is
//! published through a [`HealthHandle`] that queries and the HTTP server can
//! read at any time.
//!
//! Ingestion never brings the process down: failures are logged, counted in
//! [`IngestHealth`], and the loop carries on. If the log file cannot even be
//! created, the task keeps retrying on every poll tick.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use loglens_core::embedding::Embedder;
use loglens_core::store::VectorStore;

use crate::config::Config;
use crate::gap_fill::{GapFillReconciler, GapFillStats};
use crate::tail::{self, LineIngester, SharedTail, TailCycle, TailWatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestPhase {
    Starting,
    GapFilling,
    Watching,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestHealth {
    pub phase: IngestPhase,
    pub gap_fill: Option<GapFillStats>,
    pub lines_ingested: u64,
    pub ingest_errors: u64,
    pub cursor: u64,
    pub last_error: Option<String>,
}

impl Default for IngestHealth {
    fn default() -> Self {
        Self {
            phase: IngestPhase::Starting,
            gap_fill: None,
            lines_ingested: 0,
            ingest_errors: 0,
            cursor: 0,
            last_error: None,
        }
    }
}

/// Shared, cheaply cloneable view of the ingester's health.
#[derive(Clone, Default)]
pub struct HealthHandle(Arc<RwLock<IngestHealth>>);

impl HealthHandle {
    pub fn snapshot(&self) -> IngestHealth {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update(&self, f: impl FnOnce(&mut IngestHealth)) {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }

    fn set_phase(&self, phase: IngestPhase) {
        self.update(|h| h.phase = phase);
    }

    fn record_error(&self, err: &anyhow::Error) {
        self.update(|h| {
            h.ingest_errors += 1;
            h.last_error = Some(format!("{:#}", err));
        });
    }

    fn record_cycle(&self, cycle: TailCycle, cursor: u64) {
        self.update(|h| {
            h.lines_ingested += cycle.ingested as u64;
            h.ingest_errors += cycle.failed as u64;
            h.cursor = cursor;
            if cycle.failed > 0 {
                h.last_error = Some(format!("{} line(s) failed to ingest", cycle.failed));
            }
        });
    }
}

/// What the ingester needs from the config.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub log_path: PathBuf,
    pub gap_fill_lines: usize,
    pub poll_interval: Duration,
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            log_path: config.log.path.clone(),
            gap_fill_lines: config.log.gap_fill_lines,
            poll_interval: config.log.poll_interval(),
        }
    }
}

pub struct IngestService {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
    health: HealthHandle,
}

impl IngestService {
    /// Start the background ingester. Must be called inside a tokio runtime.
    pub fn spawn(
        settings: IngestSettings,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let health = HealthHandle::default();
        let handle = tokio::spawn(run(
            settings,
            embedder,
            store,
            health.clone(),
            shutdown_rx,
        ));
        Self {
            shutdown,
            handle,
            health,
        }
    }

    pub fn health_handle(&self) -> HealthHandle {
        self.health.clone()
    }

    /// Current health; a task that ended without being stopped reports
    /// [`IngestPhase::Failed`].
    pub fn health(&self) -> IngestHealth {
        let mut health = self.health.snapshot();
        if self.handle.is_finished() && health.phase != IngestPhase::Stopped {
            health.phase = IngestPhase::Failed;
        }
        health
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal shutdown and wait for the task to finish.
    pub async fn stop(self) -> Result<IngestHealth> {
        let _ = self.shutdown.send(true);
        let joined = self.handle.await;
        if joined.is_err() {
            self.health.set_phase(IngestPhase::Failed);
        }
        joined.context("ingest task panicked")?;
        Ok(self.health.snapshot())
    }
}

async fn run(
    settings: IngestSettings,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    health: HealthHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    let path = settings.log_path.clone();
    tracing::info!(path = %path.display(), "ingest service starting");

    // Phase 1: catch up on lines written while we were down.
    health.set_phase(IngestPhase::GapFilling);
    let reconciler = GapFillReconciler::new(
        embedder.clone(),
        store.clone(),
        settings.gap_fill_lines,
    );
    let gap_fill = tokio::select! {
        _ = shutdown.changed() => {
            health.set_phase(IngestPhase::Stopped);
            return;
        }
        result = reconciler.run(&path) => result,
    };
    let resume_at = match gap_fill {
        Ok(stats) => {
            health.update(|h| {
                h.gap_fill = Some(stats);
                h.cursor = stats.end_offset;
            });
            Some(stats.end_offset)
        }
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "gap fill failed; tailing from end of file");
            health.record_error(&e);
            None
        }
    };

    // Phase 2: tail. Opening can fail if the file cannot be created yet.
    let mut ticker = tokio::time::interval(settings.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let tailer = loop {
        let opened = match resume_at {
            Some(offset) => TailWatcher::open_at(&path, offset),
            None => TailWatcher::open_at_end(&path),
        };
        match opened {
            Ok(t) => break SharedTail::new(t),
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "cannot open log file; will retry");
                health.record_error(&e);
            }
        }
        tokio::select! {
            _ = shutdown.changed() => {
                health.set_phase(IngestPhase::Stopped);
                return;
            }
            _ = ticker.tick() => {}
        }
    };

    let wake = Arc::new(Notify::new());
    let _fs_watcher = match tail::watch_changes(&path, wake.clone()) {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "file watcher unavailable; polling only");
            None
        }
    };

    let ingester = LineIngester::new(embedder, store);
    health.update(|h| {
        h.phase = IngestPhase::Watching;
        h.cursor = tailer.cursor();
    });
    tracing::info!(path = %path.display(), cursor = tailer.cursor(), "watching log file");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = wake.notified() => {}
            _ = ticker.tick() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        match tailer.read_appended().await {
            Ok(lines) if lines.is_empty() => {}
            Ok(lines) => {
                let cycle = ingester.ingest_all(&lines, &mut shutdown).await;
                health.record_cycle(cycle, tailer.cursor());
                if cycle.interrupted {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "failed to read log file");
                health.record_error(&e);
            }
        }
    }

    health.set_phase(IngestPhase::Stopped);
    tracing::info!("ingest service stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_defaults_and_cycle_accounting() {
        let health = HealthHandle::default();
        assert_eq!(health.snapshot().phase, IngestPhase::Starting);

        health.record_cycle(
            TailCycle {
                ingested: 3,
                failed: 1,
                ..TailCycle::default()
            },
            120,
        );
        health.record_cycle(
            TailCycle {
                ingested: 2,
                ..TailCycle::default()
            },
            150,
        );
        let snap = health.snapshot();
        assert_eq!(snap.lines_ingested, 5);
        assert_eq!(snap.ingest_errors, 1);
        assert_eq!(snap.cursor, 150);
        assert!(snap.last_error.is_some());
    }

    #[test]
    fn test_health_serializes_phase_in_snake_case() {
        let health = IngestHealth {
            phase: IngestPhase::GapFilling,
            ..IngestHealth::default()
        };
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["phase"], "gap_filling");
    }
}
