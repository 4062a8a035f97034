//! `loglens ingest` and `loglens watch`.
//!
//! `ingest` runs gap-fill once and exits. `watch` runs the full background
//! ingester (gap-fill, then tailing) in the foreground until Ctrl-C.

use anyhow::Result;

use loglens_core::store::VectorStore;

use crate::app::{shutdown_signal, App};
use crate::config::Config;
use crate::gap_fill::GapFillReconciler;

pub async fn run_ingest(config: &Config) -> Result<()> {
    let app = App::open(config).await?;
    let reconciler = GapFillReconciler::new(
        app.embedder.clone(),
        app.store_handle(),
        config.log.gap_fill_lines,
    );
    let stats = reconciler.run(&config.log.path).await?;
    let total = app.store.count().await?;
    app.close().await;

    println!("ingest {}", config.log.path.display());
    println!("  lines scanned: {}", stats.lines_scanned);
    println!("  blank skipped: {}", stats.blank_skipped);
    println!("  duplicates skipped: {}", stats.duplicates_skipped);
    println!("  upserted: {}", stats.upserted);
    println!("  records stored: {}", total);
    println!("ok");
    Ok(())
}

pub async fn run_watch(config: &Config) -> Result<()> {
    let app = App::open(config).await?;
    let service = app.spawn_ingest();
    println!(
        "watching {} (Ctrl-C to stop)",
        config.log.path.display()
    );

    shutdown_signal().await;
    let health = service.stop().await?;
    app.close().await;

    println!("stopped");
    println!("  lines ingested: {}", health.lines_ingested);
    println!("  ingest errors: {}", health.ingest_errors);
    Ok(())
}
