//! Wiring: build the shared handles from a [`Config`].
//!
//! Every command that touches the index goes through [`App::open`], which
//! creates the embedder and opens the SQLite store. The handles are plain
//! `Arc`s passed into constructors; nothing is global.

use anyhow::{Context, Result};
use std::sync::Arc;

use loglens_core::embedding::Embedder;
use loglens_core::retrieval::RetrievalService;
use loglens_core::store::VectorStore;

use crate::ask::Analyst;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::llm::create_llm;
use crate::service::{IngestService, IngestSettings};
use crate::sqlite_store::SqliteStore;

pub struct App {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub embedder: Arc<dyn Embedder>,
}

impl App {
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)
            .with_context(|| "Failed to initialise embedding provider")?;
        let store = Arc::new(SqliteStore::open(config).await?);
        tracing::debug!(
            model = embedder.model_name(),
            dims = embedder.dims(),
            db = %config.db.path.display(),
            "opened index"
        );
        Ok(Self {
            config: config.clone(),
            store,
            embedder,
        })
    }

    pub fn store_handle(&self) -> Arc<dyn VectorStore> {
        self.store.clone()
    }

    pub fn retrieval(&self) -> RetrievalService {
        RetrievalService::new(self.embedder.clone(), self.store_handle())
            .with_top_k(self.config.retrieval.top_k)
    }

    pub fn analyst(&self) -> Result<Analyst> {
        let llm = create_llm(&self.config.llm)?;
        Ok(Analyst::new(self.retrieval(), llm))
    }

    /// Start the background ingester on the configured log file.
    pub fn spawn_ingest(&self) -> IngestService {
        IngestService::spawn(
            IngestSettings::from_config(&self.config),
            self.embedder.clone(),
            self.store_handle(),
        )
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}

/// Resolves when the process receives Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
