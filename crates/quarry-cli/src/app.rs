//! Assembled application state shared by every command.

use crate::config::QuarryConfig;
use crate::error::{CliError, Result};
use quarry_domain::BreakerRegistry;
use quarry_provider::build_provider;
use quarry_reconciler::Reconciler;
use quarry_service::ExtractionService;
use quarry_store::{LocalContentStorage, SqliteStore};
use quarry_worker::ExtractionWorker;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Store, breakers, reconciler and service built from one configuration.
///
/// The worker and the service share the same breaker registry, so a breaker
/// opened by the worker also refuses new work through the service.
pub struct App {
    config: QuarryConfig,
    store: Arc<Mutex<SqliteStore>>,
    breakers: BreakerRegistry,
    reconciler: Arc<Reconciler>,
    service: ExtractionService<SqliteStore>,
}

impl App {
    /// Validate the configuration and open the store.
    pub fn open(config: QuarryConfig) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(Mutex::new(SqliteStore::from_config(&config.store)?));
        let breakers = BreakerRegistry::new(config.breaker);
        let reconciler = Arc::new(
            Reconciler::new(config.reconciler.clone()).map_err(|e| CliError::Config(format!("[reconciler] {}", e)))?,
        );
        let service = ExtractionService::new(Arc::clone(&store), breakers.clone(), config.retry)?
            .with_reconciler(Arc::clone(&reconciler));

        debug!(path = %config.store.path.display(), "Opened store");

        Ok(Self {
            config,
            store,
            breakers,
            reconciler,
            service,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &QuarryConfig {
        &self.config
    }

    /// Shared store handle.
    pub fn store(&self) -> &Arc<Mutex<SqliteStore>> {
        &self.store
    }

    /// Extraction service.
    pub fn service(&self) -> &ExtractionService<SqliteStore> {
        &self.service
    }

    /// Reconciler used by the service and the worker.
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Build a worker over the shared store and breakers.
    pub fn worker(&self, concurrency: Option<usize>) -> Result<ExtractionWorker<SqliteStore>> {
        let mut worker_config = self.config.worker_config();
        if let Some(concurrency) = concurrency {
            worker_config.concurrency = concurrency;
        }

        let provider = build_provider(&self.config.provider, self.reconciler.registry().keys())?;
        let storage = Arc::new(LocalContentStorage::new(self.config.storage.root.clone()));

        let worker = ExtractionWorker::new(
            worker_config,
            Arc::clone(&self.store),
            provider,
            storage,
            self.breakers.clone(),
        )?
        .with_reconciler((*self.reconciler).clone());
        Ok(worker)
    }
}
