//! Wiring shared by every command.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{Config, Paths};
use crate::error::StockflowError;
use crate::remote::{ConnectivityProbe, HttpInventory, InventoryRemote, Unconfigured};
use crate::sync::{
    ActionGateway, ActionQueue, ConnectivityMonitor, EngineConfig, QueueInspector,
    ReconcileEngine, SyncCoordinator,
};

/// The queue, engine and connectivity state for one CLI invocation.
pub struct App {
    pub paths: Paths,
    pub config: Config,
    pub coordinator: Arc<SyncCoordinator>,
    pub connectivity: Arc<ConnectivityMonitor>,
    probe: Arc<dyn ConnectivityProbe>,
}

impl App {
    /// Open the queue under `paths` and connect to the configured remote.
    ///
    /// Without `remote.base_url` the device is permanently offline and every
    /// action is queued.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the queue cannot be opened.
    pub fn open(paths: Paths, config: Config) -> Result<Self, StockflowError> {
        paths.ensure_dirs()?;
        let queue = Arc::new(ActionQueue::open_at(&paths.database)?);

        let remote: Arc<dyn InventoryRemote>;
        let probe: Arc<dyn ConnectivityProbe>;
        if let Some(base_url) = &config.remote.base_url {
            let http = Arc::new(HttpInventory::new(
                base_url,
                config.remote.api_key.clone(),
                config.remote.timeout(),
            )?);
            remote = http.clone();
            probe = http;
        } else {
            debug!("no remote configured; working offline");
            remote = Arc::new(Unconfigured);
            probe = Arc::new(Unconfigured);
        }

        let engine = ReconcileEngine::with_config(queue, remote, EngineConfig::from_config(&config));
        let coordinator = SyncCoordinator::new(engine)
            .with_retry_policy(config.sync.retry_base(), config.sync.retry_max());

        Ok(Self {
            paths,
            config,
            coordinator: Arc::new(coordinator),
            connectivity: Arc::new(ConnectivityMonitor::new(false)),
            probe,
        })
    }

    /// Check reachability once and publish the result.
    pub async fn probe(&self) -> bool {
        let online = self.probe.is_online().await;
        self.connectivity.report(online);
        online
    }

    /// Keep probing in the background until cancelled.
    pub fn spawn_probe(&self, cancel: CancellationToken) -> JoinHandle<()> {
        self.connectivity.spawn_probe(
            Arc::clone(&self.probe),
            self.config.sync.probe_interval(),
            cancel,
        )
    }

    #[must_use]
    pub fn gateway(&self) -> ActionGateway {
        ActionGateway::new(Arc::clone(&self.coordinator), Arc::clone(&self.connectivity))
    }

    #[must_use]
    pub fn inspector(&self) -> QueueInspector {
        QueueInspector::new(
            Arc::clone(&self.coordinator),
            self.config.general.currency_symbol.clone(),
        )
    }

    #[must_use]
    pub fn currency_symbol(&self) -> &str {
        &self.config.general.currency_symbol
    }
}
