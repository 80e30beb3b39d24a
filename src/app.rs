use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::actors::scheduler::SchedulerHandle;
use crate::alerts::AlertManager;
use crate::config::Config;
use crate::console::Console;
use crate::endpoints::JsonEndpointStore;
use crate::engine::Engine;
use crate::logs::LogStore;
use crate::monitors::probe::HttpProbe;
use crate::notification::NotificationTracker;
use crate::snapshot::StatusSnapshot;
use crate::telegram::TelegramTransport;

/// Everything built from one [`Config`]
#[derive(Debug, Clone)]
pub struct App {
    config: Config,
    store: Arc<JsonEndpointStore>,
    engine: Engine,
}

impl App {
    pub fn from_config(config: Config) -> Result<Self> {
        let store = Arc::new(JsonEndpointStore::new(&config.sites_file));
        let probe = HttpProbe::new(config.timeout())?;
        let tracker = NotificationTracker::load(&config.notification_state_file);
        let logs = LogStore::open(
            &config.log_file,
            config.log_history,
            config.log_retention_days,
            config.log_cleanup_interval(),
        )
        .with_context(|| format!("failed to open log file {}", config.log_file.display()))?;

        let mut engine = Engine::new(
            store.clone(),
            Arc::new(probe),
            StatusSnapshot::new(),
            Arc::new(tracker),
            Arc::new(logs),
        );

        if config.alert.is_configured() {
            let transport = TelegramTransport::new(&config.alert)?;
            let manager = AlertManager::new(Arc::new(transport), config.alert.policy());
            info!(
                "alerts enabled via {} (threshold {})",
                manager.transport_name(),
                config.alert.failure_threshold
            );
            engine = engine.with_alerts(manager);
        } else {
            info!("alerts disabled: bot token, chat id and enabled flag are required");
        }

        debug!("built engine: {engine:?}");

        Ok(Self {
            config,
            store,
            engine,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<JsonEndpointStore> {
        &self.store
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn console(&self) -> Console {
        Console::new(self.engine.clone(), self.store.clone())
    }

    pub fn spawn_scheduler(&self) -> SchedulerHandle {
        SchedulerHandle::spawn(self.engine.clone(), self.config.interval())
    }
}
