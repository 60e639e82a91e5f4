#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;
pub mod workers;

use crate::adapters::storage::{MemoryMessageStore, MessageStore, PgMessageStore, ReadPolicy};
use crate::config::Config;
use crate::domain::clock::{Clock, SystemClock};
use crate::services::health_service::HealthService;
use crate::services::message_service::MessageService;
use crate::workers::MessageCleanupWorker;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Background tasks owned by the server process.
#[derive(Debug)]
pub struct Workers {
    message_cleanup: MessageCleanupWorker,
}

impl Workers {
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![tokio::spawn(self.message_cleanup.run(shutdown_rx))]
    }
}

#[derive(Debug)]
pub struct App {
    pub message_service: MessageService,
    pub health_service: HealthService,
    pub workers: Workers,
}

/// Wires the store into the services. The store is always passed in explicitly.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    store: Option<Arc<dyn MessageStore>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, store: None }
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the services and workers.
    ///
    /// # Errors
    /// Returns an error if no store was supplied.
    pub fn build(self) -> anyhow::Result<App> {
        let store = self.store.ok_or_else(|| anyhow::anyhow!("message store is required"))?;

        let message_service = MessageService::new(Arc::clone(&store), self.config.messaging.clone());
        let health_service = HealthService::new(store, self.config.health.clone());
        let workers = Workers { message_cleanup: MessageCleanupWorker::new(message_service.clone()) };

        Ok(App { message_service, health_service, workers })
    }
}

/// Opens the configured store: Postgres when a database URL is set, process memory otherwise.
///
/// # Errors
/// Returns an error if the database is unreachable or migrations fail.
pub async fn init_store(config: &Config) -> anyhow::Result<Arc<dyn MessageStore>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let read_policy = ReadPolicy::from_burn_after_read(config.messaging.burn_after_read);

    if let Some(url) = &config.database_url {
        let pool = adapters::database::init_pool(url, &config.database).await?;
        adapters::database::run_migrations(&pool).await?;
        tracing::info!(?read_policy, "using postgres message store");
        Ok(Arc::new(PgMessageStore::new(pool, clock, read_policy)))
    } else {
        tracing::warn!(?read_policy, "no database configured, messages are kept in memory only");
        Ok(Arc::new(MemoryMessageStore::new(clock, read_policy)))
    }
}

/// Flips the shutdown channel on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received, draining...");
        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through tracing so they reach the configured log sink.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(|l| format!("{}:{}", l.file(), l.line())).unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();
        tracing::error!(%location, %payload, "panic");
    }));
}
