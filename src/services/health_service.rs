use crate::adapters::storage::MessageStore;
use crate::config::HealthConfig;
use opentelemetry::{KeyValue, global, metrics::Gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Debug)]
pub struct Metrics {
    pub status: Gauge<i64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("ephemera-server");
        Self {
            status: meter
                .i64_gauge("ephemera_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct HealthService {
    store: Arc<dyn MessageStore>,
    config: HealthConfig,
    metrics: Metrics,
}

impl HealthService {
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, config: HealthConfig) -> Self {
        Self { store, config, metrics: Metrics::new() }
    }

    /// Checks that the message store answers within the configured timeout.
    ///
    /// # Errors
    /// Returns a string describing the failure if the store is unreachable.
    pub async fn check_store(&self) -> Result<(), String> {
        let store_timeout = Duration::from_millis(self.config.store_timeout_ms);

        match timeout(store_timeout, self.store.ping()).await {
            Ok(Ok(())) => {
                self.metrics.status.record(1, &[KeyValue::new("component", "store")]);
                Ok(())
            }
            Ok(Err(e)) => {
                self.metrics.status.record(0, &[KeyValue::new("component", "store")]);
                Err(format!("Store connection failed: {e:?}"))
            }
            Err(_) => {
                self.metrics.status.record(0, &[KeyValue::new("component", "store")]);
                Err("Store connection timed out".to_string())
            }
        }
    }
}
