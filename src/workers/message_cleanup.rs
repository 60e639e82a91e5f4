use crate::error::Result;
use crate::services::message_service::MessageService;
use opentelemetry::{global, metrics::Counter};
use tracing::Instrument;

#[derive(Clone, Debug)]
struct Metrics {
    reaped: Counter<u64>,
    errors: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("ephemera-server");
        Self {
            reaped: meter
                .u64_counter("ephemera_messages_reaped_total")
                .with_description("Total expired messages removed by the background reaper")
                .build(),
            errors: meter
                .u64_counter("ephemera_message_cleanup_errors_total")
                .with_description("Total failed reaper iterations")
                .build(),
        }
    }
}

/// Periodically purges expired messages. Purely an optimization: reads never
/// return expired messages whether or not this has run.
#[derive(Debug)]
pub struct MessageCleanupWorker {
    message_service: MessageService,
    metrics: Metrics,
}

impl MessageCleanupWorker {
    #[must_use]
    pub fn new(message_service: MessageService) -> Self {
        Self { message_service, metrics: Metrics::new() }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let interval = self.message_service.cleanup_interval();
        let mut next_tick = tokio::time::Instant::now() + interval;

        while !*shutdown.borrow() {
            tokio::select! {
                () = tokio::time::sleep_until(next_tick) => {
                    if let Err(e) = self.perform_cleanup()
                        .instrument(tracing::info_span!("message_cleanup_iteration"))
                        .await
                    {
                        if e.is_retryable() {
                            tracing::warn!(error = %e, "Message cleanup iteration failed, retrying next tick");
                        } else {
                            tracing::error!(error = %e, "Message cleanup iteration failed");
                        }
                        self.metrics.errors.add(1, &[]);
                    }
                    next_tick = tokio::time::Instant::now() + interval;
                }
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Message cleanup loop shutting down...");
    }

    /// Runs one reaper pass and returns how many messages were removed.
    ///
    /// # Errors
    /// Returns an error if the store fails or times out.
    #[tracing::instrument(skip(self), err, fields(expired_deleted = tracing::field::Empty))]
    pub async fn perform_cleanup(&self) -> Result<u64> {
        tracing::debug!("Running message cleanup...");

        let count = self.message_service.reap_expired().await?;
        if count > 0 {
            tracing::info!(count = %count, "Deleted expired messages");
            tracing::Span::current().record("expired_deleted", count);
            self.metrics.reaped.add(count, &[]);
        }
        Ok(count)
    }
}
