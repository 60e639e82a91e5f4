use crate::adapters::storage::MessageStore;
use crate::config::MessagingConfig;
use crate::domain::message::{MESSAGE_ID_HEX_LEN, Message, MessageContent, MessageId};
use crate::error::{AppError, Result, ValidationError};
use backon::{ConstantBuilder, Retryable};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) created_total: Counter<u64>,
    pub(crate) fetched_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("ephemera-server");
        Self {
            created_total: meter
                .u64_counter("ephemera_messages_created_total")
                .with_description("Total create attempts by outcome")
                .build(),
            fetched_total: meter
                .u64_counter("ephemera_messages_fetched_total")
                .with_description("Total fetch attempts by outcome")
                .build(),
        }
    }
}

/// What the sender gets back. Deliberately carries no content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedMessage {
    pub id: MessageId,
    pub url: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct MessageService {
    store: Arc<dyn MessageStore>,
    config: MessagingConfig,
    metrics: Metrics,
}

impl MessageService {
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, config: MessagingConfig) -> Self {
        Self { store, config, metrics: Metrics::new() }
    }

    /// Validates and stores a message, returning its retrieval link.
    ///
    /// # Errors
    /// Returns `AppError::Validation` if the trimmed content is empty or too long.
    /// Returns `AppError::IdCollision` if every insert attempt collided.
    /// Returns `AppError::Timeout` or `AppError::Database` if the store fails.
    #[tracing::instrument(err(level = "debug"), skip(self, raw_content), fields(message.id = tracing::field::Empty))]
    pub async fn create_message(&self, raw_content: &str, origin: &str) -> Result<CreatedMessage> {
        let content = match MessageContent::parse(raw_content) {
            Ok(content) => content,
            Err(e) => {
                self.metrics.created_total.add(1, &[KeyValue::new("status", "invalid")]);
                return Err(e.into());
            }
        };

        let retries = ConstantBuilder::default()
            .with_delay(Duration::from_millis(5))
            .with_max_times(self.config.insert_attempts.saturating_sub(1));

        let result = (|| self.bounded(self.store.insert(content.clone())))
            .retry(retries)
            .when(|e| matches!(e, AppError::IdCollision))
            .notify(|_, _| tracing::warn!("Message id collision, retrying with a fresh id"))
            .await;

        match result {
            Ok(message) => {
                tracing::Span::current().record("message.id", tracing::field::display(message.id));
                tracing::debug!("Message stored");
                self.metrics.created_total.add(1, &[KeyValue::new("status", "success")]);
                Ok(CreatedMessage { id: message.id, url: retrieval_url(origin, &message.id), expires_at: message.expires_at })
            }
            Err(e) => {
                self.metrics.created_total.add(1, &[KeyValue::new("status", "failure")]);
                Err(e)
            }
        }
    }

    /// Looks up a live message by its external id.
    ///
    /// # Errors
    /// Returns `AppError::Validation` if `id` is not 24 hex characters. The store is not consulted.
    /// Returns `AppError::NotFound` if the message never existed or has expired.
    /// Returns `AppError::Timeout` or `AppError::Database` if the store fails.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn fetch_message(&self, id: &str) -> Result<Message> {
        if id.len() != MESSAGE_ID_HEX_LEN {
            self.metrics.fetched_total.add(1, &[KeyValue::new("outcome", "invalid")]);
            return Err(ValidationError::InvalidId.into());
        }
        let id = id.parse::<MessageId>().inspect_err(|_| {
            self.metrics.fetched_total.add(1, &[KeyValue::new("outcome", "invalid")]);
        })?;

        match self.bounded(self.store.get_live(&id)).await {
            Ok(Some(message)) => {
                self.metrics.fetched_total.add(1, &[KeyValue::new("outcome", "found")]);
                Ok(message)
            }
            Ok(None) => {
                self.metrics.fetched_total.add(1, &[KeyValue::new("outcome", "not_found")]);
                Err(AppError::NotFound)
            }
            Err(e) => {
                self.metrics.fetched_total.add(1, &[KeyValue::new("outcome", "error")]);
                Err(e)
            }
        }
    }

    /// Purges expired messages.
    ///
    /// # Errors
    /// Returns `AppError::Timeout` or `AppError::Database` if the store fails.
    pub async fn reap_expired(&self) -> Result<u64> {
        self.bounded(self.store.reap()).await
    }

    #[must_use]
    pub(crate) const fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.config.cleanup_interval_secs)
    }

    async fn bounded<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(Duration::from_millis(self.config.store_timeout_ms), op)
            .await
            .map_err(|_| AppError::Timeout)?
    }
}

/// Builds the link a recipient opens to read the message.
fn retrieval_url(origin: &str, id: &MessageId) -> String {
    format!("{}/?id={id}", origin.trim_end_matches('/'))
}
