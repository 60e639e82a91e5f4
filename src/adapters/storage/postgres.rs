use crate::adapters::database::DbPool;
use crate::adapters::database::records::MessageRecord;
use crate::adapters::storage::{MessageStore, ReadPolicy};
use crate::domain::clock::Clock;
use crate::domain::message::{Message, MessageContent, MessageId};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;

const UNIQUE_VIOLATION: &str = "23505";

/// Postgres-backed store. Every operation is a single statement, so concurrent
/// readers and the reaper never observe a half-deleted row.
#[derive(Clone, Debug)]
pub struct PgMessageStore {
    pool: DbPool,
    clock: Arc<dyn Clock>,
    read_policy: ReadPolicy,
}

impl PgMessageStore {
    #[must_use]
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>, read_policy: ReadPolicy) -> Self {
        Self { pool, clock, read_policy }
    }

    async fn delete_if_expired(&self, id: &MessageId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1 AND expires_at < $2")
            .bind(id.as_bytes().as_slice())
            .bind(self.clock.now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    /// Records a new message in the database.
    ///
    /// # Errors
    /// Returns `AppError::IdCollision` if the primary key is already taken.
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, content))]
    async fn insert(&self, content: MessageContent) -> Result<Message> {
        let message = Message::new(content, self.clock.now());

        let result = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (id, content, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, content, created_at, expires_at
            "#,
        )
        .bind(message.id.as_bytes().as_slice())
        .bind(&message.content)
        .bind(message.created_at)
        .bind(message.expires_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(record) => record.try_into(),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(AppError::IdCollision)
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    #[tracing::instrument(level = "debug", skip(self), fields(message.id = %id))]
    async fn get_live(&self, id: &MessageId) -> Result<Option<Message>> {
        let now = self.clock.now();

        let record = match self.read_policy {
            ReadPolicy::Repeatable => {
                sqlx::query_as::<_, MessageRecord>(
                    r#"
                    SELECT id, content, created_at, expires_at
                    FROM messages
                    WHERE id = $1
                    "#,
                )
                .bind(id.as_bytes().as_slice())
                .fetch_optional(&self.pool)
                .await?
            }
            ReadPolicy::Once => {
                let consumed = sqlx::query_as::<_, MessageRecord>(
                    r#"
                    DELETE FROM messages
                    WHERE id = $1 AND expires_at >= $2
                    RETURNING id, content, created_at, expires_at
                    "#,
                )
                .bind(id.as_bytes().as_slice())
                .bind(now)
                .fetch_optional(&self.pool)
                .await?;

                if consumed.is_none() {
                    self.delete_if_expired(id).await?;
                }
                consumed
            }
        };

        let Some(record) = record else {
            return Ok(None);
        };
        let message = Message::try_from(record)?;

        if message.is_expired_at(now) {
            let deleted = self.delete_if_expired(id).await?;
            tracing::debug!(deleted, "Removed expired message on read");
            return Ok(None);
        }

        Ok(Some(message))
    }

    /// Deletes all expired messages.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the deletion fails.
    #[tracing::instrument(level = "debug", skip(self))]
    async fn reap(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE expires_at < $1")
            .bind(self.clock.now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
