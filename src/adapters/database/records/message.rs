use crate::domain::message::{Message, MessageId};
use crate::error::AppError;
use time::OffsetDateTime;

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRecord {
    pub(crate) id: Vec<u8>,
    pub(crate) content: String,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) expires_at: OffsetDateTime,
}

impl TryFrom<MessageRecord> for Message {
    type Error = AppError;

    fn try_from(record: MessageRecord) -> Result<Self, Self::Error> {
        let id = MessageId::try_from(record.id.as_slice()).map_err(|_| {
            tracing::error!(len = record.id.len(), "Stored message id has the wrong width");
            AppError::Internal
        })?;
        Ok(Self { id, content: record.content, created_at: record.created_at, expires_at: record.expires_at })
    }
}
