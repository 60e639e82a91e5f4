use crate::domain::message::Message;
use crate::services::message_service::CreatedMessage;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateMessageRequest {
    /// Missing content is treated like empty content.
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageResponse {
    pub id: String,
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl From<CreatedMessage> for CreateMessageResponse {
    fn from(created: CreatedMessage) -> Self {
        Self { id: created.id.to_string(), url: created.url, expires_at: created.expires_at }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self { content: message.content, created_at: message.created_at, expires_at: message.expires_at }
    }
}
