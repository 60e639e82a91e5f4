use crate::domain::message::{Message, MessageContent, MessageId};
use crate::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;

pub mod memory;
pub mod postgres;

pub use memory::MemoryMessageStore;
pub use postgres::PgMessageStore;

/// Persistence for ephemeral messages.
///
/// Implementations generate identifiers and enforce expiry themselves. Every
/// deletion path must tolerate the record already being gone.
#[async_trait]
pub trait MessageStore: Send + Sync + Debug + 'static {
    /// Stores `content` under a freshly generated id.
    ///
    /// Returns `AppError::IdCollision` if the generated id is already taken.
    async fn insert(&self, content: MessageContent) -> Result<Message>;

    /// Returns the record if it is still live. Expired records are removed and reported as `None`.
    async fn get_live(&self, id: &MessageId) -> Result<Option<Message>>;

    /// Deletes every expired record and returns how many were removed.
    async fn reap(&self) -> Result<u64>;

    async fn ping(&self) -> Result<()>;
}

/// What happens to a live message once it has been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    #[default]
    Repeatable,
    /// The first successful read also removes the record.
    Once,
}

impl ReadPolicy {
    #[must_use]
    pub const fn from_burn_after_read(burn: bool) -> Self {
        if burn { Self::Once } else { Self::Repeatable }
    }
}
