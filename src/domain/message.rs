use crate::error::ValidationError;
use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU32, Ordering};
use time::{Duration, OffsetDateTime};

/// How long a message stays readable after it is stored.
pub const MESSAGE_TTL: Duration = Duration::hours(12);

/// Upper bound on message length, counted in Unicode scalar values after trimming.
pub const MAX_CONTENT_CHARS: usize = 5000;

/// Length of the external hex rendering of a [`MessageId`].
pub const MESSAGE_ID_HEX_LEN: usize = 24;

const MESSAGE_ID_BYTES: usize = 12;

static PROCESS_UNIQUE: LazyLock<[u8; 5]> = LazyLock::new(|| {
    let mut bytes = [0u8; 5];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
});

static COUNTER: LazyLock<AtomicU32> = LazyLock::new(|| AtomicU32::new(rand::random::<u32>()));

/// A 12-byte message identifier laid out like an object id:
/// 4-byte big-endian unix seconds, 5 per-process random bytes, 3-byte counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId([u8; MESSAGE_ID_BYTES]);

impl MessageId {
    #[must_use]
    pub fn generate(now: OffsetDateTime) -> Self {
        let seconds = u32::try_from(now.unix_timestamp()).unwrap_or_default();
        let count = COUNTER.fetch_add(1, Ordering::Relaxed).to_be_bytes();

        let mut bytes = [0u8; MESSAGE_ID_BYTES];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..].copy_from_slice(&count[1..]);
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; MESSAGE_ID_BYTES] {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != MESSAGE_ID_HEX_LEN {
            return Err(ValidationError::InvalidId);
        }
        let mut bytes = [0u8; MESSAGE_ID_BYTES];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| ValidationError::InvalidId)?;
        Ok(Self(bytes))
    }
}

impl TryFrom<&[u8]> for MessageId {
    type Error = ValidationError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; MESSAGE_ID_BYTES] = value.try_into().map_err(|_| ValidationError::InvalidId)?;
        Ok(Self(bytes))
    }
}

/// Trimmed, length-checked message text. The only way to hand content to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent(String);

impl MessageContent {
    /// Trims `raw` and checks it against the length bounds.
    ///
    /// # Errors
    /// Returns `ValidationError::EmptyContent` if nothing is left after trimming.
    /// Returns `ValidationError::TooLong` if the trimmed text exceeds [`MAX_CONTENT_CHARS`].
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        if trimmed.chars().count() > MAX_CONTENT_CHARS {
            return Err(ValidationError::TooLong { max: MAX_CONTENT_CHARS });
        }
        Ok(Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl Message {
    /// Builds a fresh record stamped at `now`.
    #[must_use]
    pub fn new(content: MessageContent, now: OffsetDateTime) -> Self {
        Self { id: MessageId::generate(now), content: content.into_inner(), created_at: now, expires_at: now + MESSAGE_TTL }
    }

    /// A message stays live up to and including its expiry instant.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at < now
    }
}
