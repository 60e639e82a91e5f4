use crate::adapters::storage::{MessageStore, ReadPolicy};
use crate::domain::clock::Clock;
use crate::domain::message::{Message, MessageContent, MessageId};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// In-process store keyed by message id. Locking is per shard and never held across an await.
#[derive(Debug)]
pub struct MemoryMessageStore {
    messages: DashMap<MessageId, Message>,
    clock: Arc<dyn Clock>,
    read_policy: ReadPolicy,
}

impl MemoryMessageStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, read_policy: ReadPolicy) -> Self {
        Self { messages: DashMap::new(), clock, read_policy }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Stores an already-built record. Fails on an occupied id.
    fn put(&self, message: Message) -> Result<Message> {
        match self.messages.entry(message.id) {
            Entry::Occupied(_) => Err(AppError::IdCollision),
            Entry::Vacant(slot) => {
                slot.insert(message.clone());
                Ok(message)
            }
        }
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    #[tracing::instrument(level = "debug", skip(self, content))]
    async fn insert(&self, content: MessageContent) -> Result<Message> {
        self.put(Message::new(content, self.clock.now()))
    }

    #[tracing::instrument(level = "debug", skip(self), fields(message.id = %id))]
    async fn get_live(&self, id: &MessageId) -> Result<Option<Message>> {
        let now = self.clock.now();

        if self.read_policy == ReadPolicy::Once {
            return match self.messages.remove_if(id, |_, m| !m.is_expired_at(now)) {
                Some((_, message)) => Ok(Some(message)),
                None => {
                    self.messages.remove_if(id, |_, m| m.is_expired_at(now));
                    Ok(None)
                }
            };
        }

        // Clone out before deleting: holding a shard guard across remove_if would deadlock.
        let found = self.messages.get(id).map(|entry| entry.value().clone());
        match found {
            Some(message) if !message.is_expired_at(now) => Ok(Some(message)),
            Some(_) => {
                self.messages.remove_if(id, |_, m| m.is_expired_at(now));
                tracing::debug!("Removed expired message on read");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn reap(&self) -> Result<u64> {
        let now = self.clock.now();
        let mut removed = 0u64;
        self.messages.retain(|_, m| {
            let keep = !m.is_expired_at(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;
    use crate::domain::message::MESSAGE_TTL;
    use time::Duration;
    use time::macros::datetime;

    fn store(policy: ReadPolicy) -> (Arc<ManualClock>, Arc<MemoryMessageStore>) {
        let clock = Arc::new(ManualClock::new(datetime!(2024-05-01 08:00:00 UTC)));
        let store = Arc::new(MemoryMessageStore::new(Arc::clone(&clock) as Arc<dyn Clock>, policy));
        (clock, store)
    }

    fn content(text: &str) -> MessageContent {
        MessageContent::parse(text).unwrap()
    }

    #[tokio::test]
    async fn test_insert_then_get_live() {
        let (clock, store) = store(ReadPolicy::Repeatable);
        let message = store.insert(content("hello")).await.unwrap();

        assert_eq!(message.created_at, clock.now());
        assert_eq!(message.expires_at, clock.now() + MESSAGE_TTL);

        let fetched = store.get_live(&message.id).await.unwrap();
        assert_eq!(fetched, Some(message.clone()));
        // Reads do not consume or extend the record
        assert_eq!(store.get_live(&message.id).await.unwrap(), Some(message));
    }

    #[tokio::test]
    async fn test_occupied_id_is_a_collision() {
        let (clock, store) = store(ReadPolicy::Repeatable);
        let message = Message::new(content("first"), clock.now());
        store.put(message.clone()).unwrap();

        let duplicate = Message { content: "second".into(), ..message };
        assert!(matches!(store.put(duplicate), Err(AppError::IdCollision)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_read_deletes_and_is_idempotent() {
        let (clock, store) = store(ReadPolicy::Repeatable);
        let message = store.insert(content("soon gone")).await.unwrap();

        clock.advance(MESSAGE_TTL);
        assert!(store.get_live(&message.id).await.unwrap().is_some(), "live at the exact expiry instant");

        clock.advance(Duration::seconds(1));
        assert_eq!(store.get_live(&message.id).await.unwrap(), None);
        assert!(store.is_empty());
        assert_eq!(store.get_live(&message.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_reads_of_expired_message() {
        let (clock, store) = store(ReadPolicy::Repeatable);
        let message = store.insert(content("racy")).await.unwrap();
        clock.advance(MESSAGE_TTL + Duration::seconds(1));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = message.id;
                tokio::spawn(async move { store.get_live(&id).await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), None);
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_reap_removes_only_expired() {
        let (clock, store) = store(ReadPolicy::Repeatable);
        let old = store.insert(content("old")).await.unwrap();
        clock.advance(Duration::hours(6));
        let fresh = store.insert(content("fresh")).await.unwrap();

        assert_eq!(store.reap().await.unwrap(), 0);

        clock.advance(Duration::hours(7));
        assert_eq!(store.reap().await.unwrap(), 1);
        assert_eq!(store.get_live(&old.id).await.unwrap(), None);
        assert_eq!(store.get_live(&fresh.id).await.unwrap(), Some(fresh));

        assert_eq!(store.reap().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reap_races_reads_without_exposing_expired() {
        let (clock, store) = store(ReadPolicy::Repeatable);
        let expired = store.insert(content("stale")).await.unwrap();
        clock.advance(MESSAGE_TTL + Duration::seconds(1));
        let live = store.insert(content("fresh")).await.unwrap();

        let reapers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.reap().await })
            })
            .collect();
        let readers: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                let (id, expect_live) = if i % 2 == 0 { (expired.id, false) } else { (live.id, true) };
                tokio::spawn(async move { (expect_live, store.get_live(&id).await) })
            })
            .collect();

        let mut reaped = 0;
        for handle in reapers {
            reaped += handle.await.unwrap().unwrap();
        }
        for handle in readers {
            let (expect_live, read) = handle.await.unwrap();
            assert_eq!(read.unwrap().is_some(), expect_live);
        }

        // Lazy deletes may beat every reaper to the expired record
        assert!(reaped <= 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_live(&live.id).await.unwrap(), Some(live));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_get_distinct_ids() {
        let (_clock, store) = store(ReadPolicy::Repeatable);

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.insert(content(&format!("message {i}"))).await })
            })
            .collect();

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            let message = handle.await.unwrap().unwrap();
            assert!(ids.insert(message.id), "duplicate id {}", message.id);
        }
        assert_eq!(store.len(), 64);
    }

    #[tokio::test]
    async fn test_read_once_policy_returns_message_a_single_time() {
        let (_clock, store) = store(ReadPolicy::Once);
        let message = store.insert(content("burn me")).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = message.id;
                tokio::spawn(async move { store.get_live(&id).await })
            })
            .collect();

        let mut seen = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                seen += 1;
            }
        }
        assert_eq!(seen, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_read_once_policy_still_hides_expired() {
        let (clock, store) = store(ReadPolicy::Once);
        let message = store.insert(content("late")).await.unwrap();
        clock.advance(MESSAGE_TTL + Duration::minutes(1));

        assert_eq!(store.get_live(&message.id).await.unwrap(), None);
        assert!(store.is_empty());
    }
}
