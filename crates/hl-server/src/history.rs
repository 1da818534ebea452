//! History pull path.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use hl_proto::{ChatId, HistoryEntry, UserId};
use hl_store::MessageStore;

use crate::error::CoreError;
use crate::retry::RetryPolicy;

pub struct HistoryService {
    messages: Arc<dyn MessageStore>,
    retry: RetryPolicy,
    default_limit: usize,
    max_limit: usize,
}

impl HistoryService {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        retry: RetryPolicy,
        default_limit: usize,
        max_limit: usize,
    ) -> Self {
        Self {
            messages,
            retry,
            default_limit,
            max_limit,
        }
    }

    /// Messages of `chat_id` created before `before` (default: now), oldest
    /// first. Only a participant of the chat may read it.
    pub async fn fetch(
        &self,
        requester: &UserId,
        chat_id: &str,
        before: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<(ChatId, Vec<HistoryEntry>), CoreError> {
        let chat = ChatId::parse(chat_id)?;
        if !chat.contains(requester) {
            return Err(CoreError::Authorization(format!(
                "{requester} is not a participant of {chat}"
            )));
        }
        let limit = limit
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit);
        let before = before.unwrap_or_else(Utc::now);

        let mut records = self
            .retry
            .run("query_by_chat", || {
                self.messages.query_by_chat(&chat, before, limit)
            })
            .await?;
        records.reverse();

        let entries = records
            .into_iter()
            .map(|r| HistoryEntry {
                message_id: r.id,
                state: r.state,
                envelope: r.envelope,
            })
            .collect();
        Ok((chat, entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, SubsecRound};
    use hl_proto::{DeliveryState, Envelope, MessageType};
    use hl_store::MemoryStore;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn envelope(from: &str, to: &str, seconds_ago: i64) -> Envelope {
        let (sender_id, receiver_id) = (uid(from), uid(to));
        Envelope {
            chat_id: ChatId::between(&sender_id, &receiver_id).unwrap(),
            sender_id,
            receiver_id,
            ciphertext: vec![seconds_ago as u8],
            wrapped_key: vec![0],
            iv: vec![0; 12],
            auth_tag: vec![0; 16],
            signature: vec![0],
            message_type: MessageType::Text,
            created_at: (Utc::now() - Duration::seconds(seconds_ago)).trunc_subsecs(6),
        }
    }

    async fn seeded(count: i64) -> (Arc<MemoryStore>, HistoryService) {
        let store = Arc::new(MemoryStore::new());
        for i in 0..count {
            let (from, to) = if i % 2 == 0 { ("alice", "bob") } else { ("bob", "alice") };
            store
                .append(&envelope(from, to, count - i), DeliveryState::Sent)
                .await
                .unwrap();
        }
        let service = HistoryService::new(store.clone(), RetryPolicy::new(1, 0), 3, 5);
        (store, service)
    }

    #[tokio::test]
    async fn returns_latest_window_oldest_first() {
        let (_store, history) = seeded(6).await;
        let (chat, entries) = history.fetch(&uid("bob"), "alice_bob", None, None).await.unwrap();
        assert_eq!(chat.as_str(), "alice_bob");
        assert_eq!(entries.len(), 3, "default limit");
        let times: Vec<_> = entries.iter().map(|e| e.envelope.created_at).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
        assert_eq!(entries[2].envelope.ciphertext, vec![1u8], "newest message is last");
    }

    #[tokio::test]
    async fn limit_is_clamped() {
        let (_store, history) = seeded(8).await;
        let (_, entries) = history.fetch(&uid("alice"), "alice_bob", None, Some(100)).await.unwrap();
        assert_eq!(entries.len(), 5);
        let (_, entries) = history.fetch(&uid("alice"), "alice_bob", None, Some(0)).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn paging_with_before() {
        let (_store, history) = seeded(6).await;
        let (_, page1) = history.fetch(&uid("alice"), "alice_bob", None, Some(3)).await.unwrap();
        let oldest = page1[0].envelope.created_at;
        let (_, page2) = history
            .fetch(&uid("alice"), "alice_bob", Some(oldest), Some(3))
            .await
            .unwrap();
        assert_eq!(page2.len(), 3);
        assert!(page2.iter().all(|e| e.envelope.created_at < oldest));
    }

    #[tokio::test]
    async fn outsiders_and_bad_ids_are_rejected() {
        let (_store, history) = seeded(2).await;
        assert!(matches!(
            history.fetch(&uid("carol"), "alice_bob", None, None).await,
            Err(CoreError::Authorization(_))
        ));
        assert!(matches!(
            history.fetch(&uid("alice"), "bob_alice", None, None).await,
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn tombstoned_messages_are_hidden() {
        let (store, history) = seeded(2).await;
        let (_, before) = history.fetch(&uid("alice"), "alice_bob", None, None).await.unwrap();
        store.tombstone(before[0].message_id, Utc::now()).await.unwrap();
        let (_, after) = history.fetch(&uid("alice"), "alice_bob", None, None).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].message_id, before[1].message_id);
    }
}
