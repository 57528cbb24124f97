//! In-memory reference backend.
//!
//! Process-local implementation of [`DocumentStore`] used by tests and the
//! demo binary. Live queries are backed by `tokio::sync::watch` channels;
//! every mutation pushes a full, ordered snapshot to the affected feeds,
//! mirroring snapshot-style listeners of a hosted document store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::debug;

use causerie_shared::types::{ConversationId, MessageId, UserId};

use crate::error::{Result, StoreError};
use crate::models::{Conversation, ConversationPatch, Message, NewConversation, NewMessage};
use crate::traits::DocumentStore;

/// Shared in-memory document store. Clones share the same underlying state,
/// so one instance can serve several simulated devices.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    conversations: HashMap<ConversationId, ConversationRecord>,
    /// Lazily-created per-user feeds for the conversation-list live query.
    conversation_feeds: HashMap<UserId, watch::Sender<Vec<Conversation>>>,
    last_timestamp: Option<DateTime<Utc>>,
}

struct ConversationRecord {
    doc: Conversation,
    /// Append-only, kept in `sent_at` order (timestamps are monotonic).
    messages: Vec<Message>,
    message_feed: watch::Sender<Vec<Message>>,
}

impl Inner {
    /// Server-assigned timestamp: wall clock, forced strictly monotonic.
    fn server_now(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + Duration::milliseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now
    }

    fn conversations_snapshot(&self, user: &UserId) -> Vec<Conversation> {
        let mut list: Vec<Conversation> = self
            .conversations
            .values()
            .filter(|r| r.doc.is_participant(user))
            .map(|r| r.doc.clone())
            .collect();
        list.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        list
    }

    /// Push fresh conversation-list snapshots to both participants' feeds.
    fn notify_conversation_feeds(&self, id: ConversationId) {
        let participants = match self.conversations.get(&id) {
            Some(record) => record.doc.participants.clone(),
            None => return,
        };
        for user in &participants {
            if let Some(feed) = self.conversation_feeds.get(user) {
                feed.send_replace(self.conversations_snapshot(user));
            }
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means another thread panicked mid-mutation;
        // the state itself is still usable for an in-memory test backend.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_conversation(&self, new: NewConversation) -> Result<ConversationId> {
        let mut inner = self.lock();
        let now = inner.server_now();

        let [a, b] = new.participants;
        let [name_a, name_b] = new.participant_names;
        let doc = Conversation {
            id: ConversationId::new(),
            participants: vec![a.clone(), b.clone()],
            participant_names: HashMap::from([(a.clone(), name_a), (b.clone(), name_b)]),
            created_at: now,
            last_message_at: now,
            keys_by_user: new.keys_by_user,
            unread: HashMap::from([(a, 0), (b, 0)]),
        };
        doc.validate()?;

        let id = doc.id;
        let (message_feed, _) = watch::channel(Vec::new());
        inner.conversations.insert(
            id,
            ConversationRecord {
                doc,
                messages: Vec::new(),
                message_feed,
            },
        );
        inner.notify_conversation_feeds(id);

        debug!(conversation = %id, "conversation created");
        Ok(id)
    }

    async fn conversation(&self, id: ConversationId) -> Result<Conversation> {
        let inner = self.lock();
        inner
            .conversations
            .get(&id)
            .map(|record| record.doc.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn update_conversation(
        &self,
        id: ConversationId,
        patch: ConversationPatch,
    ) -> Result<()> {
        let mut inner = self.lock();
        let now = patch.touch_last_message.then(|| inner.server_now());

        let record = inner.conversations.get_mut(&id).ok_or(StoreError::NotFound)?;

        for user in patch
            .merge_keys
            .keys()
            .chain(patch.increment_unread.iter())
            .chain(patch.reset_unread.iter())
        {
            if !record.doc.is_participant(user) {
                return Err(StoreError::InvalidDocument(format!(
                    "patch targets non-participant user {user}"
                )));
            }
        }

        if let Some(now) = now {
            record.doc.last_message_at = now;
        }
        record.doc.keys_by_user.extend(patch.merge_keys);
        if let Some(user) = patch.increment_unread {
            *record.doc.unread.entry(user).or_insert(0) += 1;
        }
        if let Some(user) = patch.reset_unread {
            record.doc.unread.insert(user, 0);
        }

        inner.notify_conversation_feeds(id);
        Ok(())
    }

    async fn conversations_for(&self, user: &UserId) -> Result<Vec<Conversation>> {
        Ok(self.lock().conversations_snapshot(user))
    }

    async fn watch_conversations(
        &self,
        user: &UserId,
    ) -> Result<watch::Receiver<Vec<Conversation>>> {
        let mut inner = self.lock();
        if !inner.conversation_feeds.contains_key(user) {
            let snapshot = inner.conversations_snapshot(user);
            inner
                .conversation_feeds
                .insert(user.clone(), watch::channel(snapshot).0);
        }
        Ok(inner.conversation_feeds[user].subscribe())
    }

    async fn append_message(
        &self,
        conversation: ConversationId,
        new: NewMessage,
    ) -> Result<MessageId> {
        let mut inner = self.lock();
        let now = inner.server_now();

        let record = inner
            .conversations
            .get_mut(&conversation)
            .ok_or(StoreError::NotFound)?;

        let message = Message {
            id: MessageId::new(),
            sender: new.sender,
            payload: new.payload,
            sent_at: now,
            read: false,
        };
        let id = message.id;
        record.messages.push(message);
        record.message_feed.send_replace(record.messages.clone());

        debug!(conversation = %conversation, message = %id, "message appended");
        Ok(id)
    }

    async fn mark_message_read(
        &self,
        conversation: ConversationId,
        message: MessageId,
    ) -> Result<()> {
        let mut inner = self.lock();
        let record = inner
            .conversations
            .get_mut(&conversation)
            .ok_or(StoreError::NotFound)?;

        let entry = record
            .messages
            .iter_mut()
            .find(|m| m.id == message)
            .ok_or(StoreError::NotFound)?;

        if !entry.read {
            entry.read = true;
            record.message_feed.send_replace(record.messages.clone());
        }
        Ok(())
    }

    async fn unread_messages_from_others(
        &self,
        conversation: ConversationId,
        user: &UserId,
    ) -> Result<Vec<Message>> {
        let inner = self.lock();
        let record = inner
            .conversations
            .get(&conversation)
            .ok_or(StoreError::NotFound)?;

        Ok(record
            .messages
            .iter()
            .filter(|m| m.sender != *user && !m.read)
            .cloned()
            .collect())
    }

    async fn watch_messages(
        &self,
        conversation: ConversationId,
    ) -> Result<watch::Receiver<Vec<Message>>> {
        let inner = self.lock();
        let record = inner
            .conversations
            .get(&conversation)
            .ok_or(StoreError::NotFound)?;
        Ok(record.message_feed.subscribe())
    }
}
