//! Backend traits the chat layer is written against.

use async_trait::async_trait;
use tokio::sync::watch;

use causerie_shared::types::{ConversationId, MessageId, UserId};

use crate::error::Result;
use crate::models::{Conversation, ConversationPatch, Message, NewConversation, NewMessage};

/// A document store holding the shared conversation collection and the
/// per-conversation message sub-collections.
///
/// Live queries are exposed as `tokio::sync::watch` receivers: each update
/// pushes the full, ordered result set, mirroring snapshot-style listeners.
/// Dropping the receiver releases the live query. A fresh receiver already
/// holds the current snapshot; callers deliver it first and then await
/// changes.
///
/// Documents are validated on write ([`Conversation::validate`]); a backend
/// must reject shapes that do not match the model rather than store them.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a conversation with a store-generated id. `created_at` and
    /// `last_message_at` are set to the server time.
    async fn create_conversation(&self, new: NewConversation) -> Result<ConversationId>;

    /// Point read by id.
    async fn conversation(&self, id: ConversationId) -> Result<Conversation>;

    /// Merge-update a conversation document. See [`ConversationPatch`] for
    /// the merge semantics; counter updates are applied atomically with
    /// respect to the backend.
    async fn update_conversation(&self, id: ConversationId, patch: ConversationPatch)
        -> Result<()>;

    /// One-shot query: conversations whose `participants` contains `user`,
    /// ordered by most-recent activity.
    async fn conversations_for(&self, user: &UserId) -> Result<Vec<Conversation>>;

    /// Live variant of [`Self::conversations_for`].
    async fn watch_conversations(
        &self,
        user: &UserId,
    ) -> Result<watch::Receiver<Vec<Conversation>>>;

    /// Append a message to a conversation's sub-collection. The store
    /// assigns the id and a monotonic server timestamp, and sets
    /// `read = false`. Does not touch the conversation document itself.
    async fn append_message(
        &self,
        conversation: ConversationId,
        new: NewMessage,
    ) -> Result<MessageId>;

    /// Flip a single message's `read` flag to true.
    async fn mark_message_read(
        &self,
        conversation: ConversationId,
        message: MessageId,
    ) -> Result<()>;

    /// One-shot filtered query: messages with `sender != user` and
    /// `read == false`, in timestamp order.
    async fn unread_messages_from_others(
        &self,
        conversation: ConversationId,
        user: &UserId,
    ) -> Result<Vec<Message>>;

    /// Live query over a conversation's messages, ordered by timestamp
    /// ascending. Every push carries the full ordered snapshot.
    async fn watch_messages(
        &self,
        conversation: ConversationId,
    ) -> Result<watch::Receiver<Vec<Message>>>;
}

/// Device-local secure key/value storage (keychain / keystore stand-in).
///
/// Scoped to the device, assumed confidential but not durable across
/// reinstall. Used by the key layer as a read-through cache ahead of the
/// shared conversation record; it is an optimization, never the source of
/// truth.
#[async_trait]
pub trait SecureStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;
}
