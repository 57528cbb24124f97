//! Conversation lifecycle and message flow.
//!
//! [`ChatService`] orchestrates the [`KeyStore`] and the cipher wrapper
//! around the document store: messages are encrypted before they are
//! appended and decrypted as live snapshots arrive. Delivery between
//! devices is eventually consistent via the store's push subscriptions;
//! ordering follows the store's server-assigned timestamps.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use causerie_shared::constants::MAX_MESSAGE_SIZE;
use causerie_shared::crypto::{self, SymmetricKey};
use causerie_shared::types::{ConversationId, MessageId, UserId};
use causerie_store::{
    Conversation, ConversationPatch, DocumentStore, Message, NewConversation, NewMessage,
    SecureStore,
};

use crate::error::{ChatError, Result};
use crate::keys::KeyStore;

/// A message as handed to subscribers: payload decrypted, store metadata
/// kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    pub id: MessageId,
    pub sender: UserId,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub read: bool,
}

/// Handle to a live subscription. Dropping it (or calling
/// [`Subscription::unsubscribe`]) cancels the underlying task and releases
/// the live query.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct ChatService {
    documents: Arc<dyn DocumentStore>,
    keys: KeyStore,
}

impl ChatService {
    pub fn new(documents: Arc<dyn DocumentStore>, secure: Arc<dyn SecureStore>) -> Self {
        let keys = KeyStore::new(documents.clone(), secure);
        Self { documents, keys }
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Create a conversation between two users. One key is generated for
    /// the conversation's entire lifetime, pre-populated in the shared
    /// record for both participants, and cached on this device for the
    /// creator (`user_a`).
    pub async fn create_conversation(
        &self,
        user_a: &UserId,
        user_b: &UserId,
        name_a: &str,
        name_b: &str,
    ) -> Result<ConversationId> {
        let key = crypto::generate_symmetric_key();
        let encoded = crypto::key_to_base64(&key);

        let id = self
            .documents
            .create_conversation(NewConversation {
                participants: [user_a.clone(), user_b.clone()],
                participant_names: [name_a.to_string(), name_b.to_string()],
                keys_by_user: HashMap::from([
                    (user_a.clone(), encoded.clone()),
                    (user_b.clone(), encoded),
                ]),
            })
            .await?;

        // Both shared copies already exist; only the creator's cache is warmed.
        self.keys.save_key(id, &key, None).await?;

        info!(conversation = %id, "conversation created");
        Ok(id)
    }

    /// Find an existing conversation between two users. Linear in the
    /// number of conversations containing `user_a`.
    pub async fn find_conversation(
        &self,
        user_a: &UserId,
        user_b: &UserId,
    ) -> Result<Option<ConversationId>> {
        let conversations = self.documents.conversations_for(user_a).await?;
        Ok(conversations
            .into_iter()
            .find(|c| c.is_participant(user_b))
            .map(|c| c.id))
    }

    /// Encrypt and send a message. `sender` is recorded on the message
    /// document; `user` is the account the key is resolved for (the two
    /// coincide on a user's own device). Fails without sending anything if
    /// no key can be resolved; plaintext is never a fallback.
    pub async fn send_message(
        &self,
        conversation: ConversationId,
        sender: &UserId,
        plaintext: &str,
        user: &UserId,
    ) -> Result<MessageId> {
        if plaintext.len() > MAX_MESSAGE_SIZE {
            return Err(ChatError::MessageTooLarge(plaintext.len()));
        }

        let key = self.keys.load_key(conversation, user).await?;
        let payload = crypto::seal_text(&key, plaintext)?;

        let message_id = self
            .documents
            .append_message(
                conversation,
                NewMessage {
                    sender: sender.clone(),
                    payload,
                },
            )
            .await?;

        let doc = self.documents.conversation(conversation).await?;
        self.documents
            .update_conversation(
                conversation,
                ConversationPatch {
                    touch_last_message: true,
                    increment_unread: doc.other_participant(sender).cloned(),
                    ..ConversationPatch::default()
                },
            )
            .await?;

        info!(conversation = %conversation, message = %message_id, "message sent");
        Ok(message_id)
    }

    /// Subscribe to a conversation's messages. On every snapshot the key is
    /// resolved once and each message decrypted; `callback` receives the
    /// full list in ascending timestamp order. Messages that fail
    /// authentication are dropped from the list (logged); a snapshot whose
    /// key cannot be resolved decrypts nothing that tick.
    pub async fn subscribe_to_messages<F>(
        &self,
        conversation: ConversationId,
        user: &UserId,
        callback: F,
    ) -> Result<Subscription>
    where
        F: Fn(Vec<DecryptedMessage>) + Send + Sync + 'static,
    {
        let mut feed = self.documents.watch_messages(conversation).await?;
        let keys = self.keys.clone();
        let user = user.clone();

        let task = tokio::spawn(async move {
            loop {
                let batch = feed.borrow_and_update().clone();
                match keys.load_key(conversation, &user).await {
                    Ok(key) => callback(decrypt_batch(conversation, &key, batch)),
                    Err(e) => {
                        warn!(
                            conversation = %conversation,
                            error = %e,
                            "no key for this snapshot, nothing decrypted"
                        );
                    }
                }

                if feed.changed().await.is_err() {
                    debug!(conversation = %conversation, "message feed closed");
                    break;
                }
            }
        });

        Ok(Subscription { task })
    }

    /// Subscribe to the live list of conversations containing `user`,
    /// ordered by most-recent activity.
    pub async fn subscribe_to_conversations<F>(
        &self,
        user: &UserId,
        callback: F,
    ) -> Result<Subscription>
    where
        F: Fn(Vec<Conversation>) + Send + Sync + 'static,
    {
        let mut feed = self.documents.watch_conversations(user).await?;

        let task = tokio::spawn(async move {
            loop {
                callback(feed.borrow_and_update().clone());
                if feed.changed().await.is_err() {
                    break;
                }
            }
        });

        Ok(Subscription { task })
    }

    /// Mark every message not sent by `user` as read and reset `user`'s
    /// unread counter. The per-message writes are independent, not a
    /// transaction: a failure mid-batch leaves earlier flags flipped and
    /// the counter untouched.
    pub async fn mark_messages_as_read(
        &self,
        conversation: ConversationId,
        user: &UserId,
    ) -> Result<()> {
        let unread = self
            .documents
            .unread_messages_from_others(conversation, user)
            .await?;

        for message in &unread {
            self.documents
                .mark_message_read(conversation, message.id)
                .await?;
        }

        self.documents
            .update_conversation(
                conversation,
                ConversationPatch {
                    reset_unread: Some(user.clone()),
                    ..ConversationPatch::default()
                },
            )
            .await?;

        debug!(
            conversation = %conversation,
            count = unread.len(),
            "messages marked as read"
        );
        Ok(())
    }
}

fn decrypt_batch(
    conversation: ConversationId,
    key: &SymmetricKey,
    batch: Vec<Message>,
) -> Vec<DecryptedMessage> {
    let mut out = Vec::with_capacity(batch.len());
    for message in batch {
        match crypto::open_text(key, &message.payload) {
            Ok(text) => out.push(DecryptedMessage {
                id: message.id,
                sender: message.sender,
                text,
                sent_at: message.sent_at,
                read: message.read,
            }),
            Err(e) => {
                warn!(
                    conversation = %conversation,
                    message = %message.id,
                    error = %e,
                    "dropping undecryptable message"
                );
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use tokio::sync::mpsc;

    use causerie_store::{MemorySecureStore, MemoryStore, StoreError};

    /// One service per simulated device: shared documents, private cache.
    fn device(documents: &MemoryStore) -> ChatService {
        ChatService::new(
            Arc::new(documents.clone()),
            Arc::new(MemorySecureStore::new()),
        )
    }

    #[allow(clippy::type_complexity)]
    fn collector() -> (
        Box<dyn Fn(Vec<DecryptedMessage>) + Send + Sync>,
        mpsc::UnboundedReceiver<Vec<DecryptedMessage>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Box::new(move |batch| {
                let _ = tx.send(batch);
            }),
            rx,
        )
    }

    /// Wait for the first snapshot holding `len` messages.
    async fn snapshot_with_len(
        rx: &mut mpsc::UnboundedReceiver<Vec<DecryptedMessage>>,
        len: usize,
    ) -> Vec<DecryptedMessage> {
        loop {
            let batch = rx.recv().await.expect("subscription ended");
            if batch.len() == len {
                return batch;
            }
        }
    }

    #[tokio::test]
    async fn happy_path() {
        let documents = MemoryStore::new();
        let alice = device(&documents);
        let bob = device(&documents);

        let a: UserId = "alice".into();
        let b: UserId = "bob".into();

        assert_eq!(alice.find_conversation(&a, &b).await.unwrap(), None);

        let id = alice
            .create_conversation(&a, &b, "Alice", "Bob")
            .await
            .unwrap();
        assert_eq!(alice.find_conversation(&a, &b).await.unwrap(), Some(id));
        assert_eq!(bob.find_conversation(&b, &a).await.unwrap(), Some(id));

        let (callback, mut rx) = collector();
        let _sub = bob.subscribe_to_messages(id, &b, callback).await.unwrap();

        alice.send_message(id, &a, "hi", &a).await.unwrap();

        // Both participants resolve the identical key.
        let key_a = alice.keys().load_key(id, &a).await.unwrap();
        let key_b = bob.keys().load_key(id, &b).await.unwrap();
        assert_eq!(key_a, key_b);

        let batch = snapshot_with_len(&mut rx, 1).await;
        assert_eq!(batch[0].text, "hi");
        assert_eq!(batch[0].sender, a);
        assert!(!batch[0].read);
    }

    #[tokio::test]
    async fn unread_accounting() {
        let documents = MemoryStore::new();
        let alice = device(&documents);
        let bob = device(&documents);

        let a: UserId = "alice".into();
        let b: UserId = "bob".into();
        let id = alice
            .create_conversation(&a, &b, "Alice", "Bob")
            .await
            .unwrap();

        for i in 0..4 {
            alice
                .send_message(id, &a, &format!("message {i}"), &a)
                .await
                .unwrap();
        }
        assert_eq!(documents.conversation(id).await.unwrap().unread_for(&b), 4);
        assert_eq!(documents.conversation(id).await.unwrap().unread_for(&a), 0);

        bob.mark_messages_as_read(id, &b).await.unwrap();

        let doc = documents.conversation(id).await.unwrap();
        assert_eq!(doc.unread_for(&b), 0);
        assert!(documents
            .unread_messages_from_others(id, &b)
            .await
            .unwrap()
            .is_empty());

        // The flags flipped on exactly the messages Bob received.
        let (callback, mut rx) = collector();
        let _sub = bob
            .subscribe_to_messages(id, &b, callback)
            .await
            .unwrap();
        let batch = snapshot_with_len(&mut rx, 4).await;
        assert!(batch.iter().all(|m| m.read));
    }

    #[tokio::test]
    async fn send_fails_without_resolvable_key() {
        let documents = MemoryStore::new();
        let key = crypto::generate_symmetric_key();
        let id = documents
            .create_conversation(NewConversation {
                participants: ["alice".into(), "bob".into()],
                participant_names: ["Alice".to_string(), "Bob".to_string()],
                keys_by_user: HashMap::from([("alice".into(), crypto::key_to_base64(&key))]),
            })
            .await
            .unwrap();

        let bob = device(&documents);
        let b: UserId = "bob".into();
        let result = bob.send_message(id, &b, "hello?", &b).await;
        assert!(matches!(result, Err(ChatError::KeyNotFound { .. })));

        // Nothing was appended and no counter moved.
        let feed = documents.watch_messages(id).await.unwrap();
        assert!(feed.borrow().is_empty());
        assert_eq!(
            documents
                .conversation(id)
                .await
                .unwrap()
                .unread_for(&"alice".into()),
            0
        );
    }

    #[tokio::test]
    async fn oversized_plaintext_is_rejected() {
        let documents = MemoryStore::new();
        let alice = device(&documents);
        let a: UserId = "alice".into();
        let b: UserId = "bob".into();
        let id = alice
            .create_conversation(&a, &b, "Alice", "Bob")
            .await
            .unwrap();

        let huge = "x".repeat(MAX_MESSAGE_SIZE + 1);
        assert!(matches!(
            alice.send_message(id, &a, &huge, &a).await,
            Err(ChatError::MessageTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn legacy_conversation_migrates_on_first_use() {
        let documents = MemoryStore::new();
        let id = documents
            .create_conversation(NewConversation {
                participants: ["alice".into(), "bob".into()],
                participant_names: ["Alice".to_string(), "Bob".to_string()],
                keys_by_user: HashMap::new(),
            })
            .await
            .unwrap();

        let alice = device(&documents);
        let bob = device(&documents);
        let a: UserId = "alice".into();
        let b: UserId = "bob".into();

        // First touch migrates; Bob then reads Alice's message with the
        // migrated key resolved from the shared record.
        alice.send_message(id, &a, "migrated", &a).await.unwrap();

        let (callback, mut rx) = collector();
        let _sub = bob.subscribe_to_messages(id, &b, callback).await.unwrap();
        let batch = snapshot_with_len(&mut rx, 1).await;
        assert_eq!(batch[0].text, "migrated");
    }

    #[tokio::test]
    async fn corrupted_message_is_omitted_not_fatal() {
        let documents = MemoryStore::new();
        let alice = device(&documents);
        let bob = device(&documents);
        let a: UserId = "alice".into();
        let b: UserId = "bob".into();
        let id = alice
            .create_conversation(&a, &b, "Alice", "Bob")
            .await
            .unwrap();

        alice.send_message(id, &a, "first", &a).await.unwrap();

        // Corrupt a second message in storage: one flipped ciphertext byte.
        let key = alice.keys().load_key(id, &a).await.unwrap();
        let mut sealed = BASE64
            .decode(crypto::seal_text(&key, "second").unwrap())
            .unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        documents
            .append_message(
                id,
                NewMessage {
                    sender: a.clone(),
                    payload: BASE64.encode(sealed),
                },
            )
            .await
            .unwrap();

        alice.send_message(id, &a, "third", &a).await.unwrap();

        let (callback, mut rx) = collector();
        let _sub = bob.subscribe_to_messages(id, &b, callback).await.unwrap();

        // Three stored, two readable: the corrupted one is dropped silently.
        let batch = snapshot_with_len(&mut rx, 2).await;
        assert_eq!(batch[0].text, "first");
        assert_eq!(batch[1].text, "third");
        assert!(batch[0].sent_at < batch[1].sent_at);
    }

    #[tokio::test]
    async fn conversation_list_tracks_activity() {
        let documents = MemoryStore::new();
        let alice = device(&documents);
        let a: UserId = "alice".into();
        let b: UserId = "bob".into();
        let c: UserId = "carol".into();

        let with_bob = alice.create_conversation(&a, &b, "Alice", "Bob").await.unwrap();
        let with_carol = alice
            .create_conversation(&a, &c, "Alice", "Carol")
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = alice
            .subscribe_to_conversations(&a, move |list| {
                let _ = tx.send(list.iter().map(|c| c.id).collect::<Vec<_>>());
            })
            .await
            .unwrap();

        alice.send_message(with_bob, &a, "bump", &a).await.unwrap();

        loop {
            let order = rx.recv().await.expect("subscription ended");
            if order == vec![with_bob, with_carol] {
                break;
            }
            assert_eq!(order, vec![with_carol, with_bob]);
        }
    }

    #[tokio::test]
    async fn send_to_unknown_conversation_propagates_store_error() {
        let documents = MemoryStore::new();
        let alice = device(&documents);
        let a: UserId = "alice".into();
        let result = alice
            .send_message(ConversationId::new(), &a, "hello", &a)
            .await;
        assert!(matches!(
            result,
            Err(ChatError::Store(StoreError::NotFound))
        ));
    }
}
