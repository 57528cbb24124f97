//! Layered resolution of per-conversation symmetric keys.
//!
//! The shared conversation record is authoritative: its `keys_by_user` map
//! holds one copy of the conversation key per participant. The device
//! secure store acts as a read-through cache in front of it, populated
//! from the record on a miss and never the other way around except when a
//! fresh key is being created. Cache writes are best-effort and never
//! block a lookup.

use std::sync::Arc;

use tracing::{debug, warn};

use causerie_shared::constants::KEY_CACHE_PREFIX;
use causerie_shared::crypto::{self, SymmetricKey};
use causerie_shared::types::{ConversationId, UserId};
use causerie_store::{ConversationPatch, DocumentStore, SecureStore};

use crate::error::{ChatError, Result};

fn cache_entry(conversation: ConversationId) -> String {
    format!("{KEY_CACHE_PREFIX}{conversation}")
}

#[derive(Clone)]
pub struct KeyStore {
    documents: Arc<dyn DocumentStore>,
    secure: Arc<dyn SecureStore>,
}

impl KeyStore {
    pub fn new(documents: Arc<dyn DocumentStore>, secure: Arc<dyn SecureStore>) -> Self {
        Self { documents, secure }
    }

    /// Persist a key: always into the device cache, and when `user` is
    /// given, merged into the shared record's per-user map. The merge never
    /// touches other users' copies.
    pub async fn save_key(
        &self,
        conversation: ConversationId,
        key: &SymmetricKey,
        user: Option<&UserId>,
    ) -> Result<()> {
        let encoded = crypto::key_to_base64(key);
        self.secure.set(&cache_entry(conversation), &encoded).await?;

        if let Some(user) = user {
            self.documents
                .update_conversation(
                    conversation,
                    ConversationPatch::merge_key(user.clone(), encoded),
                )
                .await?;
        }
        Ok(())
    }

    /// Resolve the key for `(conversation, user)`.
    ///
    /// Lookup order: device cache, then the shared record (with cache
    /// write-back), then, only when the record has no per-user keys at
    /// all, a lazy migration that generates one key for every participant.
    pub async fn load_key(
        &self,
        conversation: ConversationId,
        user: &UserId,
    ) -> Result<SymmetricKey> {
        let entry = cache_entry(conversation);

        // Fast path: no network.
        if let Some(cached) = self.secure.get(&entry).await? {
            match crypto::key_from_base64(&cached) {
                Ok(key) => return Ok(key),
                Err(e) => {
                    // Treat as a miss; the shared record repairs the cache below.
                    warn!(
                        conversation = %conversation,
                        error = %e,
                        "discarding undecodable cached key"
                    );
                }
            }
        }

        let doc = self.documents.conversation(conversation).await?;

        if let Some(encoded) = doc.keys_by_user.get(user) {
            let key = crypto::key_from_base64(encoded)?;
            if let Err(e) = self.secure.set(&entry, encoded).await {
                warn!(
                    conversation = %conversation,
                    error = %e,
                    "failed to cache conversation key"
                );
            }
            return Ok(key);
        }

        if !doc.keys_by_user.is_empty() {
            // Keys exist for other participants but not this user: there is
            // nothing to recover the key from.
            return Err(ChatError::KeyNotFound {
                conversation,
                user: user.clone(),
            });
        }

        // Conversation predates per-user key storage: generate one key and
        // write it for every participant. Two participants racing this
        // migration can persist different keys; the write is deliberately
        // not guarded (see DESIGN.md).
        debug!(conversation = %conversation, "migrating conversation to per-user keys");
        let key = crypto::generate_symmetric_key();
        let encoded = crypto::key_to_base64(&key);
        let patch = ConversationPatch {
            merge_keys: doc
                .participants
                .iter()
                .map(|p| (p.clone(), encoded.clone()))
                .collect(),
            ..ConversationPatch::default()
        };
        self.documents.update_conversation(conversation, patch).await?;

        if let Err(e) = self.secure.set(&entry, &encoded).await {
            warn!(
                conversation = %conversation,
                error = %e,
                "failed to cache migrated conversation key"
            );
        }
        Ok(key)
    }
}
