//! Domain model structs exchanged with the document store.
//!
//! Every struct derives `Serialize` and `Deserialize` so backends can map
//! them onto their own document representation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use causerie_shared::types::{ConversationId, MessageId, UserId};

use crate::error::{Result, StoreError};

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A 1:1 conversation document shared by both participants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    /// Unique conversation identifier (store-generated).
    pub id: ConversationId,
    /// Exactly two distinct participants.
    pub participants: Vec<UserId>,
    /// Display names keyed by participant, for list rendering.
    pub participant_names: HashMap<UserId, String>,
    /// When the conversation was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent message (equals `created_at` before the
    /// first message).
    pub last_message_at: DateTime<Utc>,
    /// Per-participant copy of the conversation key, base64-encoded.
    /// An empty map marks a conversation created before per-user key
    /// storage existed and triggers the lazy key migration on first read.
    #[serde(default)]
    pub keys_by_user: HashMap<UserId, String>,
    /// Per-participant unread message counters.
    #[serde(default)]
    pub unread: HashMap<UserId, u32>,
}

impl Conversation {
    /// The participant that is not `user`, if `user` is a participant.
    pub fn other_participant(&self, user: &UserId) -> Option<&UserId> {
        if !self.participants.contains(user) {
            return None;
        }
        self.participants.iter().find(|p| *p != user)
    }

    pub fn is_participant(&self, user: &UserId) -> bool {
        self.participants.contains(user)
    }

    pub fn unread_for(&self, user: &UserId) -> u32 {
        self.unread.get(user).copied().unwrap_or(0)
    }

    /// Boundary validation. Invariant: exactly two distinct participants,
    /// and every keyed map entry belongs to a participant.
    pub fn validate(&self) -> Result<()> {
        if self.participants.len() != 2 {
            return Err(StoreError::InvalidDocument(format!(
                "expected 2 participants, got {}",
                self.participants.len()
            )));
        }
        if self.participants[0] == self.participants[1] {
            return Err(StoreError::InvalidDocument(
                "participants must be distinct".to_string(),
            ));
        }
        for user in self
            .keys_by_user
            .keys()
            .chain(self.unread.keys())
            .chain(self.participant_names.keys())
        {
            if !self.participants.contains(user) {
                return Err(StoreError::InvalidDocument(format!(
                    "entry for non-participant user {user}"
                )));
            }
        }
        Ok(())
    }
}

/// Insert shape for a conversation. The store assigns the id and both
/// timestamps.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub participants: [UserId; 2],
    /// Display names, aligned with `participants`.
    pub participant_names: [String; 2],
    /// Initial per-user key map. Left empty only when reconstructing a
    /// legacy conversation that predates per-user key storage.
    pub keys_by_user: HashMap<UserId, String>,
}

/// Merge-update for a conversation document.
///
/// Only the set fields are applied. `merge_keys` merges entries into
/// `keys_by_user` and never removes or replaces other users' copies;
/// unread mutations target a single counter each.
#[derive(Debug, Clone, Default)]
pub struct ConversationPatch {
    /// Advance `last_message_at` to the store's current server time.
    pub touch_last_message: bool,
    /// Entries merged into `keys_by_user`.
    pub merge_keys: HashMap<UserId, String>,
    /// Increment this participant's unread counter by one.
    pub increment_unread: Option<UserId>,
    /// Reset this participant's unread counter to zero.
    pub reset_unread: Option<UserId>,
}

impl ConversationPatch {
    /// Patch that merges a single user's key copy.
    pub fn merge_key(user: UserId, key: String) -> Self {
        Self {
            merge_keys: HashMap::from([(user, key)]),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message. The payload is always stored encrypted; the store
/// never sees plaintext.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Unique message identifier (store-generated).
    pub id: MessageId,
    /// Sender account id.
    pub sender: UserId,
    /// base64(nonce || ciphertext || tag), opaque to the store.
    pub payload: String,
    /// Server-assigned send timestamp; the message collection is ordered by
    /// this field ascending.
    pub sent_at: DateTime<Utc>,
    /// Flipped to true once the recipient has viewed the conversation.
    pub read: bool,
}

/// Insert shape for a message. The store assigns the id, the timestamp, and
/// `read = false`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender: UserId,
    pub payload: String,
}
