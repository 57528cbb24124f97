use thiserror::Error;

use causerie_shared::types::{ConversationId, UserId};
use causerie_shared::CryptoError;
use causerie_store::StoreError;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// No key resolvable through the cache, the shared record, or
    /// migration. Fatal on the send path; on the read path the current
    /// batch simply decrypts nothing.
    #[error("No conversation key for user {user} in conversation {conversation}")]
    KeyNotFound {
        conversation: ConversationId,
        user: UserId,
    },

    #[error("Message plaintext too large: {0} bytes")]
    MessageTooLarge(usize),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChatError>;
