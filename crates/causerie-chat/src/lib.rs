//! # causerie-chat
//!
//! End-to-end encrypted 1:1 messaging services.
//!
//! Two layers sit between the UI and the document store:
//!
//! - [`KeyStore`] resolves the per-conversation symmetric key through a
//!   layered lookup: device secure-store cache first, then the shared
//!   conversation record, with a lazy one-time migration for conversations
//!   that predate per-user key storage.
//! - [`ChatService`] drives the conversation lifecycle: encrypt-on-send,
//!   decrypt-on-read over live subscriptions, unread counters, and read
//!   receipts.
//!
//! Plaintext never crosses the store boundary: a message that cannot be
//! encrypted is not sent, and a stored payload that fails authentication is
//! dropped from the decrypted view rather than surfaced as garbage.

pub mod keys;
pub mod service;

mod error;

pub use error::ChatError;
pub use keys::KeyStore;
pub use service::{ChatService, DecryptedMessage, Subscription};
