//! # causerie-store
//!
//! Document-store abstraction for the Causerie messaging core.
//!
//! The chat layer never talks to a concrete backend; it depends on the
//! [`DocumentStore`] trait (conversation and message collections with live,
//! push-based queries) and the [`SecureStore`] trait (device-local secure
//! key/value storage). Documents cross this boundary as typed structs that
//! are validated on write, never as untyped blobs.
//!
//! [`MemoryStore`] is the reference backend: process-local, `Arc`-shared,
//! pushing full ordered snapshots through `tokio::sync::watch` channels on
//! every mutation. Ciphertext stored here is treated as opaque; the store
//! guarantees storage and ordering, not integrity.

pub mod memory;
pub mod models;
pub mod secure;
pub mod traits;

mod error;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use models::*;
pub use secure::{FileSecureStore, MemorySecureStore};
pub use traits::{DocumentStore, SecureStore};
