//! # causerie-shared
//!
//! Crypto primitives and domain identifiers shared by every Causerie crate.
//!
//! Message bodies are protected with XChaCha20-Poly1305 authenticated
//! encryption under a single 256-bit symmetric key per conversation. This
//! crate owns the cipher wrapper and the base64 armor used for keys and
//! payloads at rest; it knows nothing about where either is stored.

pub mod constants;
pub mod crypto;
pub mod types;

mod error;

pub use error::CryptoError;
