/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Namespace prefix for conversation keys in the device secure store
pub const KEY_CACHE_PREFIX: &str = "conversation-key:";

/// Maximum message plaintext size in bytes (16 KiB)
pub const MAX_MESSAGE_SIZE: usize = 16_384;
