use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid key length")]
    InvalidKeyLength,

    #[error("Invalid base64 encoding: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error("Decrypted payload is not valid UTF-8")]
    InvalidUtf8,
}
