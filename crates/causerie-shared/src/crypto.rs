use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::constants::{NONCE_SIZE, SYMMETRIC_KEY_SIZE};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; 32];

pub fn generate_symmetric_key() -> SymmetricKey {
    let mut key = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

// Returns nonce || ciphertext (24 bytes nonce prepended)
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Encrypt a UTF-8 string and armor the result for document storage.
pub fn seal_text(key: &SymmetricKey, plaintext: &str) -> Result<String, CryptoError> {
    let sealed = encrypt(key, plaintext.as_bytes())?;
    Ok(BASE64.encode(sealed))
}

/// Reverse of [`seal_text`]. Fails if the armor, the authentication tag, or
/// the UTF-8 decoding is invalid.
pub fn open_text(key: &SymmetricKey, armored: &str) -> Result<String, CryptoError> {
    let data = BASE64.decode(armored)?;
    let plaintext = decrypt(key, &data)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
}

pub fn key_to_base64(key: &SymmetricKey) -> String {
    BASE64.encode(key)
}

/// Decode a stored key. Wrong-length material is rejected rather than
/// truncated or padded.
pub fn key_from_base64(encoded: &str) -> Result<SymmetricKey, CryptoError> {
    let bytes = BASE64.decode(encoded)?;
    if bytes.len() != SYMMETRIC_KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength);
    }
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TAG_SIZE;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = generate_symmetric_key();
        let plaintext = b"On se retrouve au parc a 18h?";

        let encrypted = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &encrypted).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = generate_symmetric_key();
        let key2 = generate_symmetric_key();
        let plaintext = b"Secret message";

        let encrypted = encrypt(&key1, plaintext).unwrap();
        assert!(decrypt(&key2, &encrypted).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = generate_symmetric_key();
        let plaintext = b"Important data";

        let encrypted = encrypt(&key, plaintext).unwrap();

        // Any single flipped byte must break authentication.
        for i in 0..encrypted.len() {
            let mut corrupted = encrypted.clone();
            corrupted[i] ^= 0x01;
            assert!(decrypt(&key, &corrupted).is_err(), "byte {i} not detected");
        }
    }

    #[test]
    fn test_empty_data_fails() {
        let key = generate_symmetric_key();
        assert!(decrypt(&key, &[]).is_err());
    }

    #[test]
    fn test_nonce_freshness() {
        let key = generate_symmetric_key();
        let a = encrypt(&key, b"same plaintext").unwrap();
        let b = encrypt(&key, b"same plaintext").unwrap();

        assert_ne!(a, b);
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
    }

    #[test]
    fn test_nonce_prepended() {
        let key = generate_symmetric_key();
        let encrypted = encrypt(&key, b"test").unwrap();
        assert_eq!(encrypted.len(), NONCE_SIZE + 4 + TAG_SIZE);
    }

    #[test]
    fn test_seal_open_text_roundtrip() {
        let key = generate_symmetric_key();
        let armored = seal_text(&key, "salut !").unwrap();
        assert_eq!(open_text(&key, &armored).unwrap(), "salut !");
    }

    #[test]
    fn test_open_text_rejects_bad_armor() {
        let key = generate_symmetric_key();
        assert!(matches!(
            open_text(&key, "not base64 !!!"),
            Err(CryptoError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_key_base64_roundtrip() {
        let key = generate_symmetric_key();
        let encoded = key_to_base64(&key);
        assert_eq!(key_from_base64(&encoded).unwrap(), key);
    }

    #[test]
    fn test_key_from_base64_wrong_length() {
        let encoded = BASE64.encode([0u8; 16]);
        assert!(matches!(
            key_from_base64(&encoded),
            Err(CryptoError::InvalidKeyLength)
        ));
    }
}
