//! Authenticated encryption of session payloads with AES-256-GCM. The wire
//! form of every encrypted payload is the 96-bit random nonce followed by the
//! ciphertext and its 128-bit tag, mirroring how handshake peers expect to
//! parse DATA/ERROR/DISCONNECT content.

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};

use crate::key_exchange::{session_key_from_secret, SESSION_KEY_LEN};
use crate::misc::CryptError;

/// Nonce length prepended to every ciphertext
pub const GCM_NONCE_LEN: usize = 12;

/// A session's symmetric cipher. Constructed once from the handshake-derived
/// key and immutable afterwards.
pub struct SessionCrypto {
    cipher: Aes256Gcm,
}

impl SessionCrypto {
    /// Builds the cipher from a raw Diffie-Hellman shared secret
    pub fn from_shared_secret(secret: &[u8]) -> Self {
        Self::from_key(session_key_from_secret(secret))
    }

    pub fn from_key(key: [u8; SESSION_KEY_LEN]) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        Self { cipher }
    }

    /// Encrypts a plaintext, returning `nonce || ciphertext`
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptError::Encrypt("AES-GCM encryption failure".to_string()))?;

        let mut out = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypts `nonce || ciphertext`. Fails on truncated input and on any
    /// tampered or mis-keyed payload.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptError> {
        if data.len() <= GCM_NONCE_LEN {
            return Err(CryptError::Decrypt(format!(
                "ciphertext too short: {} bytes",
                data.len()
            )));
        }

        let (nonce, ciphertext) = data.split_at(GCM_NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptError::Decrypt("AES-GCM authentication failure".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crypto_pair() -> (SessionCrypto, SessionCrypto) {
        (
            SessionCrypto::from_key([7u8; SESSION_KEY_LEN]),
            SessionCrypto::from_key([9u8; SESSION_KEY_LEN]),
        )
    }

    #[test]
    fn round_trip() {
        let (crypto, _) = crypto_pair();
        for message in [&b""[..], b"x", b"a longer message with spaces"] {
            let ciphertext = crypto.encrypt(message).unwrap();
            assert_ne!(&ciphertext[GCM_NONCE_LEN..], message);
            assert_eq!(crypto.decrypt(&ciphertext).unwrap(), message);
        }
    }

    #[test]
    fn shared_secret_construction_round_trips() {
        let secret = [3u8; 32];
        let a = SessionCrypto::from_shared_secret(&secret);
        let b = SessionCrypto::from_shared_secret(&secret);
        let ciphertext = a.encrypt(b"mirrored derivation").unwrap();
        assert_eq!(b.decrypt(&ciphertext).unwrap(), b"mirrored derivation");
    }

    #[test]
    fn wrong_key_fails() {
        let (a, b) = crypto_pair();
        let ciphertext = a.encrypt(b"secret").unwrap();
        assert!(b.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let (crypto, _) = crypto_pair();
        let mut ciphertext = crypto.encrypt(b"integrity matters").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x01;
        assert!(crypto.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn truncated_input_fails_cleanly() {
        let (crypto, _) = crypto_pair();
        assert!(crypto.decrypt(&[0u8; GCM_NONCE_LEN]).is_err());
        assert!(crypto.decrypt(&[]).is_err());
    }
}
