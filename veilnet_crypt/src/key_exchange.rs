//! Ephemeral X25519 key agreement. One [`KeyExchange`] is created per
//! handshake; deriving the shared secret consumes it, so a key pair can never
//! be reused across sessions.

use rand::rngs::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::misc::CryptError;

/// Length of the derived symmetric session key
pub const SESSION_KEY_LEN: usize = 32;

/// One side of a Diffie-Hellman exchange
pub struct KeyExchange {
    secret: EphemeralSecret,
    public: PublicKey,
}

impl KeyExchange {
    /// Generates a fresh ephemeral key pair
    pub fn new() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// The public half, as sent inside a KEY_EXCHANGE envelope
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Consumes the exchange and derives the shared secret from the peer's
    /// public key bytes
    pub fn derive_shared_secret(self, peer_public: &[u8]) -> Result<Vec<u8>, CryptError> {
        let peer_public: [u8; 32] = peer_public.try_into().map_err(|_| {
            CryptError::KeyExchange(format!(
                "peer public key must be 32 bytes, got {}",
                peer_public.len()
            ))
        })?;

        let shared = self.secret.diffie_hellman(&PublicKey::from(peer_public));
        Ok(shared.as_bytes().to_vec())
    }
}

impl Default for KeyExchange {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives the symmetric session key from a shared secret: the first 32
/// bytes, zero-padded if the secret is shorter. Both peers must apply the
/// identical derivation for the session to function; nothing on the wire
/// confirms they did.
pub fn session_key_from_secret(secret: &[u8]) -> [u8; SESSION_KEY_LEN] {
    let mut key = [0u8; SESSION_KEY_LEN];
    let len = secret.len().min(SESSION_KEY_LEN);
    key[..len].copy_from_slice(&secret[..len]);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_derive_identical_keys() {
        let alice = KeyExchange::new();
        let bob = KeyExchange::new();

        let alice_public = alice.public_key_bytes();
        let bob_public = bob.public_key_bytes();

        let alice_secret = alice.derive_shared_secret(&bob_public).unwrap();
        let bob_secret = bob.derive_shared_secret(&alice_public).unwrap();

        assert_eq!(alice_secret, bob_secret);
        assert_eq!(
            session_key_from_secret(&alice_secret),
            session_key_from_secret(&bob_secret)
        );
    }

    #[test]
    fn distinct_exchanges_disagree() {
        let alice = KeyExchange::new();
        let bob = KeyExchange::new();
        let carol = KeyExchange::new();

        let bob_public = bob.public_key_bytes();
        let carol_public = carol.public_key_bytes();

        let against_bob = alice.derive_shared_secret(&bob_public).unwrap();
        let bob_against_carol = bob.derive_shared_secret(&carol_public).unwrap();

        assert_ne!(against_bob, bob_against_carol);
    }

    #[test]
    fn rejects_malformed_peer_key() {
        let alice = KeyExchange::new();
        assert!(alice.derive_shared_secret(&[1, 2, 3]).is_err());
    }

    #[test]
    fn short_secrets_are_zero_padded() {
        let key = session_key_from_secret(&[0xab; 16]);
        assert_eq!(&key[..16], &[0xab; 16]);
        assert_eq!(&key[16..], &[0u8; 16]);
    }
}
