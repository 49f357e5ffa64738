//! Self-signed identity certificates.
//!
//! A certificate binds a display subject to an Ed25519 verifying key and is
//! signed by its own key. Verification is a self-consistency check only:
//! there is no chain of trust, and nothing later in the handshake signs the
//! Diffie-Hellman public keys, so this is identity display rather than
//! authenticated key agreement.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use veilnet_types::serialization::WireIO;

use crate::misc::CryptError;

/// Validity window granted to a freshly generated certificate
pub const CERTIFICATE_VALIDITY_SECS: i64 = 365 * 24 * 60 * 60;

/// A self-signed certificate as exchanged during the handshake
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Certificate {
    pub subject: String,
    pub serial: u64,
    /// Unix millis
    pub not_before: i64,
    /// Unix millis
    pub not_after: i64,
    pub verifying_key: [u8; 32],
    pub signature: Vec<u8>,
}

/// The to-be-signed portion, serialized deterministically
#[derive(Serialize)]
struct TbsCertificate<'a> {
    subject: &'a str,
    serial: u64,
    not_before: i64,
    not_after: i64,
    verifying_key: &'a [u8; 32],
}

impl Certificate {
    fn tbs_bytes(&self) -> Result<Vec<u8>, CryptError> {
        let tbs = TbsCertificate {
            subject: &self.subject,
            serial: self.serial,
            not_before: self.not_before,
            not_after: self.not_after,
            verifying_key: &self.verifying_key,
        };

        bincode::serialize(&tbs).map_err(|err| CryptError::Certificate(err.to_string()))
    }

    /// Encodes the certificate for transmission inside a handshake envelope
    pub fn encode(&self) -> Result<Vec<u8>, CryptError> {
        self.serialize_to_vector()
            .map_err(|err| CryptError::Certificate(err.to_string()))
    }

    /// Decodes a certificate received from a remote party
    pub fn decode(input: &[u8]) -> Result<Self, CryptError> {
        Self::deserialize_from_vector(input)
            .map_err(|err| CryptError::Certificate(err.to_string()))
    }

    /// Verifies the certificate against its own embedded key. No chain of
    /// trust is consulted; a `true` result means only that the certificate
    /// is internally consistent.
    pub fn self_verify(&self) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.verifying_key) else {
            return false;
        };

        let Ok(signature) = Signature::from_slice(&self.signature) else {
            return false;
        };

        match self.tbs_bytes() {
            Ok(tbs) => verifying_key.verify(&tbs, &signature).is_ok(),
            Err(_) => false,
        }
    }

    /// True when `now` (unix millis) falls inside the validity window
    pub fn valid_at(&self, now: i64) -> bool {
        now >= self.not_before && now <= self.not_after
    }
}

/// A local identity: the signing key plus the certificate it self-signed
pub struct CertificateIdentity {
    signing_key: SigningKey,
    certificate: Certificate,
}

impl CertificateIdentity {
    /// Generates a fresh key pair and a certificate over it, self-signed,
    /// valid for one year
    pub fn generate(subject: &str) -> Result<Self, CryptError> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let now = chrono::Utc::now().timestamp_millis();

        let mut certificate = Certificate {
            subject: subject.to_string(),
            serial: now as u64,
            not_before: now,
            not_after: now + CERTIFICATE_VALIDITY_SECS * 1000,
            verifying_key: signing_key.verifying_key().to_bytes(),
            signature: Vec::new(),
        };

        let tbs = certificate.tbs_bytes()?;
        certificate.signature = signing_key.sign(&tbs).to_bytes().to_vec();

        Ok(Self {
            signing_key,
            certificate,
        })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// The encoded form sent over the wire during the handshake
    pub fn encoded_certificate(&self) -> Result<Vec<u8>, CryptError> {
        self.certificate.encode()
    }

    pub fn subject(&self) -> &str {
        &self.certificate.subject
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_and_self_verify() {
        let identity = CertificateIdentity::generate("VPN Server").unwrap();
        let certificate = identity.certificate();
        assert_eq!(certificate.subject, "VPN Server");
        assert!(certificate.self_verify());
        assert!(certificate.valid_at(chrono::Utc::now().timestamp_millis()));
    }

    #[test]
    fn encode_decode_round_trip() {
        let identity = CertificateIdentity::generate("VPN Client abc").unwrap();
        let encoded = identity.encoded_certificate().unwrap();
        let decoded = Certificate::decode(&encoded).unwrap();
        assert_eq!(decoded.subject, identity.subject());
        assert_eq!(decoded.serial, identity.certificate().serial);
        assert!(decoded.self_verify());
    }

    #[test]
    fn tampered_certificate_fails_verification() {
        let identity = CertificateIdentity::generate("honest peer").unwrap();
        let mut forged = identity.certificate().clone();
        forged.subject = "impostor".to_string();
        assert!(!forged.self_verify());
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(Certificate::decode(&[0xde, 0xad, 0xbe, 0xef]).is_err());
    }

    #[test]
    fn malformed_signature_fails_verification() {
        let identity = CertificateIdentity::generate("peer").unwrap();
        let mut broken = identity.certificate().clone();
        broken.signature.truncate(3);
        assert!(!broken.self_verify());
    }
}
