//! # VeilNET Cryptographic Capability (veilnet_crypt)
//!
//! Thin wrappers over the cryptographic primitives the overlay consumes:
//! self-signed identity certificates, ephemeral Diffie-Hellman key agreement,
//! and authenticated symmetric encryption of session payloads. The protocol
//! core calls these as capabilities; none of the underlying math lives here.
//!
//! Certificates are simulation-grade: self-signed, self-verified, never
//! chained to an authority, and never bound to the key-exchange payloads.

#![forbid(unsafe_code)]
#![deny(
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    variant_size_differences,
    unused_features
)]

/// Convenient imports for external use
pub mod prelude {
    pub use crate::certificate::{Certificate, CertificateIdentity};
    pub use crate::key_exchange::{session_key_from_secret, KeyExchange, SESSION_KEY_LEN};
    pub use crate::misc::CryptError;
    pub use crate::session_crypto::SessionCrypto;
}

/// Self-signed identity certificates
pub mod certificate;
/// Ephemeral Diffie-Hellman key agreement
pub mod key_exchange;
/// Error type
pub mod misc;
/// Authenticated encryption of session payloads
pub mod session_crypto;
