//! The fundamental wire types of the overlay: the [`Envelope`] exchanged over
//! each session's transport and the [`SessionId`] used as the routing key.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of envelope kinds. The router dispatches purely on this
/// discriminant and never reinterprets an envelope after construction.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
pub enum EnvelopeType {
    HandshakeInit,
    HandshakeResponse,
    CertificateExchange,
    KeyExchange,
    Data,
    Disconnect,
    Error,
}

/// Opaque logical identifier for a session. Generated once at connection
/// acceptance (server side) or initiation (client side) and stable for the
/// connection's lifetime.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One discrete protocol message unit. Immutable once sent: the type is set
/// at construction, the content is either a plaintext handshake payload or an
/// authenticated-encrypted payload (nonce followed by ciphertext) that stays
/// opaque to routing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub envelope_type: EnvelopeType,
    pub sender: SessionId,
    pub content: Bytes,
    /// Present only on peer-routed DATA envelopes. `None` means the envelope
    /// is addressed to the server itself.
    pub destination: Option<SessionId>,
    /// Creation time in unix millis. Informational only; never used for
    /// ordering or expiry.
    pub timestamp: i64,
}

impl Envelope {
    pub fn new(envelope_type: EnvelopeType, sender: SessionId, content: impl Into<Bytes>) -> Self {
        Self {
            envelope_type,
            sender,
            content: content.into(),
            destination: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn new_routed(
        envelope_type: EnvelopeType,
        sender: SessionId,
        content: impl Into<Bytes>,
        destination: SessionId,
    ) -> Self {
        Self {
            destination: Some(destination),
            ..Self::new(envelope_type, sender, content)
        }
    }

    /// True when the envelope carries no destination and is therefore
    /// addressed to the server itself
    pub fn is_for_server(&self) -> bool {
        self.destination.is_none()
    }
}
