use std::error::Error;
use std::fmt::Formatter;
use std::fmt::{Debug, Display};

use tokio::sync::mpsc::error::SendError;
use veilnet_crypt::misc::CryptError;
use veilnet_ledger::misc::LedgerError;
use veilnet_types::proto::EnvelopeType;

/// The basic error type for this crate
pub enum NetworkError {
    /// Thrown when the underlying socket fails
    SocketError(String),
    /// A bounded wait elapsed, e.g. the handshake deadline
    Timeout(&'static str),
    /// An envelope of the wrong type arrived during the ordered handshake.
    /// Fatal to that connection only; the handshake never retries.
    ProtocolViolation {
        expected: EnvelopeType,
        received: EnvelopeType,
    },
    /// A frame that did not decode into an envelope
    InvalidEnvelope(&'static str),
    /// The client is not connected to a server
    NotConnected,
    InternalError(&'static str),
    /// For a converted error
    Generic(String),
}

impl Error for NetworkError {}

impl Debug for NetworkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_msg())
    }
}

impl NetworkError {
    fn to_msg(&self) -> String {
        match self {
            NetworkError::SocketError(err) => err.to_string(),
            NetworkError::Timeout(msg) => format!("Timeout: {msg}"),
            NetworkError::ProtocolViolation { expected, received } => {
                format!("Expected {expected}, but received {received}")
            }
            NetworkError::InvalidEnvelope(err) => (*err).to_string(),
            NetworkError::NotConnected => "Not connected to server".to_string(),
            NetworkError::InternalError(err) => (*err).to_string(),
            NetworkError::Generic(err) => err.to_string(),
        }
    }

    pub fn into_string(self) -> String {
        match self {
            NetworkError::SocketError(err) => err,
            NetworkError::Generic(err) => err,
            other => other.to_msg(),
        }
    }

    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Generic(msg.into())
    }
}

impl Display for NetworkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <Self as Debug>::fmt(self, f)
    }
}

impl<T> From<SendError<T>> for NetworkError {
    fn from(err: SendError<T>) -> Self {
        NetworkError::Generic(err.to_string())
    }
}

impl From<anyhow::Error> for NetworkError {
    fn from(err: anyhow::Error) -> Self {
        NetworkError::Generic(err.to_string())
    }
}

impl From<CryptError> for NetworkError {
    fn from(err: CryptError) -> Self {
        Self::Generic(err.into_string())
    }
}

impl From<LedgerError> for NetworkError {
    fn from(err: LedgerError) -> Self {
        Self::Generic(err.into_string())
    }
}

impl From<std::io::Error> for NetworkError {
    fn from(err: std::io::Error) -> Self {
        NetworkError::SocketError(err.to_string())
    }
}
