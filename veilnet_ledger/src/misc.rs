use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// The basic error type for this crate
pub enum LedgerError {
    /// The referenced connection record does not exist
    UnknownConnection(i64),
    /// For a converted or backend-specific error
    Generic(String),
}

impl LedgerError {
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Generic(msg.into())
    }

    pub fn into_string(self) -> String {
        match self {
            LedgerError::UnknownConnection(id) => {
                format!("Unknown connection record: {id}")
            }
            LedgerError::Generic(err) => err,
        }
    }
}

impl Error for LedgerError {}

impl Debug for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::UnknownConnection(id) => {
                write!(f, "Unknown connection record: {id}")
            }
            LedgerError::Generic(err) => write!(f, "{err}"),
        }
    }
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <Self as Debug>::fmt(self, f)
    }
}
