use chrono::{DateTime, Utc};
use veilnet_types::proto::{EnvelopeType, SessionId};

/// Opaque handle to a connection's ledger entry, returned at accept time and
/// quoted by every later observation for that connection
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ConnectionRecordId(pub i64);

impl std::fmt::Display for ConnectionRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, strum::Display)]
pub enum ConnectionStatus {
    Active,
    Closed,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, strum::Display)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// One accepted connection's lifetime
#[derive(Clone, Debug)]
pub struct ConnectionRecord {
    pub id: ConnectionRecordId,
    pub session_id: SessionId,
    pub peer_addr: String,
    pub connected_at: DateTime<Utc>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub status: ConnectionStatus,
}

/// One routed transfer observation
#[derive(Clone, Debug)]
pub struct TransferRecord {
    pub connection_id: ConnectionRecordId,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub destination: String,
    pub size: usize,
    pub encrypted: bool,
    pub envelope_type: EnvelopeType,
}

/// One security-relevant observation, e.g. a routing failure
#[derive(Clone, Debug)]
pub struct SecurityEventRecord {
    pub connection_id: ConnectionRecordId,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub description: String,
    pub severity: Severity,
}
