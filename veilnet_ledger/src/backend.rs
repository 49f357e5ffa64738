use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::SocketAddr;

use veilnet_types::proto::{EnvelopeType, SessionId};

use crate::misc::LedgerError;
use crate::records::{
    ConnectionRecord, ConnectionRecordId, SecurityEventRecord, Severity, TransferRecord,
};

/// Storage backend for overlay observations. The write side is driven by the
/// server's session loops and router; the read side exists for external
/// monitoring surfaces and is never consulted by the protocol core itself.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Records an accepted connection, returning the handle every later
    /// observation for this connection quotes
    async fn record_connection(
        &self,
        session_id: &SessionId,
        peer_addr: SocketAddr,
    ) -> Result<ConnectionRecordId, LedgerError>;

    /// Marks the connection closed
    async fn record_disconnection(
        &self,
        connection: ConnectionRecordId,
    ) -> Result<(), LedgerError>;

    /// Records a routed transfer
    async fn record_transfer(
        &self,
        connection: ConnectionRecordId,
        source: &str,
        destination: &str,
        size: usize,
        encrypted: bool,
        envelope_type: EnvelopeType,
    ) -> Result<(), LedgerError>;

    /// Records a security-relevant event
    async fn record_security_event(
        &self,
        connection: ConnectionRecordId,
        event_type: &str,
        description: &str,
        severity: Severity,
    ) -> Result<(), LedgerError>;

    /// Connections whose accept time falls inside `[start, end]`
    async fn connections_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ConnectionRecord>, LedgerError>;

    /// Every transfer observation, oldest first
    async fn all_transfers(&self) -> Result<Vec<TransferRecord>, LedgerError>;

    /// Transfer observations for one connection, oldest first
    async fn transfers_for_connection(
        &self,
        connection: ConnectionRecordId,
    ) -> Result<Vec<TransferRecord>, LedgerError>;

    /// Security events for one connection, oldest first
    async fn security_events_for_connection(
        &self,
        connection: ConnectionRecordId,
    ) -> Result<Vec<SecurityEventRecord>, LedgerError>;
}
