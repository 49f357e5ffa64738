use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::net::SocketAddr;

use veilnet_types::proto::{EnvelopeType, SessionId};

use crate::backend::LedgerBackend;
use crate::misc::LedgerError;
use crate::records::{
    ConnectionRecord, ConnectionRecordId, ConnectionStatus, SecurityEventRecord, Severity,
    TransferRecord,
};

/// In-memory ledger backend. Suitable for a single-process overlay and for
/// tests; ids are monotonic within the instance.
#[derive(Default)]
pub struct MemoryLedger {
    inner: Mutex<MemoryLedgerInner>,
}

#[derive(Default)]
struct MemoryLedgerInner {
    next_id: i64,
    connections: Vec<ConnectionRecord>,
    transfers: Vec<TransferRecord>,
    security_events: Vec<SecurityEventRecord>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryLedgerInner {
    fn assert_connection(&self, connection: ConnectionRecordId) -> Result<(), LedgerError> {
        if self.connections.iter().any(|record| record.id == connection) {
            Ok(())
        } else {
            Err(LedgerError::UnknownConnection(connection.0))
        }
    }
}

#[async_trait]
impl LedgerBackend for MemoryLedger {
    async fn record_connection(
        &self,
        session_id: &SessionId,
        peer_addr: SocketAddr,
    ) -> Result<ConnectionRecordId, LedgerError> {
        let mut this = self.inner.lock();
        this.next_id += 1;
        let id = ConnectionRecordId(this.next_id);

        this.connections.push(ConnectionRecord {
            id,
            session_id: session_id.clone(),
            peer_addr: peer_addr.to_string(),
            connected_at: Utc::now(),
            disconnected_at: None,
            status: ConnectionStatus::Active,
        });

        Ok(id)
    }

    async fn record_disconnection(
        &self,
        connection: ConnectionRecordId,
    ) -> Result<(), LedgerError> {
        let mut this = self.inner.lock();
        let record = this
            .connections
            .iter_mut()
            .find(|record| record.id == connection)
            .ok_or(LedgerError::UnknownConnection(connection.0))?;

        record.disconnected_at = Some(Utc::now());
        record.status = ConnectionStatus::Closed;
        Ok(())
    }

    async fn record_transfer(
        &self,
        connection: ConnectionRecordId,
        source: &str,
        destination: &str,
        size: usize,
        encrypted: bool,
        envelope_type: EnvelopeType,
    ) -> Result<(), LedgerError> {
        let mut this = self.inner.lock();
        this.assert_connection(connection)?;

        this.transfers.push(TransferRecord {
            connection_id: connection,
            timestamp: Utc::now(),
            source: source.to_string(),
            destination: destination.to_string(),
            size,
            encrypted,
            envelope_type,
        });

        Ok(())
    }

    async fn record_security_event(
        &self,
        connection: ConnectionRecordId,
        event_type: &str,
        description: &str,
        severity: Severity,
    ) -> Result<(), LedgerError> {
        let mut this = self.inner.lock();
        this.assert_connection(connection)?;

        this.security_events.push(SecurityEventRecord {
            connection_id: connection,
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            description: description.to_string(),
            severity,
        });

        Ok(())
    }

    async fn connections_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ConnectionRecord>, LedgerError> {
        let this = self.inner.lock();
        Ok(this
            .connections
            .iter()
            .filter(|record| record.connected_at >= start && record.connected_at <= end)
            .cloned()
            .collect())
    }

    async fn all_transfers(&self) -> Result<Vec<TransferRecord>, LedgerError> {
        Ok(self.inner.lock().transfers.clone())
    }

    async fn transfers_for_connection(
        &self,
        connection: ConnectionRecordId,
    ) -> Result<Vec<TransferRecord>, LedgerError> {
        let this = self.inner.lock();
        Ok(this
            .transfers
            .iter()
            .filter(|record| record.connection_id == connection)
            .cloned()
            .collect())
    }

    async fn security_events_for_connection(
        &self,
        connection: ConnectionRecordId,
    ) -> Result<Vec<SecurityEventRecord>, LedgerError> {
        let this = self.inner.lock();
        Ok(this
            .security_events
            .iter()
            .filter(|record| record.connection_id == connection)
            .cloned()
            .collect())
    }
}
