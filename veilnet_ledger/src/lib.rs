//! # VeilNET Ledger (veilnet_ledger)
//!
//! The observation ledger consumed by the server node: connection lifetimes,
//! routed transfers, and security events. The protocol core only talks to the
//! [`backend::LedgerBackend`] trait; [`memory::MemoryLedger`] is the provided
//! implementation. Recording failures are reported to callers, who log and
//! continue; a session never dies because its observation could not be
//! stored.

#![forbid(unsafe_code)]

pub mod prelude {
    pub use crate::backend::LedgerBackend;
    pub use crate::memory::MemoryLedger;
    pub use crate::misc::LedgerError;
    pub use crate::records::{
        ConnectionRecord, ConnectionRecordId, ConnectionStatus, SecurityEventRecord, Severity,
        TransferRecord,
    };
}

/// The backend trait the protocol core consumes
pub mod backend;
/// In-memory backend
pub mod memory;
/// Error type
pub mod misc;
/// Record types, one per observation table
pub mod records;
