//! # VeilNET Types
//!
//! Common type definitions shared across the VeilNET overlay workspace: the
//! wire envelope, session identifiers, and the binary serialization helper
//! every wire type goes through.

/// Wire-level protocol types
pub mod proto;
/// Bincode-backed serialization for wire types
pub mod serialization;
