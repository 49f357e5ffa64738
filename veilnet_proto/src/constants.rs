//! Protocol constants for the VeilNET overlay: fixed handshake payloads,
//! well-known identifiers, and timing parameters.

use std::time::Duration;

/// Greeting payload carried by the first handshake envelope
pub const HANDSHAKE_GREETING: &str = "Hello Server";
/// Plaintext of the best-effort disconnect notice sent during teardown
pub const DISCONNECT_NOTICE: &str = "Disconnecting";
/// Sender identifier stamped on every server-originated envelope
pub const SERVER_SENDER_ID: &str = "server";
/// Subject of the server's self-signed certificate
pub const SERVER_CERTIFICATE_SUBJECT: &str = "VPN Server";
/// Subject prefix of client certificates; the client id is appended
pub const CLIENT_CERTIFICATE_SUBJECT_PREFIX: &str = "VPN Client ";
/// Default port the overlay server listens on
pub const DEFAULT_SERVER_PORT: u16 = 8443;
/// After this time, an in-progress handshake is abandoned
pub const HANDSHAKE_EXPIRE_TIME: Duration = Duration::from_millis(30_000);
/// Event type recorded when a DATA envelope cannot be routed
pub const ROUTING_ERROR_EVENT: &str = "ROUTING_ERROR";
