//! The five-step handshake that precedes any application data. Client and
//! server run mirror images of the same sequence; each step blocks on the
//! single expected envelope and any other type is a protocol violation that
//! kills the connection.
//!
//! ```text
//! initiator                     responder
//!     | -- HANDSHAKE_INIT       -->  |   greeting
//!     | <- HANDSHAKE_RESPONSE   ---  |   responder certificate
//!     | -- CERTIFICATE_EXCHANGE -->  |   initiator certificate
//!     | <- KEY_EXCHANGE         ---  |   responder DH public key
//!     | -- KEY_EXCHANGE         -->  |   initiator DH public key
//! ```
//!
//! After step 5 both sides independently derive the session key from the
//! shared secret. Nothing on the wire confirms the keys agree; divergence
//! surfaces later as decrypt failures. The certificates are never bound to
//! the key-exchange payloads, so this is identity display, not authenticated
//! key agreement.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use veilnet_crypt::certificate::{Certificate, CertificateIdentity};
use veilnet_crypt::key_exchange::{session_key_from_secret, KeyExchange, SESSION_KEY_LEN};
use veilnet_types::proto::{Envelope, EnvelopeType, SessionId};

use crate::constants::HANDSHAKE_GREETING;
use crate::error::NetworkError;
use crate::proto::{read_one_envelope, write_one_envelope};

/// Everything a session needs once the handshake has completed
#[derive(Debug)]
pub(crate) struct HandshakeOutcome {
    pub(crate) peer_id: SessionId,
    pub(crate) peer_certificate: Certificate,
    pub(crate) session_key: [u8; SESSION_KEY_LEN],
    /// Greeting text observed by the responder
    pub(crate) greeting: Option<String>,
}

/// Blocks for the next envelope and demands it be of the expected type
async fn expect<S: AsyncRead + AsyncWrite + Unpin>(
    framed: &mut Framed<S, LengthDelimitedCodec>,
    expected: EnvelopeType,
) -> Result<Envelope, NetworkError> {
    let envelope = read_one_envelope(framed).await?;
    if envelope.envelope_type == expected {
        Ok(envelope)
    } else {
        Err(NetworkError::ProtocolViolation {
            expected,
            received: envelope.envelope_type,
        })
    }
}

/// Decodes a peer certificate out of a handshake payload. A certificate that
/// fails its self-consistency check is reported but tolerated; identity here
/// is display-grade.
fn decode_peer_certificate(content: &[u8]) -> Result<Certificate, NetworkError> {
    let certificate =
        Certificate::decode(content).map_err(|err| NetworkError::Generic(err.into_string()))?;

    if !certificate.self_verify() {
        log::warn!(
            target: "veilnet",
            "Certificate for {} failed self-verification",
            certificate.subject
        );
    }

    Ok(certificate)
}

/// Runs the initiator (client) side of the handshake
pub(crate) async fn run_initiator<S: AsyncRead + AsyncWrite + Unpin>(
    framed: &mut Framed<S, LengthDelimitedCodec>,
    local_id: &SessionId,
    identity: &CertificateIdentity,
) -> Result<HandshakeOutcome, NetworkError> {
    // Step 1: greet the responder
    write_one_envelope(
        framed,
        &Envelope::new(
            EnvelopeType::HandshakeInit,
            local_id.clone(),
            Bytes::from_static(HANDSHAKE_GREETING.as_bytes()),
        ),
    )
    .await?;
    log::trace!(target: "veilnet", "Sent handshake init");

    // Step 2: responder certificate
    let response = expect(framed, EnvelopeType::HandshakeResponse).await?;
    let peer_certificate = decode_peer_certificate(&response.content)?;
    let peer_id = response.sender;
    log::trace!(target: "veilnet", "Received handshake response from {peer_id}");

    // Step 3: our certificate
    write_one_envelope(
        framed,
        &Envelope::new(
            EnvelopeType::CertificateExchange,
            local_id.clone(),
            identity.encoded_certificate()?,
        ),
    )
    .await?;

    // Step 4: responder's public key
    let responder_key = expect(framed, EnvelopeType::KeyExchange).await?;

    // Step 5: our public key
    let key_exchange = KeyExchange::new();
    write_one_envelope(
        framed,
        &Envelope::new(
            EnvelopeType::KeyExchange,
            local_id.clone(),
            key_exchange.public_key_bytes().to_vec(),
        ),
    )
    .await?;

    let shared_secret = key_exchange.derive_shared_secret(&responder_key.content)?;
    log::trace!(target: "veilnet", "Handshake completed with {peer_id}");

    Ok(HandshakeOutcome {
        peer_id,
        peer_certificate,
        session_key: session_key_from_secret(&shared_secret),
        greeting: None,
    })
}

/// Runs the responder (server) side of the handshake
pub(crate) async fn run_responder<S: AsyncRead + AsyncWrite + Unpin>(
    framed: &mut Framed<S, LengthDelimitedCodec>,
    local_id: &SessionId,
    identity: &CertificateIdentity,
) -> Result<HandshakeOutcome, NetworkError> {
    // Step 1: initiator greeting
    let init = expect(framed, EnvelopeType::HandshakeInit).await?;
    let greeting = String::from_utf8_lossy(&init.content).into_owned();
    let peer_id = init.sender;
    log::trace!(target: "veilnet", "Received handshake init from {peer_id}");

    // Step 2: our certificate
    write_one_envelope(
        framed,
        &Envelope::new(
            EnvelopeType::HandshakeResponse,
            local_id.clone(),
            identity.encoded_certificate()?,
        ),
    )
    .await?;

    // Step 3: initiator certificate
    let certificate_exchange = expect(framed, EnvelopeType::CertificateExchange).await?;
    let peer_certificate = decode_peer_certificate(&certificate_exchange.content)?;

    // Step 4: our public key
    let key_exchange = KeyExchange::new();
    write_one_envelope(
        framed,
        &Envelope::new(
            EnvelopeType::KeyExchange,
            local_id.clone(),
            key_exchange.public_key_bytes().to_vec(),
        ),
    )
    .await?;

    // Step 5: initiator's public key
    let initiator_key = expect(framed, EnvelopeType::KeyExchange).await?;

    let shared_secret = key_exchange.derive_shared_secret(&initiator_key.content)?;
    log::trace!(target: "veilnet", "Handshake completed with {peer_id}");

    Ok(HandshakeOutcome {
        peer_id,
        peer_certificate,
        session_key: session_key_from_secret(&shared_secret),
        greeting: Some(greeting),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SERVER_CERTIFICATE_SUBJECT;
    use crate::proto::frame_transport;

    fn identities() -> (CertificateIdentity, CertificateIdentity) {
        (
            CertificateIdentity::generate("VPN Client test").unwrap(),
            CertificateIdentity::generate(SERVER_CERTIFICATE_SUBJECT).unwrap(),
        )
    }

    #[tokio::test]
    async fn mirrored_roles_derive_identical_keys() {
        veilnet_logging::setup_log_no_panic_hook();

        let (client_identity, server_identity) = identities();
        let client_id = SessionId::generate();
        let server_id = SessionId::from("server");

        let (client_io, server_io) = tokio::io::duplex(4096);

        let initiator = async {
            let mut framed = frame_transport(client_io);
            run_initiator(&mut framed, &client_id, &client_identity).await
        };
        let responder = async {
            let mut framed = frame_transport(server_io);
            run_responder(&mut framed, &server_id, &server_identity).await
        };

        let (client_outcome, server_outcome) = tokio::join!(initiator, responder);
        let client_outcome = client_outcome.unwrap();
        let server_outcome = server_outcome.unwrap();

        assert_eq!(client_outcome.session_key, server_outcome.session_key);
        assert_eq!(client_outcome.peer_id, server_id);
        assert_eq!(server_outcome.peer_id, client_id);
        assert_eq!(
            client_outcome.peer_certificate.subject,
            SERVER_CERTIFICATE_SUBJECT
        );
        assert_eq!(server_outcome.peer_certificate.subject, "VPN Client test");
        assert_eq!(server_outcome.greeting.as_deref(), Some(HANDSHAKE_GREETING));
    }

    #[tokio::test]
    async fn responder_rejects_wrong_first_envelope() {
        veilnet_logging::setup_log_no_panic_hook();

        let (_, server_identity) = identities();
        let (client_io, server_io) = tokio::io::duplex(4096);

        let rogue = async {
            let mut framed = frame_transport(client_io);
            write_one_envelope(
                &mut framed,
                &Envelope::new(EnvelopeType::Data, SessionId::generate(), &b"early"[..]),
            )
            .await
            .unwrap();
            framed
        };

        let responder = async {
            let mut framed = frame_transport(server_io);
            run_responder(&mut framed, &SessionId::from("server"), &server_identity).await
        };

        let (_rogue_framed, result) = tokio::join!(rogue, responder);
        match result {
            Err(NetworkError::ProtocolViolation { expected, received }) => {
                assert_eq!(expected, EnvelopeType::HandshakeInit);
                assert_eq!(received, EnvelopeType::Data);
            }
            other => panic!("expected protocol violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn initiator_rejects_wrong_response_type() {
        veilnet_logging::setup_log_no_panic_hook();

        let (client_identity, _) = identities();
        let (client_io, server_io) = tokio::io::duplex(4096);

        let rogue_responder = async {
            let mut framed = frame_transport(server_io);
            // swallow the init, then answer with the wrong type
            let _ = read_one_envelope(&mut framed).await.unwrap();
            write_one_envelope(
                &mut framed,
                &Envelope::new(
                    EnvelopeType::KeyExchange,
                    SessionId::from("server"),
                    &b"not a certificate"[..],
                ),
            )
            .await
            .unwrap();
            framed
        };

        let initiator = async {
            let mut framed = frame_transport(client_io);
            run_initiator(&mut framed, &SessionId::generate(), &client_identity).await
        };

        let (_rogue_framed, result) = tokio::join!(rogue_responder, initiator);
        match result {
            Err(NetworkError::ProtocolViolation { expected, received }) => {
                assert_eq!(expected, EnvelopeType::HandshakeResponse);
                assert_eq!(received, EnvelopeType::KeyExchange);
            }
            other => panic!("expected protocol violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn responder_rejects_wrong_certificate_step() {
        veilnet_logging::setup_log_no_panic_hook();

        let (client_identity, server_identity) = identities();
        let client_id = SessionId::generate();
        let (client_io, server_io) = tokio::io::duplex(4096);

        let rogue_initiator = async {
            let mut framed = frame_transport(client_io);
            write_one_envelope(
                &mut framed,
                &Envelope::new(
                    EnvelopeType::HandshakeInit,
                    client_id.clone(),
                    Bytes::from_static(HANDSHAKE_GREETING.as_bytes()),
                ),
            )
            .await
            .unwrap();
            let _ = read_one_envelope(&mut framed).await.unwrap();
            // step 3 should be CERTIFICATE_EXCHANGE; send DATA instead
            write_one_envelope(
                &mut framed,
                &Envelope::new(
                    EnvelopeType::Data,
                    client_id.clone(),
                    client_identity.encoded_certificate().unwrap(),
                ),
            )
            .await
            .unwrap();
            framed
        };

        let responder = async {
            let mut framed = frame_transport(server_io);
            run_responder(&mut framed, &SessionId::from("server"), &server_identity).await
        };

        let (_rogue_framed, result) = tokio::join!(rogue_initiator, responder);
        match result {
            Err(NetworkError::ProtocolViolation { expected, received }) => {
                assert_eq!(expected, EnvelopeType::CertificateExchange);
                assert_eq!(received, EnvelopeType::Data);
            }
            other => panic!("expected protocol violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_certificate_fails_the_handshake() {
        veilnet_logging::setup_log_no_panic_hook();

        let (_, server_identity) = identities();
        let client_id = SessionId::generate();
        let (client_io, server_io) = tokio::io::duplex(4096);

        let rogue_initiator = async {
            let mut framed = frame_transport(client_io);
            write_one_envelope(
                &mut framed,
                &Envelope::new(
                    EnvelopeType::HandshakeInit,
                    client_id.clone(),
                    Bytes::from_static(HANDSHAKE_GREETING.as_bytes()),
                ),
            )
            .await
            .unwrap();
            let _ = read_one_envelope(&mut framed).await.unwrap();
            write_one_envelope(
                &mut framed,
                &Envelope::new(
                    EnvelopeType::CertificateExchange,
                    client_id.clone(),
                    &b"not bincode at all"[..],
                ),
            )
            .await
            .unwrap();
            framed
        };

        let responder = async {
            let mut framed = frame_transport(server_io);
            run_responder(&mut framed, &SessionId::from("server"), &server_identity).await
        };

        let (_rogue_framed, result) = tokio::join!(rogue_initiator, responder);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn peer_disappearing_mid_handshake_is_a_socket_error() {
        veilnet_logging::setup_log_no_panic_hook();

        let (client_identity, _) = identities();
        let (client_io, server_io) = tokio::io::duplex(4096);
        drop(server_io);

        let mut framed = frame_transport(client_io);
        let result = run_initiator(&mut framed, &SessionId::generate(), &client_identity).await;
        assert!(matches!(result, Err(NetworkError::SocketError(_))));
    }
}
