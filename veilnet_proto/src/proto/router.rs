//! Server-side delivery of decrypted-dispatch envelopes. The router decides
//! local-delivery vs. peer-routing vs. not-found purely on the envelope type
//! and destination; DATA content bound for a peer is forwarded byte-for-byte
//! as received, still encrypted under the *sender's* session key. Each
//! session derives its own key, so the recipient generally cannot decrypt a
//! forwarded payload; that is a preserved artifact of the simulated overlay,
//! not a re-encryption bug to fix here.

use std::sync::Arc;

use veilnet_ledger::backend::LedgerBackend;
use veilnet_ledger::records::Severity;
use veilnet_types::proto::{Envelope, EnvelopeType, SessionId};

use crate::constants::ROUTING_ERROR_EVENT;
use crate::error::NetworkError;
use crate::proto::session::ClientSession;
use crate::proto::session_manager::SessionManager;

/// What the router did with one envelope
#[derive(Debug)]
pub enum RoutingOutcome {
    /// The envelope was addressed to the server; here is its plaintext
    LocalDelivery(Vec<u8>),
    /// Forwarded unmodified to the named session's outbound path
    Forwarded(SessionId),
    /// No such destination; an ERROR went back to the sender
    DestinationNotFound(SessionId),
    /// The sender asked to disconnect; the session loop owns the teardown
    Disconnect,
    /// A type the steady-state router has no business with; logged only
    Ignored(EnvelopeType),
}

/// Routes envelopes between established sessions. Explicitly owns its
/// collaborators (directory, ledger, server identity) rather than reaching
/// for ambient state, so a test can wire it up in isolation.
#[derive(Clone)]
pub struct Router {
    session_manager: SessionManager,
    ledger: Arc<dyn LedgerBackend>,
    server_id: SessionId,
}

impl Router {
    pub fn new(
        session_manager: SessionManager,
        ledger: Arc<dyn LedgerBackend>,
        server_id: SessionId,
    ) -> Self {
        Self {
            session_manager,
            ledger,
            server_id,
        }
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.session_manager
    }

    pub(crate) fn ledger(&self) -> &Arc<dyn LedgerBackend> {
        &self.ledger
    }

    pub(crate) fn server_id(&self) -> &SessionId {
        &self.server_id
    }

    /// Consumes one inbound envelope from `session`. Never fatal to the
    /// session except by the caller's choice on a returned error; routing
    /// failures are answered over the wire, not raised.
    pub async fn route(
        &self,
        session: &ClientSession,
        envelope: Envelope,
    ) -> Result<RoutingOutcome, NetworkError> {
        match envelope.envelope_type {
            EnvelopeType::Data => self.route_data(session, envelope).await,
            EnvelopeType::Disconnect => Ok(RoutingOutcome::Disconnect),
            other => {
                log::trace!(
                    target: "veilnet",
                    "Received message of type {other} from client {}",
                    session.session_id()
                );
                Ok(RoutingOutcome::Ignored(other))
            }
        }
    }

    async fn route_data(
        &self,
        session: &ClientSession,
        envelope: Envelope,
    ) -> Result<RoutingOutcome, NetworkError> {
        let Some(destination) = envelope.destination.clone() else {
            // Addressed to the server itself: decrypt and deliver locally
            let plaintext = session.crypto().decrypt(&envelope.content)?;
            return Ok(RoutingOutcome::LocalDelivery(plaintext));
        };

        log::trace!(
            target: "veilnet",
            "Attempting to route message from {} to {destination}",
            envelope.sender
        );

        if let Some(target) = self.session_manager.get_session(&destination) {
            let size = envelope.content.len();
            let forward = Envelope::new_routed(
                EnvelopeType::Data,
                envelope.sender.clone(),
                envelope.content.clone(),
                destination.clone(),
            );

            if target.enqueue_envelope(forward).is_ok() {
                if let Err(err) = self
                    .ledger
                    .record_transfer(
                        session.connection_record(),
                        &session.peer_addr().to_string(),
                        &target.peer_addr().to_string(),
                        size,
                        true,
                        EnvelopeType::Data,
                    )
                    .await
                {
                    log::warn!(target: "veilnet", "Error logging data transfer: {err:?}");
                }

                log::trace!(
                    target: "veilnet",
                    "Message successfully routed from {} to {destination}",
                    envelope.sender
                );
                return Ok(RoutingOutcome::Forwarded(destination));
            }

            log::warn!(
                target: "veilnet",
                "Outbound path for {destination} is closed; reporting routing failure"
            );
        }

        self.report_routing_failure(session, &destination).await;
        Ok(RoutingOutcome::DestinationNotFound(destination))
    }

    /// Answers the sender with an ERROR envelope encrypted under its own
    /// session key and records the event. Both halves are best-effort.
    async fn report_routing_failure(&self, session: &ClientSession, destination: &SessionId) {
        let description = format!("Destination client {destination} not found");
        log::warn!(target: "veilnet", "{description}");

        match session.crypto().encrypt(description.as_bytes()) {
            Ok(ciphertext) => {
                let response =
                    Envelope::new(EnvelopeType::Error, self.server_id.clone(), ciphertext);
                if session.enqueue_envelope(response).is_err() {
                    log::trace!(
                        target: "veilnet",
                        "Sender {} is already gone; dropping routing error",
                        session.session_id()
                    );
                }
            }
            Err(err) => {
                log::warn!(target: "veilnet", "Error encrypting routing error: {err:?}");
            }
        }

        if let Err(err) = self
            .ledger
            .record_security_event(
                session.connection_record(),
                ROUTING_ERROR_EVENT,
                &description,
                Severity::Warning,
            )
            .await
        {
            log::warn!(target: "veilnet", "Error logging security event: {err:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veilnet_crypt::session_crypto::SessionCrypto;
    use veilnet_ledger::memory::MemoryLedger;

    struct Fixture {
        router: Router,
        ledger: Arc<MemoryLedger>,
    }

    async fn fixture() -> Fixture {
        veilnet_logging::setup_log_no_panic_hook();
        let ledger = Arc::new(MemoryLedger::new());
        let router = Router::new(
            SessionManager::new(),
            ledger.clone(),
            SessionId::from("server"),
        );
        Fixture { router, ledger }
    }

    async fn mock_session(
        fixture: &Fixture,
        id: &str,
        key: [u8; 32],
    ) -> (
        ClientSession,
        tokio::sync::mpsc::UnboundedReceiver<Envelope>,
    ) {
        let record = fixture
            .ledger
            .record_connection(&SessionId::from(id), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        ClientSession::mock(SessionId::from(id), key, record)
    }

    #[tokio::test]
    async fn forwards_unmodified_content_between_peers() {
        let fixture = fixture().await;
        let (alice, _alice_rx) = mock_session(&fixture, "alice", [1u8; 32]).await;
        let (bob, mut bob_rx) = mock_session(&fixture, "bob", [2u8; 32]).await;
        fixture.router.session_manager().register_session(alice.clone()).unwrap();
        fixture.router.session_manager().register_session(bob.clone()).unwrap();

        let ciphertext = alice.crypto().encrypt(b"hello").unwrap();
        let envelope = Envelope::new_routed(
            EnvelopeType::Data,
            alice.peer_id().clone(),
            ciphertext.clone(),
            SessionId::from("bob"),
        );

        let outcome = fixture.router.route(&alice, envelope).await.unwrap();
        assert!(matches!(outcome, RoutingOutcome::Forwarded(_)));

        let delivered = bob_rx.recv().await.unwrap();
        assert_eq!(delivered.envelope_type, EnvelopeType::Data);
        assert_eq!(&delivered.sender, alice.peer_id());
        assert_eq!(&delivered.content[..], &ciphertext[..]);

        // forwarded bytes are still under alice's key; bob cannot read them
        assert!(bob.crypto().decrypt(&delivered.content).is_err());
        assert_eq!(
            SessionCrypto::from_key([1u8; 32])
                .decrypt(&delivered.content)
                .unwrap(),
            b"hello"
        );

        let transfers = fixture.ledger.all_transfers().await.unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].size, ciphertext.len());
        assert!(transfers[0].encrypted);
    }

    #[tokio::test]
    async fn unknown_destination_answers_the_sender_once() {
        let fixture = fixture().await;
        let (alice, mut alice_rx) = mock_session(&fixture, "alice", [1u8; 32]).await;
        fixture.router.session_manager().register_session(alice.clone()).unwrap();

        let ciphertext = alice.crypto().encrypt(b"anyone there?").unwrap();
        let envelope = Envelope::new_routed(
            EnvelopeType::Data,
            alice.peer_id().clone(),
            ciphertext,
            SessionId::from("ghost"),
        );

        let outcome = fixture.router.route(&alice, envelope).await.unwrap();
        assert!(matches!(outcome, RoutingOutcome::DestinationNotFound(_)));

        let response = alice_rx.recv().await.unwrap();
        assert_eq!(response.envelope_type, EnvelopeType::Error);
        assert_eq!(response.sender, SessionId::from("server"));
        let reason = alice.crypto().decrypt(&response.content).unwrap();
        assert!(String::from_utf8(reason).unwrap().contains("ghost"));

        assert!(alice_rx.try_recv().is_err());

        let events = fixture
            .ledger
            .security_events_for_connection(alice.connection_record())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, ROUTING_ERROR_EVENT);
        assert_eq!(events[0].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn empty_destination_is_local_delivery() {
        let fixture = fixture().await;
        let (alice, _alice_rx) = mock_session(&fixture, "alice", [1u8; 32]).await;

        let ciphertext = alice.crypto().encrypt(b"for the server").unwrap();
        let envelope = Envelope::new(EnvelopeType::Data, alice.peer_id().clone(), ciphertext);

        match fixture.router.route(&alice, envelope).await.unwrap() {
            RoutingOutcome::LocalDelivery(plaintext) => {
                assert_eq!(plaintext, b"for the server")
            }
            other => panic!("expected local delivery, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_is_surfaced_not_swallowed() {
        let fixture = fixture().await;
        let (alice, _alice_rx) = mock_session(&fixture, "alice", [1u8; 32]).await;

        let envelope = Envelope::new(
            EnvelopeType::Disconnect,
            alice.peer_id().clone(),
            alice.crypto().encrypt(b"Disconnecting").unwrap(),
        );

        assert!(matches!(
            fixture.router.route(&alice, envelope).await.unwrap(),
            RoutingOutcome::Disconnect
        ));
    }

    #[tokio::test]
    async fn stray_handshake_types_are_ignored() {
        let fixture = fixture().await;
        let (alice, _alice_rx) = mock_session(&fixture, "alice", [1u8; 32]).await;

        let envelope = Envelope::new(
            EnvelopeType::KeyExchange,
            alice.peer_id().clone(),
            &b"late"[..],
        );

        assert!(matches!(
            fixture.router.route(&alice, envelope).await.unwrap(),
            RoutingOutcome::Ignored(EnvelopeType::KeyExchange)
        ));
    }

    #[tokio::test]
    async fn local_delivery_under_the_wrong_key_errors_without_side_effects() {
        let fixture = fixture().await;
        let (alice, mut alice_rx) = mock_session(&fixture, "alice", [1u8; 32]).await;

        let foreign = SessionCrypto::from_key([9u8; 32]);
        let envelope = Envelope::new(
            EnvelopeType::Data,
            alice.peer_id().clone(),
            foreign.encrypt(b"mis-keyed").unwrap(),
        );

        assert!(fixture.router.route(&alice, envelope).await.is_err());
        assert!(alice_rx.try_recv().is_err());
    }
}
