//! Server-side session: the authenticated, keyed connection abstraction and
//! the per-connection lifecycle loop that drives it from accept to teardown.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use atomic::Atomic;
use bytemuck::NoUninit;
use futures::StreamExt;
use tokio::net::TcpStream;

use veilnet_crypt::certificate::{Certificate, CertificateIdentity};
use veilnet_crypt::session_crypto::SessionCrypto;
use veilnet_ledger::records::ConnectionRecordId;
use veilnet_types::proto::{Envelope, EnvelopeType, SessionId};

use crate::constants::DISCONNECT_NOTICE;
use crate::proto::outbound_sender::{unbounded, OutboundEnvelopeSender, SendError};
use crate::proto::router::{Router, RoutingOutcome};
use crate::proto::{decode_envelope, frame_transport, handshake, maybe_timeout, run_envelope_writer};

/// Allows each session worker to check the state of the session
#[derive(Copy, Clone, PartialEq, Debug, NoUninit)]
#[repr(u8)]
pub enum SessionState {
    /// Transport accepted or initiated; nothing exchanged yet
    Connecting,
    /// The five-step handshake is in flight
    Handshaking,
    /// Keyed and (server-side) registered; data can flow
    Established,
    /// Teardown in progress; the final disconnect notice may still flush
    Closing,
    /// Terminal. A closed session is never reused
    Closed,
}

/// A live, established connection as seen by the server. Cheap to clone; all
/// clones observe the same state and feed the same outbound path. The
/// transport halves are owned exclusively by the session's reader and writer
/// tasks, never by this handle.
#[derive(Clone)]
pub struct ClientSession {
    pub(crate) session_id: SessionId,
    pub(crate) peer_id: SessionId,
    pub(crate) peer_addr: SocketAddr,
    pub(crate) state: Arc<Atomic<SessionState>>,
    pub(crate) crypto: Arc<SessionCrypto>,
    pub(crate) peer_certificate: Arc<Certificate>,
    pub(crate) connection_record: ConnectionRecordId,
    pub(crate) to_outbound: OutboundEnvelopeSender,
    teardown_once: Arc<AtomicBool>,
}

impl ClientSession {
    /// The server-assigned identifier this session is routable under
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The identifier the peer stamps on its own envelopes
    pub fn peer_id(&self) -> &SessionId {
        &self.peer_id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> SessionState {
        self.state.load(Ordering::Relaxed)
    }

    pub fn peer_certificate(&self) -> &Certificate {
        &self.peer_certificate
    }

    pub(crate) fn crypto(&self) -> &SessionCrypto {
        &self.crypto
    }

    pub(crate) fn connection_record(&self) -> ConnectionRecordId {
        self.connection_record
    }

    /// Hands an envelope to this session's writer task
    pub(crate) fn enqueue_envelope(&self, envelope: Envelope) -> Result<(), SendError<Envelope>> {
        self.to_outbound.unbounded_send(envelope)
    }

    /// Drives the session into Closed. Idempotent; every step is best-effort
    /// and independent: the disconnect notice, the registry removal, and the
    /// ledger observation each proceed regardless of the others.
    pub(crate) async fn initiate_teardown(&self, router: &Router, reason: &str) {
        if self.teardown_once.swap(true, Ordering::SeqCst) {
            return;
        }

        self.state.store(SessionState::Closing, Ordering::Relaxed);
        log::trace!(target: "veilnet", "Session {} closing: {reason}", self.session_id);

        match self.crypto.encrypt(DISCONNECT_NOTICE.as_bytes()) {
            Ok(ciphertext) => {
                let notice = Envelope::new(
                    EnvelopeType::Disconnect,
                    router.server_id().clone(),
                    ciphertext,
                );
                if self.enqueue_envelope(notice).is_err() {
                    log::trace!(target: "veilnet", "Outbound path for {} already closed", self.session_id);
                }
            }
            Err(err) => {
                log::warn!(target: "veilnet", "Unable to encrypt disconnect notice for {}: {err:?}", self.session_id);
            }
        }

        let _ = router.session_manager().clear_session(&self.session_id);

        if let Err(err) = router
            .ledger()
            .record_disconnection(self.connection_record)
            .await
        {
            log::warn!(target: "veilnet", "Error logging disconnection: {err:?}");
        }

        self.state.store(SessionState::Closed, Ordering::Relaxed);
        log::info!(target: "veilnet", "Client disconnected: {}", self.session_id);
    }
}

/// Everything a freshly accepted connection needs to become a session
#[derive(Clone)]
pub(crate) struct SessionInitParams {
    pub(crate) router: Router,
    pub(crate) identity: Arc<CertificateIdentity>,
    pub(crate) handshake_timeout: Option<Duration>,
}

/// The lifecycle of one accepted connection: handshake as responder,
/// register, pump inbound envelopes through the router, tear down.
pub(crate) async fn handle_connection(
    params: SessionInitParams,
    stream: TcpStream,
    peer_addr: SocketAddr,
) {
    let router = params.router;
    let session_id = SessionId::generate();
    let state = Arc::new(Atomic::new(SessionState::Connecting));

    log::info!(target: "veilnet", "New client connected: {session_id} from {peer_addr}");

    let connection_record = match router.ledger().record_connection(&session_id, peer_addr).await {
        Ok(record) => record,
        Err(err) => {
            log::error!(target: "veilnet", "Ledger error handling new client {session_id}: {err:?}");
            return;
        }
    };

    state.store(SessionState::Handshaking, Ordering::Relaxed);
    let mut framed = frame_transport(stream);

    let outcome = match maybe_timeout(
        params.handshake_timeout,
        handshake::run_responder(&mut framed, router.server_id(), &params.identity),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            log::error!(target: "veilnet", "Handshake failed with client {session_id}: {err:?}");
            state.store(SessionState::Closed, Ordering::Relaxed);
            if let Err(err) = router.ledger().record_disconnection(connection_record).await {
                log::warn!(target: "veilnet", "Error logging disconnection: {err:?}");
            }
            return;
        }
    };

    if let Some(greeting) = &outcome.greeting {
        log::trace!(target: "veilnet", "Client {session_id} greeted with: {greeting}");
    }

    let (sink, mut inbound) = framed.split();
    let (outbound_tx, outbound_rx) = unbounded();
    spawn!(run_envelope_writer(sink, outbound_rx.into()));

    let session = ClientSession {
        session_id: session_id.clone(),
        peer_id: outcome.peer_id,
        peer_addr,
        state: state.clone(),
        crypto: Arc::new(SessionCrypto::from_key(outcome.session_key)),
        peer_certificate: Arc::new(outcome.peer_certificate),
        connection_record,
        to_outbound: outbound_tx.into(),
        teardown_once: Arc::new(AtomicBool::new(false)),
    };

    // Registration is the single point this session becomes routable, and it
    // happens strictly after the handshake has produced a key.
    state.store(SessionState::Established, Ordering::Relaxed);
    if let Err(err) = router.session_manager().register_session(session.clone()) {
        log::error!(target: "veilnet", "Unable to register session {session_id}: {err:?}");
        session.initiate_teardown(&router, "registration failed").await;
        return;
    }

    let reason = loop {
        if session.state() != SessionState::Established {
            break "session no longer established";
        }

        match inbound.next().await {
            None => break "transport closed by peer",
            Some(Err(err)) => {
                log::trace!(target: "veilnet", "Read failure on session {session_id}: {err:?}");
                break "transport failure";
            }
            Some(Ok(frame)) => match decode_envelope(&frame) {
                Err(err) => {
                    log::warn!(target: "veilnet", "Malformed envelope from {session_id}: {err:?}");
                    continue;
                }
                Ok(envelope) => match router.route(&session, envelope).await {
                    Ok(RoutingOutcome::Disconnect) => {
                        log::info!(target: "veilnet", "Client {session_id} requested disconnect");
                        break "peer requested disconnect";
                    }
                    Ok(RoutingOutcome::LocalDelivery(plaintext)) => {
                        log::info!(
                            target: "veilnet",
                            "Received data message for server: {}",
                            String::from_utf8_lossy(&plaintext)
                        );
                    }
                    Ok(outcome) => {
                        log::trace!(target: "veilnet", "Routing outcome for {session_id}: {outcome:?}");
                    }
                    Err(err) => {
                        log::error!(
                            target: "veilnet",
                            "Error processing message from client {session_id}: {err:?}"
                        );
                    }
                },
            },
        }
    };

    session.initiate_teardown(&router, reason).await;
}

#[cfg(test)]
impl ClientSession {
    /// Builds a detached session for registry/router tests. The returned
    /// receiver observes everything routed onto the session's outbound path.
    pub(crate) fn mock(
        session_id: SessionId,
        key: [u8; 32],
        connection_record: ConnectionRecordId,
    ) -> (Self, tokio::sync::mpsc::UnboundedReceiver<Envelope>) {
        let (outbound_tx, outbound_rx) = unbounded();
        let session = Self {
            session_id,
            peer_id: SessionId::generate(),
            peer_addr: "127.0.0.1:0".parse().unwrap(),
            state: Arc::new(Atomic::new(SessionState::Established)),
            crypto: Arc::new(SessionCrypto::from_key(key)),
            peer_certificate: Arc::new(
                CertificateIdentity::generate("mock peer")
                    .unwrap()
                    .certificate()
                    .clone(),
            ),
            connection_record,
            to_outbound: outbound_tx.into(),
            teardown_once: Arc::new(AtomicBool::new(false)),
        };

        (session, outbound_rx)
    }
}
