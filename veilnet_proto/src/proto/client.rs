//! The connecting peer: one initiator handshake, then two independently
//! progressing halves over the same transport: an inbound loop dispatching
//! decrypted envelopes to the registered callback, and an outbound writer fed
//! by caller-submitted sends. The client holds no peer table; decryption of
//! inbound traffic happens inline.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use atomic::Atomic;
use futures::stream::SplitStream;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use veilnet_crypt::certificate::{Certificate, CertificateIdentity};
use veilnet_crypt::misc::CryptError;
use veilnet_crypt::session_crypto::SessionCrypto;
use veilnet_types::proto::{Envelope, EnvelopeType, SessionId};

use crate::constants::{CLIENT_CERTIFICATE_SUBJECT_PREFIX, DISCONNECT_NOTICE, HANDSHAKE_EXPIRE_TIME};
use crate::error::NetworkError;
use crate::proto::outbound_sender::{unbounded, OutboundEnvelopeSender};
use crate::proto::session::SessionState;
use crate::proto::{decode_envelope, frame_transport, handshake, maybe_timeout, run_envelope_writer};

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub server_addr: SocketAddr,
    /// `None` disables the handshake deadline
    pub handshake_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            handshake_timeout: Some(HANDSHAKE_EXPIRE_TIME),
        }
    }
}

/// What the inbound loop hands to the registered application callback, in
/// arrival order
#[allow(variant_size_differences)]
pub enum ClientEvent {
    /// A DATA envelope. `decoded` carries the inline decryption result; a
    /// failed decode leaves the session open and is the application's to
    /// interpret (routed peer traffic is encrypted under the *sender's* key
    /// and will land here as an error).
    Data {
        envelope: Envelope,
        decoded: Result<Vec<u8>, CryptError>,
    },
    /// An ERROR envelope. `reason` is `None` when the notice text could not
    /// be decrypted; that failure is logged and swallowed.
    ErrorNotice {
        envelope: Envelope,
        reason: Option<String>,
    },
    /// The session is gone: server notice, transport loss, or local request
    Disconnected { reason: String },
}

type EventHandler = Arc<dyn Fn(ClientEvent) + Send + Sync>;

/// A single outbound connection to the overlay server, mirroring the
/// server's per-session behavior from the initiator side.
pub struct VeilnetClient {
    client_id: SessionId,
    state: Arc<Atomic<SessionState>>,
    connected: Arc<AtomicBool>,
    crypto: Arc<SessionCrypto>,
    peer_certificate: Arc<Certificate>,
    identity: Arc<CertificateIdentity>,
    to_outbound: OutboundEnvelopeSender,
    handler: Arc<RwLock<Option<EventHandler>>>,
}

/// State shared with the inbound loop task
#[derive(Clone)]
struct InboundContext {
    client_id: SessionId,
    state: Arc<Atomic<SessionState>>,
    connected: Arc<AtomicBool>,
    crypto: Arc<SessionCrypto>,
    to_outbound: OutboundEnvelopeSender,
    handler: Arc<RwLock<Option<EventHandler>>>,
}

impl VeilnetClient {
    /// Connects, runs the initiator handshake, and starts the inbound and
    /// outbound halves. A failed handshake reports its reason and leaves the
    /// caller free to retry; a retry is a brand-new session with a fresh id.
    pub async fn connect(config: ClientConfig) -> Result<Self, NetworkError> {
        let client_id = SessionId::generate();
        let identity = Arc::new(CertificateIdentity::generate(&format!(
            "{CLIENT_CERTIFICATE_SUBJECT_PREFIX}{client_id}"
        ))?);
        log::info!(target: "veilnet", "VeilNET client initialized. Client ID: {client_id}");

        let state = Arc::new(Atomic::new(SessionState::Connecting));
        let stream = TcpStream::connect(config.server_addr).await?;

        state.store(SessionState::Handshaking, Ordering::Relaxed);
        let mut framed = frame_transport(stream);

        let outcome = match maybe_timeout(
            config.handshake_timeout,
            handshake::run_initiator(&mut framed, &client_id, &identity),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                log::error!(target: "veilnet", "Handshake failed: {err:?}");
                state.store(SessionState::Closed, Ordering::Relaxed);
                return Err(err);
            }
        };

        let crypto = Arc::new(SessionCrypto::from_key(outcome.session_key));
        let peer_certificate = Arc::new(outcome.peer_certificate);

        let (sink, inbound) = framed.split();
        let (outbound_tx, outbound_rx) = unbounded();
        spawn!(run_envelope_writer(sink, outbound_rx.into()));

        let connected = Arc::new(AtomicBool::new(true));
        let handler: Arc<RwLock<Option<EventHandler>>> = Arc::new(RwLock::new(None));
        let to_outbound = OutboundEnvelopeSender::from(outbound_tx);
        state.store(SessionState::Established, Ordering::Relaxed);

        spawn!(run_inbound_loop(
            inbound,
            InboundContext {
                client_id: client_id.clone(),
                state: state.clone(),
                connected: connected.clone(),
                crypto: crypto.clone(),
                to_outbound: to_outbound.clone(),
                handler: handler.clone(),
            }
        ));

        log::info!(
            target: "veilnet",
            "Connected to VeilNET server at {}",
            config.server_addr
        );

        Ok(Self {
            client_id,
            state,
            connected,
            crypto,
            peer_certificate,
            identity,
            to_outbound,
            handler,
        })
    }

    /// Registers the single handler invoked with each inbound event.
    /// Replaces any previous handler.
    pub fn set_event_handler(&self, handler: impl Fn(ClientEvent) + Send + Sync + 'static) {
        *self.handler.write() = Some(Arc::new(handler));
    }

    /// Encrypts `plaintext` under the session key and submits a DATA
    /// envelope. `destination` of `None` addresses the server itself. Blocks
    /// only on the outbound channel, never on peer state.
    pub fn send_message(
        &self,
        plaintext: &[u8],
        destination: Option<SessionId>,
    ) -> Result<(), NetworkError> {
        if !self.is_connected() {
            return Err(NetworkError::NotConnected);
        }

        let ciphertext = self.crypto.encrypt(plaintext)?;
        let envelope = match destination {
            Some(destination) => {
                log::trace!(target: "veilnet", "Sending message to {destination}");
                Envelope::new_routed(
                    EnvelopeType::Data,
                    self.client_id.clone(),
                    ciphertext,
                    destination,
                )
            }
            None => Envelope::new(EnvelopeType::Data, self.client_id.clone(), ciphertext),
        };

        self.to_outbound
            .unbounded_send(envelope)
            .map_err(|_| NetworkError::NotConnected)
    }

    /// Sends a best-effort encrypted disconnect notice and closes. The
    /// inbound and outbound tasks terminate when they next observe the
    /// cleared flag or the closing transport. Idempotent.
    pub fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        self.state.store(SessionState::Closing, Ordering::Relaxed);

        match self.crypto.encrypt(DISCONNECT_NOTICE.as_bytes()) {
            Ok(ciphertext) => {
                let notice =
                    Envelope::new(EnvelopeType::Disconnect, self.client_id.clone(), ciphertext);
                let _ = self.to_outbound.unbounded_send(notice);
            }
            Err(err) => {
                log::warn!(target: "veilnet", "Unable to encrypt disconnect notice: {err:?}");
            }
        }

        self.state.store(SessionState::Closed, Ordering::Relaxed);
        log::info!(target: "veilnet", "Disconnected from VeilNET server");
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> SessionState {
        self.state.load(Ordering::Relaxed)
    }

    /// The identifier this client stamps on its outbound envelopes
    pub fn client_id(&self) -> &SessionId {
        &self.client_id
    }

    /// The session cipher, e.g. for a UI that wants to display payloads
    pub fn session_crypto(&self) -> Arc<SessionCrypto> {
        self.crypto.clone()
    }

    /// The server's certificate as received during the handshake
    pub fn peer_certificate(&self) -> &Certificate {
        &self.peer_certificate
    }

    /// This client's own certificate
    pub fn certificate(&self) -> &Certificate {
        self.identity.certificate()
    }
}

fn emit(context: &InboundContext, event: ClientEvent) {
    let handler = context.handler.read().clone();
    if let Some(handler) = handler {
        handler(event);
    }
}

/// Flags the session closed from the inbound side, releases the writer with
/// a final best-effort notice, and notifies the application, once
fn disconnect_locally(context: &InboundContext, reason: &str) {
    if context.connected.swap(false, Ordering::SeqCst) {
        context.state.store(SessionState::Closed, Ordering::Relaxed);

        if let Ok(ciphertext) = context.crypto.encrypt(DISCONNECT_NOTICE.as_bytes()) {
            let notice = Envelope::new(
                EnvelopeType::Disconnect,
                context.client_id.clone(),
                ciphertext,
            );
            let _ = context.to_outbound.unbounded_send(notice);
        }

        emit(
            context,
            ClientEvent::Disconnected {
                reason: reason.to_string(),
            },
        );
    }
}

async fn run_inbound_loop(
    mut inbound: SplitStream<Framed<TcpStream, LengthDelimitedCodec>>,
    context: InboundContext,
) {
    while context.connected.load(Ordering::Relaxed) {
        match inbound.next().await {
            None => {
                disconnect_locally(&context, "server closed the connection");
                break;
            }
            Some(Err(err)) => {
                if context.connected.load(Ordering::Relaxed) {
                    log::error!(target: "veilnet", "Server disconnected: {err}");
                }
                disconnect_locally(&context, "transport failure");
                break;
            }
            Some(Ok(frame)) => {
                let envelope = match decode_envelope(&frame) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        log::warn!(target: "veilnet", "Error reading message: {err:?}");
                        continue;
                    }
                };

                log::trace!(
                    target: "veilnet",
                    "Received message of type {} from {}",
                    envelope.envelope_type,
                    envelope.sender
                );

                match envelope.envelope_type {
                    EnvelopeType::Data => {
                        let decoded = context.crypto.decrypt(&envelope.content);
                        emit(&context, ClientEvent::Data { envelope, decoded });
                    }
                    EnvelopeType::Error => {
                        let reason = match context.crypto.decrypt(&envelope.content) {
                            Ok(plaintext) => {
                                let text = String::from_utf8_lossy(&plaintext).into_owned();
                                log::error!(target: "veilnet", "Received error from server: {text}");
                                Some(text)
                            }
                            Err(err) => {
                                log::warn!(target: "veilnet", "Error decrypting error message: {err:?}");
                                None
                            }
                        };
                        emit(&context, ClientEvent::ErrorNotice { envelope, reason });
                    }
                    EnvelopeType::Disconnect => {
                        log::info!(
                            target: "veilnet",
                            "Server requested disconnect for client {}",
                            context.client_id
                        );
                        disconnect_locally(&context, "server requested disconnect");
                        break;
                    }
                    other => {
                        log::trace!(target: "veilnet", "Received message of type {other}");
                    }
                }
            }
        }
    }
}
