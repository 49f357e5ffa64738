//! The accepting server of the overlay: binds the listener, gives every
//! accepted socket its own session task, and fans out best-effort disconnects
//! on shutdown.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use veilnet_crypt::certificate::{Certificate, CertificateIdentity};
use veilnet_ledger::backend::LedgerBackend;
use veilnet_types::proto::SessionId;

use crate::constants::{DEFAULT_SERVER_PORT, HANDSHAKE_EXPIRE_TIME, SERVER_CERTIFICATE_SUBJECT, SERVER_SENDER_ID};
use crate::error::NetworkError;
use crate::proto::router::Router;
use crate::proto::session::{handle_connection, SessionInitParams};
use crate::proto::session_manager::SessionManager;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// `None` disables the handshake deadline
    pub handshake_timeout: Option<Duration>,
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            handshake_timeout: Some(HANDSHAKE_EXPIRE_TIME),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new((Ipv4Addr::LOCALHOST, DEFAULT_SERVER_PORT).into())
    }
}

/// The VeilNET server: accepts connections, handshakes each one, and routes
/// encrypted envelopes between the sessions it has registered.
pub struct VeilnetServer {
    local_addr: SocketAddr,
    router: Router,
    identity: Arc<CertificateIdentity>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl VeilnetServer {
    /// Generates the server identity, binds the listener, and starts
    /// accepting. Each accepted socket runs on its own task; a session only
    /// becomes visible to routing once its handshake completes.
    pub async fn bind(
        config: ServerConfig,
        ledger: Arc<dyn LedgerBackend>,
    ) -> Result<Self, NetworkError> {
        let identity = Arc::new(CertificateIdentity::generate(SERVER_CERTIFICATE_SUBJECT)?);
        log::info!(target: "veilnet", "VeilNET server initialized. Server certificate generated.");

        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let session_manager = SessionManager::new();
        let router = Router::new(session_manager, ledger, SessionId::from(SERVER_SENDER_ID));

        let running = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let params = SessionInitParams {
            router: router.clone(),
            identity: identity.clone(),
            handshake_timeout: config.handshake_timeout,
        };

        spawn!(accept_loop(listener, params, running.clone(), shutdown_rx));

        log::info!(target: "veilnet", "VeilNET server started on {local_addr}");

        Ok(Self {
            local_addr,
            router,
            identity,
            running,
            shutdown_tx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn certificate(&self) -> &Certificate {
        self.identity.certificate()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Number of currently established sessions
    pub fn session_count(&self) -> usize {
        self.router.session_manager().session_count()
    }

    /// Determines if `session_id` is connected
    pub fn session_active(&self, session_id: &SessionId) -> bool {
        self.router.session_manager().session_active(session_id)
    }

    /// The routable identifiers of every established session
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.router.session_manager().session_ids()
    }

    /// Stops acceptance, then disconnects every registered session. Each
    /// teardown is independent; one failing never blocks the rest. After this
    /// returns the registry is empty.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let _ = self.shutdown_tx.send(());

        for session in self.router.session_manager().sessions() {
            session.initiate_teardown(&self.router, "server shutdown").await;
        }

        log::info!(target: "veilnet", "VeilNET server stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    params: SessionInitParams,
    running: Arc<AtomicBool>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                log::trace!(target: "veilnet", "Acceptance loop stopping");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    spawn!(handle_connection(params.clone(), stream, peer_addr));
                }
                Err(err) => {
                    if running.load(Ordering::Relaxed) {
                        log::error!(target: "veilnet", "Error accepting client connection: {err}");
                    } else {
                        break;
                    }
                }
            }
        }
    }
}
