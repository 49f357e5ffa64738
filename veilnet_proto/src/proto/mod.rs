//! # VeilNET Protocol Core
//!
//! Implements the session protocol engine of the overlay: the ordered
//! handshake that establishes a per-session key, the per-connection session
//! loops, the server-side session registry and message router, and the
//! client-side mirror of the same machinery.
//!
//! ## Module Structure
//! - `handshake`: the five-step certificate-and-key exchange, mirrored roles
//! - `session`: server-side per-connection lifecycle and state
//! - `session_manager`: concurrent directory of established sessions
//! - `router`: delivery of DATA envelopes by logical identifier
//! - `node`: the accepting server
//! - `client`: the connecting peer
//! - `outbound_sender`: cloneable handles feeding each session's writer task
//!
//! Envelopes travel as length-delimited frames, one bincode-encoded
//! [`Envelope`] per frame, so a frame read back from the transport is always
//! a whole envelope.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use veilnet_types::proto::{Envelope, EnvelopeType};
use veilnet_types::serialization::WireIO;

use crate::error::NetworkError;
use crate::proto::outbound_sender::OutboundEnvelopeReceiver;

pub(crate) mod client;
pub(crate) mod handshake;
pub(crate) mod node;
pub(crate) mod outbound_sender;
pub(crate) mod router;
pub(crate) mod session;
pub(crate) mod session_manager;

/// Wraps a raw byte stream in the overlay's length-delimited framing
pub(crate) fn frame_transport<S: AsyncRead + AsyncWrite + Unpin>(
    io: S,
) -> Framed<S, LengthDelimitedCodec> {
    Framed::new(io, LengthDelimitedCodec::new())
}

pub(crate) fn encode_envelope(envelope: &Envelope) -> Result<Bytes, NetworkError> {
    envelope
        .serialize_to_vector()
        .map(Bytes::from)
        .map_err(|err| NetworkError::Generic(err.to_string()))
}

pub(crate) fn decode_envelope(frame: &[u8]) -> Result<Envelope, NetworkError> {
    Envelope::deserialize_from_vector(frame)
        .map_err(|_| NetworkError::InvalidEnvelope("malformed envelope"))
}

/// Reads exactly one envelope from the framed transport. EOF before a full
/// frame is a socket error: the handshake treats any of these as fatal.
pub(crate) async fn read_one_envelope<S: AsyncRead + AsyncWrite + Unpin>(
    framed: &mut Framed<S, LengthDelimitedCodec>,
) -> Result<Envelope, NetworkError> {
    let frame = framed
        .next()
        .await
        .ok_or_else(|| NetworkError::SocketError("connection closed by peer".to_string()))??;
    decode_envelope(&frame)
}

pub(crate) async fn write_one_envelope<S: AsyncRead + AsyncWrite + Unpin>(
    framed: &mut Framed<S, LengthDelimitedCodec>,
    envelope: &Envelope,
) -> Result<(), NetworkError> {
    let frame = encode_envelope(envelope)?;
    framed.send(frame).await?;
    Ok(())
}

/// Runs a future under an optional deadline
pub(crate) async fn maybe_timeout<F, T>(
    duration: Option<Duration>,
    future: F,
) -> Result<T, NetworkError>
where
    F: Future<Output = Result<T, NetworkError>>,
{
    match duration {
        Some(duration) => tokio::time::timeout(duration, future)
            .await
            .map_err(|_| NetworkError::Timeout("handshake deadline elapsed"))?,
        None => future.await,
    }
}

/// Drains a session's outbound channel onto the write half of its transport.
/// Terminates after flushing a DISCONNECT notice (the final envelope a
/// session ever sends), when every sender is dropped, or on a write failure;
/// the write direction of the transport is shut down on the way out.
pub(crate) async fn run_envelope_writer<S>(
    mut sink: SplitSink<Framed<S, LengthDelimitedCodec>, Bytes>,
    outbound_rx: OutboundEnvelopeReceiver,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut outbound_rx = outbound_rx.0;
    while let Some(envelope) = outbound_rx.next().await {
        let is_final_notice = envelope.envelope_type == EnvelopeType::Disconnect;

        let frame = match encode_envelope(&envelope) {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!(target: "veilnet", "Unable to encode outbound envelope: {err:?}");
                continue;
            }
        };

        if let Err(err) = sink.send(frame).await {
            log::trace!(target: "veilnet", "Outbound write failed: {err:?}");
            break;
        }

        if is_final_notice {
            break;
        }
    }

    let _ = sink.close().await;
}
