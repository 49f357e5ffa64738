//! Cloneable handles for feeding envelopes into a session's writer task.
//! All cross-session interaction goes through these: the router never
//! touches another session's transport, only its outbound channel.

pub use tokio::sync::mpsc::{
    error::SendError, UnboundedReceiver, UnboundedSender as UnboundedSenderInner,
};
use tokio_stream::wrappers::UnboundedReceiverStream;
use veilnet_types::proto::Envelope;

pub struct UnboundedSender<T>(pub(crate) UnboundedSenderInner<T>);

impl<T> Clone for UnboundedSender<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

pub fn unbounded<T>() -> (UnboundedSender<T>, UnboundedReceiver<T>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    (UnboundedSender(tx), rx)
}

impl<T> UnboundedSender<T> {
    #[inline]
    pub fn unbounded_send(&self, item: T) -> Result<(), SendError<T>> {
        self.0.send(item)
    }
}

/// The handle a session (or the router, on its behalf) pushes envelopes into
#[derive(Clone)]
pub struct OutboundEnvelopeSender(UnboundedSender<Envelope>);

impl OutboundEnvelopeSender {
    #[inline]
    pub fn unbounded_send(&self, envelope: Envelope) -> Result<(), SendError<Envelope>> {
        self.0.unbounded_send(envelope)
    }
}

impl From<UnboundedSender<Envelope>> for OutboundEnvelopeSender {
    fn from(inner: UnboundedSender<Envelope>) -> Self {
        Self(inner)
    }
}

/// The receive half consumed by the session's writer task
pub struct OutboundEnvelopeReceiver(pub UnboundedReceiverStream<Envelope>);

impl From<UnboundedReceiver<Envelope>> for OutboundEnvelopeReceiver {
    fn from(inner: UnboundedReceiver<Envelope>) -> Self {
        Self(UnboundedReceiverStream::new(inner))
    }
}
