//! Per-connection transport tasks.
//!
//! Every connection gets a bounded outbound queue drained by a writer task,
//! and a reader task that decodes frames and forwards them to the node's
//! inbound channel. Senders never block: a full queue is reported back as
//! [`NetworkError::ChannelFull`] and the message is dropped.

use relay_messages::WireMessage;
use relay_protocol::{codec, ProtocolError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{NetworkError, PeerId};

/// Item queued for a peer's writer task.
#[derive(Debug)]
pub enum Outbound {
    Message(WireMessage),
    /// Flush what is queued before this and close the connection.
    Close,
}

/// Sending side of a peer's outbound queue.
#[derive(Clone, Debug)]
pub struct PeerChannel {
    tx: mpsc::Sender<Outbound>,
}

impl PeerChannel {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a message without waiting. `peer` is only used to label the
    /// error.
    pub fn try_send(&self, peer: PeerId, message: WireMessage) -> Result<(), NetworkError> {
        self.tx
            .try_send(Outbound::Message(message))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => NetworkError::ChannelFull(peer),
                mpsc::error::TrySendError::Closed(_) => NetworkError::ChannelClosed(peer),
            })
    }

    /// Ask the writer to close. If the queue is full the close marker is
    /// dropped; the writer still stops once every sender is gone.
    pub fn close(&self) {
        let _ = self.tx.try_send(Outbound::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Event delivered from reader tasks to the node.
#[derive(Debug)]
pub enum InboundEvent {
    Message { peer: PeerId, message: WireMessage },
    Closed(PeerId),
}

/// Spawn the task that drains `rx` onto `writer`.
pub fn spawn_writer<W>(peer: PeerId, mut rx: mpsc::Receiver<Outbound>, mut writer: W) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            let message = match item {
                Outbound::Message(message) => message,
                Outbound::Close => break,
            };
            let frame = match codec::encode(&message) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(%peer, message = message.name(), error = %e, "failed to encode message");
                    continue;
                }
            };
            if let Err(e) = codec::write_frame(&mut writer, &frame).await {
                tracing::debug!(%peer, error = %e, "write failed, closing connection");
                break;
            }
        }
        rx.close();
        tracing::trace!(%peer, "writer stopped");
    })
}

/// Spawn the task that reads frames from `reader` and forwards decoded
/// messages to `inbound`. A [`InboundEvent::Closed`] is always sent when
/// the task ends.
pub fn spawn_reader<R>(peer: PeerId, mut reader: R, inbound: mpsc::Sender<InboundEvent>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let body = match codec::read_frame(&mut reader).await {
                Ok(body) => body,
                Err(ProtocolError::Io(e)) => {
                    tracing::debug!(%peer, error = %e, "connection closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "unreadable frame, dropping connection");
                    break;
                }
            };
            let message = match codec::decode::<WireMessage>(&body) {
                Ok(message) => message,
                Err(e) => {
                    // A bad body doesn't desynchronize framing; skip it.
                    tracing::debug!(%peer, error = %e, "failed to decode message");
                    continue;
                }
            };
            if inbound.send(InboundEvent::Message { peer, message }).await.is_err() {
                break;
            }
        }
        let _ = inbound.send(InboundEvent::Closed(peer)).await;
    })
}
