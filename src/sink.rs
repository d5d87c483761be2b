//! Outbound sink for a connection
//!
//! Every frame destined for a connection, whether a reply from its own
//! session or a broadcast from another session, is queued on a bounded
//! channel. A single writer task drains the channel and writes whole
//! frames, so frames for one connection never interleave. A write that
//! makes no progress within the write deadline ends the task, so a peer
//! that stops reading cannot pin it.

use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::codec::write_frame;
use crate::error::SendError;
use crate::message::Envelope;
use crate::types::SessionId;

/// Default per-connection queue capacity
pub const DEFAULT_OUTBOUND_QUEUE: usize = 32;

/// Cloneable handle to a connection's outbound queue
#[derive(Debug, Clone)]
pub struct Sink {
    sender: mpsc::Sender<Envelope>,
}

impl Sink {
    pub fn new(sender: mpsc::Sender<Envelope>) -> Self {
        Self { sender }
    }

    /// Queue a frame, waiting for capacity as long as needed
    ///
    /// Returns an error if the writer task has ended.
    pub async fn send(&self, msg: Envelope) -> Result<(), SendError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Queue a frame, giving up if the queue stays full past `deadline`
    pub async fn send_within(&self, msg: Envelope, deadline: Duration) -> Result<(), SendError> {
        self.sender
            .send_timeout(msg, deadline)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => SendError::Timeout(deadline),
                mpsc::error::SendTimeoutError::Closed(_) => SendError::ChannelClosed,
            })
    }

    /// Reserve queue capacity ahead of time
    ///
    /// Sending through the permit never waits, so it can be done while a
    /// registry lock is held.
    pub async fn reserve(&self) -> Result<mpsc::Permit<'_, Envelope>, SendError> {
        self.sender
            .reserve()
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Check if two handles feed the same connection
    pub fn same_channel(&self, other: &Sink) -> bool {
        self.sender.same_channel(&other.sender)
    }
}

/// Create a sink and spawn the writer task draining it into `writer`
///
/// The task ends when every `Sink` clone is dropped, a write fails, or a
/// single frame takes longer than `write_timeout` to write.
pub fn spawn_writer<W>(
    session: SessionId,
    writer: W,
    capacity: usize,
    write_timeout: Duration,
) -> (Sink, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Envelope>(capacity);

    let task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(msg) = rx.recv().await {
            match timeout(write_timeout, write_frame(&mut writer, &msg)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(session = %session, "Write failed, ending writer task: {}", e);
                    break;
                }
                Err(_) => {
                    warn!(session = %session, "Peer stopped reading, ending writer task");
                    break;
                }
            }
        }
        debug!(session = %session, "Writer task ended");
    });

    (Sink::new(tx), task)
}
