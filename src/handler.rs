//! Per-connection session handler
//!
//! Runs the handshake, then the chat loop, for one client. The outbound
//! side is a writer task fed by the session's sink; the inbound side is
//! read here. The session ends on the first read or decode failure, or
//! when the writer task dies, and its room registration goes with it.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::broadcast::{Dispatcher, DEFAULT_BROADCAST_TIMEOUT};
use crate::codec::{FrameReader, DEFAULT_MAX_FRAME_BYTES};
use crate::error::AppError;
use crate::handshake::negotiate;
use crate::message::{Envelope, MessageKind};
use crate::registry::RoomRegistry;
use crate::room::Membership;
use crate::sink::{spawn_writer, Sink, DEFAULT_OUTBOUND_QUEUE};
use crate::types::SessionId;

/// Tunables applied to every session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Capacity of each connection's outbound queue
    pub outbound_queue: usize,
    /// How long a broadcast waits on one recipient's full queue, and how
    /// long the writer task waits on one frame before giving up on the peer
    pub broadcast_timeout: Duration,
    /// Largest accepted incoming frame, newline included
    pub max_frame_bytes: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            broadcast_timeout: DEFAULT_BROADCAST_TIMEOUT,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Handle a new TCP connection
pub async fn handle_connection(
    stream: TcpStream,
    registry: Arc<RoomRegistry>,
    settings: SessionSettings,
) -> Result<(), AppError> {
    let (reader, writer) = stream.into_split();
    handle_session(reader, writer, registry, settings).await
}

/// Run a session over any byte stream halves
///
/// A peer closing the connection is a normal end and returns `Ok`.
pub async fn handle_session<R, W>(
    reader: R,
    writer: W,
    registry: Arc<RoomRegistry>,
    settings: SessionSettings,
) -> Result<(), AppError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let session = SessionId::new();
    let (sink, mut write_task) = spawn_writer(
        session,
        writer,
        settings.outbound_queue,
        settings.broadcast_timeout,
    );
    let mut frames = FrameReader::new(BufReader::new(reader), settings.max_frame_bytes);
    let dispatcher = Dispatcher::new(settings.broadcast_timeout);

    let result = tokio::select! {
        result = run_session(&mut frames, registry, sink, dispatcher) => result,
        _ = &mut write_task => {
            debug!(session = %session, "Writer ended before reader");
            Err(AppError::SinkClosed)
        }
    };

    match result {
        Err(AppError::ConnectionClosed) => {
            info!(session = %session, "Session closed by peer");
            Ok(())
        }
        other => other,
    }
}

/// Handshake, then chat; the membership is released when this returns
async fn run_session<R>(
    frames: &mut FrameReader<R>,
    registry: Arc<RoomRegistry>,
    sink: Sink,
    dispatcher: Dispatcher,
) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
{
    let membership = negotiate(frames, registry, sink).await?;
    chat(frames, &membership, dispatcher).await
}

/// Chat loop for an admitted session
///
/// Serves `GetUsers` locally and fans out `SendVoice`. Other kinds have no
/// meaning once chatting and are ignored.
async fn chat<R>(
    frames: &mut FrameReader<R>,
    membership: &Membership,
    dispatcher: Dispatcher,
) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let msg = frames.decode().await?;
        match msg.kind {
            MessageKind::GetUsers => {
                let reply = Envelope::users(&membership.room().names())?;
                membership.sink().send(reply).await?;
            }
            MessageKind::SendVoice => {
                dispatcher
                    .broadcast_voice(membership, msg.payload, &msg.meta)
                    .await;
            }
            MessageKind::SendText | MessageKind::SetName | MessageKind::SetRoomId => {
                debug!(
                    name = %membership.name(),
                    kind = ?msg.kind,
                    "Ignoring message outside the chat protocol"
                );
            }
        }
    }
}
