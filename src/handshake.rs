//! Connection handshake
//!
//! A session must pick a room and then a display name unique in that room
//! before it may chat:
//!
//! ```text
//! AwaitingRoomId --"new:<id>"/"old:<id>" accepted--> AwaitingName --name free--> Chatting
//!       ^   |                                            ^   |
//!       +---+ rejected                                   +---+ occupied
//! ```
//!
//! Rejections are text replies and leave the state unchanged, so the client
//! simply retries. Messages of the wrong kind for the current state are
//! rejected the same way.

use std::str::FromStr;
use std::sync::Arc;

use tokio::io::AsyncBufRead;
use tracing::{debug, info};

use crate::codec::FrameReader;
use crate::error::AppError;
use crate::message::{
    Envelope, MessageKind, NAME_ACCEPTED, ROOM_ACCEPTED_PREFIX, ROOM_REJECTED_PREFIX,
};
use crate::registry::RoomRegistry;
use crate::room::{Membership, Room};
use crate::sink::Sink;
use crate::types::{DisplayName, RoomId};

/// Whether the client wants to create a room or join one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomMode {
    New,
    Old,
}

/// Parsed `"<new|old>:<room id>"` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRequest {
    pub mode: RoomMode,
    pub id: RoomId,
}

impl FromStr for RoomRequest {
    type Err = ();

    /// Splits at the first `:`; the room id may itself contain `:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mode, id) = s.split_once(':').ok_or(())?;
        let mode = match mode {
            "new" => RoomMode::New,
            "old" => RoomMode::Old,
            _ => return Err(()),
        };
        Ok(Self {
            mode,
            id: RoomId::from(id),
        })
    }
}

fn room_accepted(id: &RoomId) -> String {
    format!("{} Your room id is \"{}\"", ROOM_ACCEPTED_PREFIX, id)
}

fn room_not_new(id: &RoomId) -> String {
    format!("{} Room id \"{}\" isn't new", ROOM_REJECTED_PREFIX, id)
}

fn room_missing(id: &RoomId) -> String {
    format!("{} Room id \"{}\" doesn't exist", ROOM_REJECTED_PREFIX, id)
}

fn room_malformed() -> String {
    format!(
        "{} Expected \"new:<room id>\" or \"old:<room id>\"",
        ROOM_REJECTED_PREFIX
    )
}

fn room_expected() -> String {
    format!("{} Expected a room selection message", ROOM_REJECTED_PREFIX)
}

fn name_occupied(name: &DisplayName) -> String {
    format!("User name {} is occupied by another user. Write another name:", name)
}

const NAME_EXPECTED: &str = "Unexpected message during name selection. Write your name:";

/// Current handshake state
#[derive(Debug)]
pub enum HandshakeState {
    AwaitingRoomId,
    AwaitingName { room: Arc<Room> },
}

/// Outcome of feeding one message to the handshake
#[derive(Debug)]
pub enum Step {
    /// Stay in the handshake and wait for the next message
    Continue,
    /// Handshake complete; the session is registered and may chat
    Chatting(Membership),
}

/// Per-connection handshake state machine
pub struct Handshake {
    registry: Arc<RoomRegistry>,
    sink: Sink,
    state: HandshakeState,
}

impl Handshake {
    pub fn new(registry: Arc<RoomRegistry>, sink: Sink) -> Self {
        Self {
            registry,
            sink,
            state: HandshakeState::AwaitingRoomId,
        }
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Process one incoming message, queueing the reply on the sink
    pub async fn handle(&mut self, msg: Envelope) -> Result<Step, AppError> {
        let pending_room = match &self.state {
            HandshakeState::AwaitingRoomId => None,
            HandshakeState::AwaitingName { room } => Some(Arc::clone(room)),
        };

        match pending_room {
            None if msg.kind != MessageKind::SetRoomId => {
                debug!(kind = ?msg.kind, "Expected room selection");
                self.reply(room_expected()).await?;
                Ok(Step::Continue)
            }
            None => {
                self.select_room(&msg.payload).await?;
                Ok(Step::Continue)
            }
            Some(_) if msg.kind != MessageKind::SetName => {
                debug!(kind = ?msg.kind, "Expected name selection");
                self.reply(NAME_EXPECTED.to_string()).await?;
                Ok(Step::Continue)
            }
            Some(room) => self.select_name(room, DisplayName(msg.payload)).await,
        }
    }

    async fn select_room(&mut self, payload: &str) -> Result<(), AppError> {
        let Ok(request) = payload.parse::<RoomRequest>() else {
            debug!(payload, "Malformed room selection");
            return self.reply(room_malformed()).await;
        };

        let outcome = match request.mode {
            RoomMode::New => self.registry.create(request.id.clone()),
            RoomMode::Old => self.registry.open(&request.id),
        };

        match outcome {
            Ok(room) => {
                self.reply(room_accepted(&request.id)).await?;
                info!(room = %request.id, mode = ?request.mode, "Room selected");
                self.state = HandshakeState::AwaitingName { room };
                Ok(())
            }
            Err(AppError::RoomConflict(id)) => {
                let text = match request.mode {
                    RoomMode::New => room_not_new(&id),
                    RoomMode::Old => room_missing(&id),
                };
                debug!(room = %id, mode = ?request.mode, "Room selection rejected");
                self.reply(text).await
            }
            Err(e) => Err(e),
        }
    }

    async fn select_name(&self, room: Arc<Room>, name: DisplayName) -> Result<Step, AppError> {
        // Capacity for the acceptance reply is reserved up front so it can be
        // queued under the room lock, ahead of any broadcast to this member.
        let permit = self.sink.reserve().await?;

        match room.join_with(name, self.sink.clone(), move || {
            permit.send(Envelope::text(NAME_ACCEPTED))
        }) {
            Ok(membership) => {
                info!(room = %room.id, name = %membership.name(), "Session admitted");
                Ok(Step::Chatting(membership))
            }
            Err(AppError::NameConflict(name)) => {
                debug!(room = %room.id, name = %name, "Name occupied");
                self.reply(name_occupied(&name)).await?;
                Ok(Step::Continue)
            }
            Err(e) => Err(e),
        }
    }

    async fn reply(&self, text: String) -> Result<(), AppError> {
        self.sink.send(Envelope::text(text)).await?;
        Ok(())
    }
}

/// Drive the handshake over a frame reader until the session is admitted
///
/// Any read or decode failure ends the handshake with that error.
pub async fn negotiate<R>(
    frames: &mut FrameReader<R>,
    registry: Arc<RoomRegistry>,
    sink: Sink,
) -> Result<Membership, AppError>
where
    R: AsyncBufRead + Unpin,
{
    let mut handshake = Handshake::new(registry, sink);
    loop {
        let msg = frames.decode().await?;
        if let Step::Chatting(membership) = handshake.handle(msg).await? {
            return Ok(membership);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn handshake(registry: &Arc<RoomRegistry>) -> (Handshake, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(8);
        let sink = Sink::new(tx);
        (Handshake::new(Arc::clone(registry), sink), rx)
    }

    fn room_msg(payload: &str) -> Envelope {
        Envelope::new(MessageKind::SetRoomId, payload, "")
    }

    fn name_msg(payload: &str) -> Envelope {
        Envelope::new(MessageKind::SetName, payload, "")
    }

    #[test]
    fn test_parse_room_request() {
        assert_eq!(
            "new:lobby".parse::<RoomRequest>(),
            Ok(RoomRequest {
                mode: RoomMode::New,
                id: RoomId::from("lobby")
            })
        );
        assert_eq!(
            "old:a:b".parse::<RoomRequest>().map(|r| r.id),
            Ok(RoomId::from("a:b"))
        );
        assert!("lobby".parse::<RoomRequest>().is_err());
        assert!("NEW:lobby".parse::<RoomRequest>().is_err());
    }

    #[tokio::test]
    async fn test_new_room_then_name() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut hs, mut rx) = handshake(&registry);

        assert!(matches!(hs.handle(room_msg("new:lobby")).await.unwrap(), Step::Continue));
        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.kind, MessageKind::SendText);
        assert_eq!(reply.payload, "Correct room id. Your room id is \"lobby\"");
        assert!(matches!(hs.state(), HandshakeState::AwaitingName { .. }));
        assert!(registry.contains(&RoomId::from("lobby")));

        let step = hs.handle(name_msg("alice")).await.unwrap();
        let Step::Chatting(membership) = step else {
            panic!("expected admission");
        };
        assert_eq!(membership.name().as_str(), "alice");
        assert_eq!(rx.recv().await.unwrap().payload, NAME_ACCEPTED);
    }

    #[tokio::test]
    async fn test_new_existing_room_rejected() {
        let registry = Arc::new(RoomRegistry::new());
        registry.create(RoomId::from("lobby")).unwrap();
        let (mut hs, mut rx) = handshake(&registry);

        hs.handle(room_msg("new:lobby")).await.unwrap();
        let reply = rx.recv().await.unwrap();
        assert!(reply.payload.starts_with(ROOM_REJECTED_PREFIX));
        assert!(reply.payload.contains("isn't new"));
        assert!(matches!(hs.state(), HandshakeState::AwaitingRoomId));
    }

    #[tokio::test]
    async fn test_old_missing_room_rejected_then_retry() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut hs, mut rx) = handshake(&registry);

        hs.handle(room_msg("old:lobby")).await.unwrap();
        let reply = rx.recv().await.unwrap();
        assert!(reply.payload.starts_with(ROOM_REJECTED_PREFIX));
        assert!(reply.payload.contains("doesn't exist"));
        assert!(!registry.contains(&RoomId::from("lobby")));

        registry.create(RoomId::from("lobby")).unwrap();
        hs.handle(room_msg("old:lobby")).await.unwrap();
        assert!(rx.recv().await.unwrap().payload.starts_with(ROOM_ACCEPTED_PREFIX));
    }

    #[tokio::test]
    async fn test_malformed_room_request_rejected() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut hs, mut rx) = handshake(&registry);

        hs.handle(room_msg("lobby")).await.unwrap();
        assert!(rx.recv().await.unwrap().payload.starts_with(ROOM_REJECTED_PREFIX));
        assert!(matches!(hs.state(), HandshakeState::AwaitingRoomId));
        assert_eq!(registry.room_count(), 0);
    }

    #[tokio::test]
    async fn test_wrong_kind_during_room_selection() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut hs, mut rx) = handshake(&registry);

        hs.handle(name_msg("new:lobby")).await.unwrap();
        assert!(rx.recv().await.unwrap().payload.starts_with(ROOM_REJECTED_PREFIX));
        assert!(matches!(hs.state(), HandshakeState::AwaitingRoomId));
        assert_eq!(registry.room_count(), 0);
    }

    #[tokio::test]
    async fn test_occupied_name_rejected() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut first, _first_rx) = handshake(&registry);
        first.handle(room_msg("new:lobby")).await.unwrap();
        let Step::Chatting(_alice) = first.handle(name_msg("alice")).await.unwrap() else {
            panic!("expected admission");
        };

        let (mut second, mut rx) = handshake(&registry);
        second.handle(room_msg("old:lobby")).await.unwrap();
        rx.recv().await.unwrap();

        assert!(matches!(second.handle(name_msg("alice")).await.unwrap(), Step::Continue));
        let reply = rx.recv().await.unwrap();
        assert!(reply.payload.contains("is occupied by another user"));
        assert!(matches!(second.state(), HandshakeState::AwaitingName { .. }));

        assert!(matches!(
            second.handle(name_msg("bob")).await.unwrap(),
            Step::Chatting(_)
        ));
        assert_eq!(rx.recv().await.unwrap().payload, NAME_ACCEPTED);
    }

    #[tokio::test]
    async fn test_wrong_kind_during_name_selection() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut hs, mut rx) = handshake(&registry);
        hs.handle(room_msg("new:lobby")).await.unwrap();
        rx.recv().await.unwrap();

        let msg = Envelope::new(MessageKind::GetUsers, "", "");
        assert!(matches!(hs.handle(msg).await.unwrap(), Step::Continue));
        assert_eq!(rx.recv().await.unwrap().payload, NAME_EXPECTED);
        assert!(matches!(hs.state(), HandshakeState::AwaitingName { .. }));
    }

    #[tokio::test]
    async fn test_name_reply_failure_leaves_no_entry() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut hs, mut rx) = handshake(&registry);
        hs.handle(room_msg("new:lobby")).await.unwrap();
        rx.recv().await.unwrap();
        drop(rx);

        assert!(matches!(
            hs.handle(name_msg("alice")).await,
            Err(AppError::SinkClosed)
        ));
        let room = registry.get(&RoomId::from("lobby")).unwrap();
        assert!(room.is_empty());
    }
}
