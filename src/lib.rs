//! Room-based Relay Server Library
//!
//! A TCP relay where clients pick a room, claim a display name unique in
//! that room, then exchange voice attachments with everyone else there.
//!
//! # Protocol
//! Newline-delimited JSON envelopes: `{"msg_type": n, "data": "...", "meta_data": "..."}`
//! with `0=SendVoice, 1=SendText, 2=GetUsers, 3=SetName, 4=SetRoomId`.
//!
//! # Architecture
//! - `RoomRegistry` maps room ids to rooms; rooms are never removed
//! - Each `Room` maps display names to outbound sinks
//! - Each connection has a writer task draining a bounded queue, so frames
//!   from the session itself and from broadcasters never interleave
//! - Each connection's `handler` task runs the handshake, then the chat loop
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use voice_relay::{Server, SessionSettings};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("0.0.0.0:5454").await.unwrap();
//!     Server::new(SessionSettings::default()).run(listener).await;
//! }
//! ```

pub mod broadcast;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod handshake;
pub mod message;
pub mod registry;
pub mod room;
pub mod server;
pub mod sink;
pub mod types;

// Re-export main types for convenience
pub use broadcast::{DeliveryReport, Dispatcher};
pub use codec::{encode, write_frame, FrameReader};
pub use config::Config;
pub use error::{AppError, ConfigError, SendError};
pub use handler::{handle_connection, handle_session, SessionSettings};
pub use handshake::{Handshake, HandshakeState, RoomMode, RoomRequest, Step};
pub use message::{Envelope, MessageKind};
pub use registry::RoomRegistry;
pub use room::{Membership, Room};
pub use server::Server;
pub use sink::Sink;
pub use types::{DisplayName, RoomId, SessionId};
