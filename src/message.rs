//! Message protocol definitions
//!
//! Every message in both directions is an `Envelope`: a JSON object with an
//! integer `msg_type`, a string `data` payload and a string `meta_data`.
//! The integer values of `MessageKind` are part of the wire contract.

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::DisplayName;

/// Reply text sent when the name is accepted
pub const NAME_ACCEPTED: &str = "Correct name. You can start chatting";

/// Prefix of every accepted room selection reply
pub const ROOM_ACCEPTED_PREFIX: &str = "Correct room id.";

/// Prefix of every rejected room selection reply
pub const ROOM_REJECTED_PREFIX: &str = "Incorrect room id.";

/// Kind of an envelope, encoded as an integer on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum MessageKind {
    /// Attachment broadcast
    SendVoice = 0,
    /// Plain text notice (server replies)
    SendText = 1,
    /// Membership query and its reply
    GetUsers = 2,
    /// Display name selection
    SetName = 3,
    /// Room selection
    SetRoomId = 4,
}

impl TryFrom<i64> for MessageKind {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageKind::SendVoice),
            1 => Ok(MessageKind::SendText),
            2 => Ok(MessageKind::GetUsers),
            3 => Ok(MessageKind::SetName),
            4 => Ok(MessageKind::SetRoomId),
            other => Err(format!("unknown msg_type {}", other)),
        }
    }
}

impl From<MessageKind> for i64 {
    fn from(kind: MessageKind) -> Self {
        kind as i64
    }
}

/// Wire envelope
///
/// Missing or null `data` and `meta_data` fields decode as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "msg_type")]
    pub kind: MessageKind,
    #[serde(rename = "data", default, deserialize_with = "null_as_empty")]
    pub payload: String,
    #[serde(rename = "meta_data", default, deserialize_with = "null_as_empty")]
    pub meta: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Envelope {
    pub fn new(kind: MessageKind, payload: impl Into<String>, meta: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
            meta: meta.into(),
        }
    }

    /// Text notice from the server
    pub fn text(message: impl Into<String>) -> Self {
        Self::new(MessageKind::SendText, message, "")
    }

    /// Reply to a `GetUsers` query, carrying the names as a JSON list
    pub fn users(names: &[DisplayName]) -> Result<Self, serde_json::Error> {
        let names: Vec<&str> = names.iter().map(DisplayName::as_str).collect();
        Ok(Self::new(MessageKind::GetUsers, serde_json::to_string(&names)?, ""))
    }

    /// Attachment as delivered to recipients: meta becomes `<sender>|<meta>`
    pub fn voice_from(sender: &DisplayName, payload: impl Into<String>, meta: &str) -> Self {
        Self::new(MessageKind::SendVoice, payload, format!("{}|{}", sender, meta))
    }
}
