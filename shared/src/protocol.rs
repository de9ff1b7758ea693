use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Opaque room identifier. Numeric ids from the room directory are accepted
/// on the wire and kept in their decimal string form.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => RoomId(text.trim().to_string()),
            Raw::Signed(number) => RoomId(number.to_string()),
            Raw::Unsigned(number) => RoomId(number.to_string()),
        })
    }
}

/// Client-to-server envelopes. `userId` is accepted but never trusted; the
/// server stamps relayed events with the authenticated identity.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "join_room")]
    JoinRoom {
        #[serde(rename = "roomId", alias = "roomid")]
        room_id: RoomId,
    },
    #[serde(rename = "leave_room")]
    LeaveRoom {
        #[serde(rename = "roomId", alias = "roomid")]
        room_id: RoomId,
    },
    #[serde(rename = "chat")]
    Chat {
        #[serde(rename = "roomId", alias = "roomid")]
        room_id: RoomId,
        #[serde(
            rename = "userId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        user_id: Option<String>,
        message: String,
    },
    #[serde(rename = "chat_shape")]
    ChatShape {
        #[serde(rename = "roomId", alias = "roomid")]
        room_id: RoomId,
        #[serde(
            rename = "userId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        user_id: Option<String>,
        #[serde(default)]
        shape: Value,
    },
}

impl ClientMessage {
    pub fn room_id(&self) -> &RoomId {
        match self {
            ClientMessage::JoinRoom { room_id }
            | ClientMessage::LeaveRoom { room_id }
            | ClientMessage::Chat { room_id, .. }
            | ClientMessage::ChatShape { room_id, .. } => room_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::JoinRoom { .. } => "join_room",
            ClientMessage::LeaveRoom { .. } => "leave_room",
            ClientMessage::Chat { .. } => "chat",
            ClientMessage::ChatShape { .. } => "chat_shape",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "chat", rename_all = "camelCase")]
    Chat {
        room_id: RoomId,
        user_id: String,
        message: String,
    },
    #[serde(rename = "chat_shape", rename_all = "camelCase")]
    ChatShape {
        room_id: RoomId,
        user_id: String,
        shape: Value,
    },
}

impl ServerMessage {
    pub fn room_id(&self) -> &RoomId {
        match self {
            ServerMessage::Chat { room_id, .. } | ServerMessage::ChatShape { room_id, .. } => {
                room_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Point, Shape};

    #[test]
    fn numeric_and_legacy_room_keys_are_accepted() {
        let message: ClientMessage =
            serde_json::from_str(r#"{"type":"join_room","roomId":42}"#).unwrap();
        assert_eq!(message.room_id(), &RoomId::new("42"));

        let message: ClientMessage = serde_json::from_str(
            r#"{"type":"chat_shape","roomid":"42","shape":{"type":"rect","x":0,"y":0,"width":1,"height":1}}"#,
        )
        .unwrap();
        assert_eq!(message.room_id(), &RoomId::new("42"));
    }

    #[test]
    fn missing_room_is_rejected() {
        let no_room = r#"{"type":"chat","message":"hi"}"#;
        assert!(serde_json::from_str::<ClientMessage>(no_room).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"wave","roomId":"1"}"#).is_err());
    }

    #[test]
    fn missing_shape_deserializes_as_null() {
        let message: ClientMessage =
            serde_json::from_str(r#"{"type":"chat_shape","roomId":"7"}"#).unwrap();
        assert!(matches!(message, ClientMessage::ChatShape { shape: Value::Null, .. }));
    }

    #[test]
    fn server_envelope_uses_camel_case_keys() {
        let shape = Shape::rectangle_from_drag(Point::new(10.0, 10.0), Point::new(110.0, 60.0));
        let message = ServerMessage::ChatShape {
            room_id: RoomId::new("42"),
            user_id: "user-a".into(),
            shape: serde_json::to_value(&shape).unwrap(),
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "chat_shape");
        assert_eq!(value["roomId"], "42");
        assert_eq!(value["userId"], "user-a");
        assert_eq!(value["shape"]["width"], 100.0);
    }
}
