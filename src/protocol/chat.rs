//! `ChatMessage` — the inner payload shared by Chat, Drawing, and Gobang rooms.

use serde::{Deserialize, Serialize};

use super::ids::RoomId;

/// The integer-tagged message kind carried by a [`ChatMessage`].
///
/// Represented over the wire as a plain integer (not an internally tagged
/// string) to match the donor protocol's `type` field. Unrecognised integers
/// decode into [`MessageType::Unknown`] rather than failing — handlers match
/// on the known variants and fall through silently for `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", from = "i32")]
pub enum MessageType {
    System,
    UserText,
    Music,
    RoomCount,
    DrawingState,
    DrawingRequest,
    DrawingRequestApprove,
    Drawing,
    DrawingClear,
    DrawingStop,
    GobangState,
    GobangMove,
    GobangJoin,
    GobangLeave,
    Unknown(i32),
}

impl From<MessageType> for i32 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::System => 0,
            MessageType::UserText => 1,
            MessageType::Music => 2,
            MessageType::RoomCount => 3,
            MessageType::DrawingState => 4,
            MessageType::DrawingRequest => 5,
            MessageType::DrawingRequestApprove => 6,
            MessageType::Drawing => 7,
            MessageType::DrawingClear => 8,
            MessageType::DrawingStop => 9,
            MessageType::GobangState => 20,
            MessageType::GobangMove => 21,
            MessageType::GobangJoin => 22,
            MessageType::GobangLeave => 23,
            MessageType::Unknown(raw) => raw,
        }
    }
}

impl From<i32> for MessageType {
    fn from(raw: i32) -> Self {
        match raw {
            0 => Self::System,
            1 => Self::UserText,
            2 => Self::Music,
            3 => Self::RoomCount,
            4 => Self::DrawingState,
            5 => Self::DrawingRequest,
            6 => Self::DrawingRequestApprove,
            7 => Self::Drawing,
            8 => Self::DrawingClear,
            9 => Self::DrawingStop,
            20 => Self::GobangState,
            21 => Self::GobangMove,
            22 => Self::GobangJoin,
            23 => Self::GobangLeave,
            other => Self::Unknown(other),
        }
    }
}

/// The chat-family inner payload of an [`super::envelope::Envelope`].
///
/// Used verbatim by Chat rooms and reused (with `message_type` set to one of
/// the `DRAWING_*`/`GOBANG_*` codes) by Drawing and Gobang rooms, which pass
/// their state through `content` as a serialised string rather than growing
/// the envelope with room-specific variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub user: String,
    pub room_id: RoomId,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub message_type: MessageType,
}

impl ChatMessage {
    pub fn system(room_id: RoomId, content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            user: "System".to_string(),
            room_id,
            content: content.into(),
            timestamp,
            message_type: MessageType::System,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_discriminants_round_trip() {
        let raw = 99;
        let decoded = MessageType::from(raw);
        assert_eq!(decoded, MessageType::Unknown(99));
        assert_eq!(i32::from(decoded), raw);
    }

    #[test]
    fn known_discriminants_round_trip() {
        for (value, expected) in [
            (0, MessageType::System),
            (9, MessageType::DrawingStop),
            (20, MessageType::GobangState),
            (23, MessageType::GobangLeave),
        ] {
            assert_eq!(MessageType::from(value), expected);
            assert_eq!(i32::from(expected), value);
        }
    }

    #[test]
    fn chat_message_serializes_type_as_integer() {
        let msg = ChatMessage::system(1, "hi", 0);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], 0);
    }
}
