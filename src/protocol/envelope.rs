//! The outer wire frame. Every binary websocket frame carries exactly one
//! `serde_json`-encoded [`Envelope`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::chat::ChatMessage;
use super::game::GameMessage;

/// Tagged union of the two inner payload kinds a frame can carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Envelope {
    Chat(ChatMessage),
    Game(GameMessage),
}

impl Envelope {
    pub fn chat(msg: ChatMessage) -> Self {
        Self::Chat(msg)
    }

    pub fn game(msg: GameMessage) -> Self {
        Self::Game(msg)
    }

    /// Encode as a JSON byte vector suitable for a binary websocket frame.
    pub fn encode(&self) -> Vec<u8> {
        // `Envelope` only ever contains plain data (no unbounded recursion,
        // no non-finite floats from outside this crate), so encoding cannot
        // fail in practice; a failure here would be a bug in this crate, not
        // a condition callers should have to handle.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Decode a binary websocket frame. Unknown inner `type`/`kind` tags are
    /// represented by the `Unknown` sentinel in [`super::chat::MessageType`]
    /// / [`GameMessage::Unknown`] rather than failing here; this only fails
    /// for frames that aren't well-formed JSON at all, or aren't one of the
    /// two known envelope kinds.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(bytes).map_err(DecodeError)
    }
}

#[derive(Debug, Error)]
#[error("failed to decode envelope: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::chat::MessageType;
    use crate::protocol::game::Team;

    #[test]
    fn chat_envelope_round_trips() {
        let msg = ChatMessage {
            user: "alice".to_string(),
            room_id: 1,
            content: "hi".to_string(),
            timestamp: 1234,
            message_type: MessageType::UserText,
        };
        let envelope = Envelope::chat(msg);
        let bytes = envelope.encode();
        let decoded = Envelope::decode(&bytes).unwrap();
        match decoded {
            Envelope::Chat(m) => {
                assert_eq!(m.user, "alice");
                assert_eq!(m.content, "hi");
                assert_eq!(m.message_type, MessageType::UserText);
            }
            Envelope::Game(_) => panic!("expected chat envelope"),
        }
    }

    #[test]
    fn game_envelope_round_trips() {
        let envelope = Envelope::game(GameMessage::JoinGame { team: Team::Red });
        let bytes = envelope.encode();
        let decoded = Envelope::decode(&bytes).unwrap();
        match decoded {
            Envelope::Game(GameMessage::JoinGame { team: Team::Red }) => {}
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    #[test]
    fn malformed_bytes_fail_to_decode() {
        assert!(Envelope::decode(b"not json").is_err());
    }

    #[test]
    fn unknown_chat_message_type_does_not_fail_decode() {
        let raw = serde_json::json!({
            "kind": "chat",
            "payload": {
                "user": "bob",
                "room_id": 1,
                "content": "x",
                "timestamp": 0,
                "type": 77
            }
        });
        let decoded: Envelope = serde_json::from_value(raw).unwrap();
        match decoded {
            Envelope::Chat(m) => assert_eq!(m.message_type, MessageType::Unknown(77)),
            Envelope::Game(_) => panic!("expected chat envelope"),
        }
    }
}
