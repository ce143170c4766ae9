//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the chat screen and the API server.

use luna_core::Message as ChatMessage;
use serde::{Deserialize, Serialize};

//=========================================================================================
// Messages Sent FROM the Client TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens the chat screen. This must be the first message sent on the connection.
    ///
    /// Without a `conversation_id` a new conversation is created, seeded by
    /// `initial_prompt` when it names a scenario.
    Init {
        #[serde(default)]
        conversation_id: Option<String>,
        #[serde(default)]
        initial_prompt: Option<String>,
    },

    /// Something the user typed.
    Send { text: String },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms which conversation this connection is bound to.
    SessionInitialized { conversation_id: String },

    /// The stored messages, sent once right after initialization.
    History { messages: Vec<ChatMessage> },

    /// A message that was just appended, from either side.
    Message { message: ChatMessage },

    /// Luna is thinking. Input should stay disabled until the next `message`.
    ReplyPending,

    /// Something the user should see, e.g. a rejected send.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_without_conversation_id_parses() {
        let parsed: ClientMessage = serde_json::from_str(r#"{"type":"init"}"#).unwrap();
        assert!(matches!(
            parsed,
            ClientMessage::Init {
                conversation_id: None,
                initial_prompt: None
            }
        ));
    }

    #[test]
    fn server_frames_are_tagged() {
        let frame = ServerMessage::Message {
            message: ChatMessage::ai("こんにちは", "09:00"),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            r#"{"type":"message","message":{"text":"こんにちは","sender":"ai","timestamp":"09:00"}}"#
        );
        assert_eq!(
            serde_json::to_string(&ServerMessage::ReplyPending).unwrap(),
            r#"{"type":"reply_pending"}"#
        );
    }
}
