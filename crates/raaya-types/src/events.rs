use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ChatMessage;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Server confirms successful authentication, to the calling connection only
    Authenticated { user_id: Uuid },

    /// A message was appended to a room
    NewMessage(ChatMessage),

    /// Someone in the room started or stopped typing
    UserTyping {
        room_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },

    /// A participant read the room
    MessagesRead { room_id: Uuid, user_id: Uuid },

    /// A command from this connection failed
    Error { code: String, message: String },
}

impl GatewayEvent {
    /// Returns the room_id if this event is delivered to a room group.
    pub fn room_id(&self) -> Option<Uuid> {
        match self {
            Self::NewMessage(message) => Some(message.chat_room_id),
            Self::UserTyping { room_id, .. } => Some(*room_id),
            Self::MessagesRead { room_id, .. } => Some(*room_id),
            Self::Authenticated { .. } | Self::Error { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
///
/// `sender_id` / `user_id` are optional echoes of the authenticated user;
/// when present they must match it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    Authenticate { token: String },

    JoinRoom { room_id: Uuid },

    LeaveRoom { room_id: Uuid },

    SendMessage {
        room_id: Uuid,
        #[serde(default)]
        sender_id: Option<Uuid>,
        message: String,
    },

    Typing {
        room_id: Uuid,
        #[serde(default)]
        user_id: Option<Uuid>,
        is_typing: bool,
    },

    MarkRead {
        room_id: Uuid,
        #[serde(default)]
        user_id: Option<Uuid>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_snake_case_tags() {
        let room_id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"join_room","data":{{"room_id":"{}"}}}}"#, room_id);
        match serde_json::from_str::<GatewayCommand>(&raw).unwrap() {
            GatewayCommand::JoinRoom { room_id: parsed } => assert_eq!(parsed, room_id),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn send_message_sender_is_optional() {
        let raw = format!(
            r#"{{"type":"send_message","data":{{"room_id":"{}","message":"hi"}}}}"#,
            Uuid::new_v4()
        );
        let cmd: GatewayCommand = serde_json::from_str(&raw).unwrap();
        assert!(matches!(cmd, GatewayCommand::SendMessage { sender_id: None, .. }));
    }

    #[test]
    fn typing_event_is_room_scoped() {
        let room_id = Uuid::new_v4();
        let event = GatewayEvent::UserTyping { room_id, user_id: Uuid::new_v4(), is_typing: true };
        assert_eq!(event.room_id(), Some(room_id));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user_typing");
        assert_eq!(json["data"]["is_typing"], true);
    }
}
