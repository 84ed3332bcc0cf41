use tracing::{debug, warn};
use uuid::Uuid;

use raaya_types::models::ChatMessage;

use crate::resolver::{authorize, load_room};
use crate::{ChatError, ChatService};

impl ChatService {
    /// Append a message to a room the sender belongs to.
    ///
    /// The insert is the durable step. Bumping the room's `last_message_at`
    /// afterwards is best-effort: a failure is logged and leaves the
    /// timestamp stale without affecting the message.
    pub async fn append(&self, sender_id: Uuid, room_id: Uuid, text: String) -> Result<ChatMessage, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        self.blocking(move |db| {
            let room = load_room(db, room_id)?;
            if !authorize(sender_id, &room) {
                return Err(ChatError::NotAuthorized);
            }

            let message = ChatMessage {
                id: Uuid::new_v4(),
                chat_room_id: room_id,
                sender_id,
                message: text,
                is_read: false,
                created_at: raaya_db::models::now(),
            };
            db.insert_message(&message)?;

            if let Err(e) = db.touch_room(&room_id.to_string(), message.created_at) {
                warn!("Failed to update last_message_at for room {}: {}", room_id, e);
            }

            Ok(message)
        })
        .await
    }

    /// All messages of a room in order, marking the counterpart's messages
    /// as read for the caller.
    ///
    /// The returned messages reflect the state after marking. Marking is
    /// best-effort: if it fails the messages are still returned unchanged.
    pub async fn list(&self, caller_id: Uuid, room_id: Uuid) -> Result<Vec<ChatMessage>, ChatError> {
        self.blocking(move |db| {
            let room = load_room(db, room_id)?;
            if !authorize(caller_id, &room) {
                return Err(ChatError::NotAuthorized);
            }

            let mut messages = db
                .get_messages(&room_id.to_string())?
                .into_iter()
                .map(|row| row.into_message())
                .collect::<anyhow::Result<Vec<_>>>()?;

            match db.mark_read(&room_id.to_string(), &caller_id.to_string()) {
                Ok(marked) => {
                    if marked > 0 {
                        debug!("{} marked {} messages read in room {}", caller_id, marked, room_id);
                    }
                    for message in messages.iter_mut().filter(|m| m.sender_id != caller_id) {
                        message.is_read = true;
                    }
                }
                Err(e) => warn!("Failed to mark messages read in room {}: {}", room_id, e),
            }

            Ok(messages)
        })
        .await
    }

    /// Mark every message in the room not sent by `reader_id` as read.
    /// Returns how many messages changed.
    pub async fn mark_read(&self, reader_id: Uuid, room_id: Uuid) -> Result<usize, ChatError> {
        self.blocking(move |db| {
            let room = load_room(db, room_id)?;
            if !authorize(reader_id, &room) {
                return Err(ChatError::NotAuthorized);
            }
            Ok(db.mark_read(&room_id.to_string(), &reader_id.to_string())?)
        })
        .await
    }
}
