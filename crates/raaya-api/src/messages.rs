use axum::{
    Extension, Json,
    extract::State,
};
use tracing::debug;
use uuid::Uuid;

use raaya_chat::ChatError;
use raaya_types::api::{Claims, SendMessageRequest};
use raaya_types::events::GatewayEvent;
use raaya_types::models::ChatMessage;

use crate::extract::{ApiJson, ApiPath};
use crate::{ApiError, AppState};

/// Messages of a room in send order. Reading marks the counterpart's
/// messages as read for the caller.
pub async fn get_messages(
    State(state): State<AppState>,
    ApiPath(room_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let messages = state.chat.list(claims.sub, room_id).await?;
    Ok(Json(messages))
}

/// Persist a message, then fan it out to every socket joined to the room.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<Json<ChatMessage>, ApiError> {
    let room_id = req
        .room_id
        .ok_or_else(|| ApiError::BadRequest("room_id is required".into()))?;
    let text = req.message.ok_or(ChatError::EmptyMessage)?;

    let message = state.chat.append(claims.sub, room_id, text).await?;

    let delivered = state
        .dispatcher
        .broadcast_to_room(room_id, GatewayEvent::NewMessage(message.clone()), None)
        .await;
    debug!("Message {} fanned out to {} connections", message.id, delivered);

    Ok(Json(message))
}
