use axum::{Extension, Json, extract::State};

use raaya_chat::{Caller, ChatError, ChatTarget};
use raaya_types::api::{Claims, CreateRoomRequest, RoomSummary};
use raaya_types::models::ChatRoom;

use crate::extract::ApiJson;
use crate::{ApiError, AppState};

/// Resolve the caller's request to the one room for that pair, creating it
/// on first contact. A body that does not parse is an invalid chat request.
pub async fn create_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<ApiJson<CreateRoomRequest>, ApiError>,
) -> Result<Json<ChatRoom>, ApiError> {
    let ApiJson(req) = payload.map_err(|e| match e {
        ApiError::BadRequest(message) => ApiError::Chat(ChatError::InvalidChatRequest(message)),
        other => other,
    })?;

    let caller = Caller::from(&claims);
    let target = ChatTarget::from_request(caller.role, &req)?;
    let room = state.chat.resolve_or_create(caller, target).await?;
    Ok(Json(room))
}

pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<RoomSummary>>, ApiError> {
    let rooms = state.chat.rooms_for(Caller::from(&claims)).await?;
    Ok(Json(rooms))
}
