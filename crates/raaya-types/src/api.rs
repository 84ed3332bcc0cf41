use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatMessage, ChatRoom, ChatVisibility, ProfileSummary, Role};

// -- JWT Claims --

/// JWT claims shared across raaya-api (REST middleware) and raaya-gateway
/// (WebSocket authentication).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub role: Role,
    pub token: String,
}

// -- Profiles --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatSettingsBody {
    pub chat_settings: ChatVisibility,
}

// -- Chat --

/// Body of `POST /chat/room`. Which fields are honoured depends on the
/// requester's role; `provider_type` stays a string so a bad value is
/// reported as an invalid chat request rather than a JSON error.
#[derive(Debug, Default, Deserialize)]
pub struct CreateRoomRequest {
    pub other_artist_id: Option<Uuid>,
    pub other_partner_id: Option<Uuid>,
    pub provider_user_id: Option<Uuid>,
    pub provider_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub room_id: Option<Uuid>,
    pub message: Option<String>,
}

/// One side of a room as shown in listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomParty {
    pub user_id: Uuid,
    pub role: Option<Role>,
    pub profile: Option<ProfileSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    #[serde(flatten)]
    pub room: ChatRoom,
    pub parties: Vec<RoomParty>,
    pub last_message: Option<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminChatView {
    pub room: ChatRoom,
    pub parties: Vec<RoomParty>,
    pub messages: Vec<ChatMessage>,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
