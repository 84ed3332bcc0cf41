use axum::{Extension, Json, extract::State};

use raaya_chat::Caller;
use raaya_types::api::{AdminChatView, Claims};

use crate::{ApiError, AppState};

/// Every room with its full history and both parties. Admins only.
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<AdminChatView>>, ApiError> {
    let chats = state.chat.admin_chats(Caller::from(&claims)).await?;
    Ok(Json(chats))
}
