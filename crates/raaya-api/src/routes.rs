use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::middleware::require_auth;
use crate::{AppState, admin, auth, messages, profiles, rooms};

/// The REST surface, mounted under `/api`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/profiles/{user_id}", get(profiles::get_profiles));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/profile", put(profiles::update_profile))
        .route(
            "/users/chat-settings",
            get(profiles::get_chat_settings).patch(profiles::update_chat_settings),
        )
        .route("/chat/room", post(rooms::create_room))
        .route("/chat/rooms", get(rooms::list_rooms))
        .route("/chat/messages", post(messages::send_message))
        .route("/chat/messages/{room_id}", get(messages::get_messages))
        .route("/admin/chats", get(admin::list_chats))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new().nest(
        "/api",
        Router::new()
            .merge(public_routes)
            .merge(protected_routes)
            .with_state(state),
    )
}
