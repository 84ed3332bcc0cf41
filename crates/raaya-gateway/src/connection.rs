use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{error, info, trace, warn};
use uuid::Uuid;

use raaya_chat::{ChatError, ChatService};
use raaya_types::api::Claims;
use raaya_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// A connection that has not authenticated by then is closed.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a connection needs to serve commands.
#[derive(Clone)]
pub struct GatewayContext {
    pub dispatcher: Dispatcher,
    pub chat: ChatService,
    pub jwt_secret: Arc<str>,
}

/// Per-connection state: `user_id` is set once `authenticate` succeeds.
#[derive(Debug)]
pub struct Session {
    pub conn_id: Uuid,
    pub user_id: Option<Uuid>,
}

/// Handle a single WebSocket connection until it closes.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut outbound) = ctx.dispatcher.connect().await;
    trace!("Connection {} opened", conn_id);

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = outbound.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode gateway event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_ctx = ctx.clone();
    let mut recv_task = tokio::spawn(async move {
        let mut session = Session { conn_id, user_id: None };
        let auth_deadline = tokio::time::sleep(AUTH_TIMEOUT);
        tokio::pin!(auth_deadline);

        loop {
            tokio::select! {
                msg = receiver.next() => {
                    let Some(Ok(msg)) = msg else { break };
                    match msg {
                        Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                            Ok(cmd) => handle_command(&recv_ctx, &mut session, cmd).await,
                            Err(e) => {
                                warn!(
                                    "Connection {} bad command: {} -- raw: {}",
                                    conn_id,
                                    e,
                                    text.chars().take(200).collect::<String>()
                                );
                                recv_ctx
                                    .dispatcher
                                    .send_to(conn_id, error_event("bad_command", e.to_string()))
                                    .await;
                            }
                        },
                        Message::Pong(_) => {
                            pong_flag_recv.store(true, Ordering::Release);
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
                _ = &mut auth_deadline, if session.user_id.is_none() => {
                    warn!("Connection {} failed to authenticate, closing", conn_id);
                    break;
                }
            }
        }

        session.user_id
    });

    // Wait for either task to finish
    let user_id = tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            None
        }
        result = &mut recv_task => {
            send_task.abort();
            result.ok().flatten()
        }
    };

    ctx.dispatcher.disconnect(conn_id).await;
    match user_id {
        Some(user_id) => info!("User {} disconnected from gateway ({})", user_id, conn_id),
        None => trace!("Connection {} closed", conn_id),
    }
}

/// Decode and validate a bearer token.
pub fn verify_token(token: &str, jwt_secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

fn error_event(code: &str, message: impl Into<String>) -> GatewayEvent {
    GatewayEvent::Error {
        code: code.to_string(),
        message: message.into(),
    }
}

fn chat_error_event(conn_id: Uuid, e: &ChatError) -> GatewayEvent {
    match e {
        ChatError::Storage(inner) => {
            error!("Connection {} command failed: {:#}", conn_id, inner);
            error_event(e.tag(), "internal error")
        }
        _ => error_event(e.tag(), e.to_string()),
    }
}

/// An echoed id in a command must name the authenticated user.
fn echo_matches(echo: Option<Uuid>, user_id: Uuid) -> bool {
    echo.is_none_or(|id| id == user_id)
}

/// Serve one command. Failures are reported to this connection only.
pub async fn handle_command(ctx: &GatewayContext, session: &mut Session, cmd: GatewayCommand) {
    let conn_id = session.conn_id;
    let dispatcher = &ctx.dispatcher;

    if let GatewayCommand::Authenticate { token } = &cmd {
        match verify_token(token, &ctx.jwt_secret) {
            Ok(claims) => {
                session.user_id = Some(claims.sub);
                dispatcher.authenticate(conn_id, claims.sub).await;
                info!("User {} authenticated on connection {}", claims.sub, conn_id);
            }
            Err(e) => {
                warn!("Connection {} sent a bad token: {}", conn_id, e);
                dispatcher
                    .send_to(conn_id, error_event("auth_error", "invalid or expired token"))
                    .await;
            }
        }
        return;
    }

    let Some(user_id) = session.user_id else {
        dispatcher
            .send_to(conn_id, error_event("not_authenticated", "authenticate first"))
            .await;
        return;
    };

    match cmd {
        GatewayCommand::Authenticate { .. } => {} // Handled above

        GatewayCommand::JoinRoom { room_id } => {
            dispatcher.join(conn_id, room_id).await;
            trace!("Connection {} joined room {}", conn_id, room_id);
        }

        GatewayCommand::LeaveRoom { room_id } => {
            dispatcher.leave(conn_id, room_id).await;
            trace!("Connection {} left room {}", conn_id, room_id);
        }

        GatewayCommand::SendMessage { room_id, sender_id, message } => {
            if !echo_matches(sender_id, user_id) {
                dispatcher
                    .send_to(conn_id, chat_error_event(conn_id, &ChatError::NotAuthorized))
                    .await;
                return;
            }

            match ctx.chat.append(user_id, room_id, message).await {
                Ok(message) => {
                    dispatcher
                        .broadcast_to_room(room_id, GatewayEvent::NewMessage(message), None)
                        .await;
                }
                Err(e) => dispatcher.send_to(conn_id, chat_error_event(conn_id, &e)).await,
            }
        }

        GatewayCommand::Typing { room_id, user_id: echo, is_typing } => {
            if !echo_matches(echo, user_id) {
                return;
            }
            dispatcher
                .broadcast_to_room(
                    room_id,
                    GatewayEvent::UserTyping { room_id, user_id, is_typing },
                    Some(conn_id),
                )
                .await;
        }

        GatewayCommand::MarkRead { room_id, user_id: echo } => {
            if !echo_matches(echo, user_id) {
                dispatcher
                    .send_to(conn_id, chat_error_event(conn_id, &ChatError::NotAuthorized))
                    .await;
                return;
            }

            match ctx.chat.mark_read(user_id, room_id).await {
                Ok(_) => {
                    dispatcher
                        .broadcast_to_room(room_id, GatewayEvent::MessagesRead { room_id, user_id }, None)
                        .await;
                }
                Err(e) => dispatcher.send_to(conn_id, chat_error_event(conn_id, &e)).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use raaya_chat::{Caller, ChatTarget};
    use raaya_db::Database;
    use raaya_types::models::Role;
    use tokio::sync::mpsc::UnboundedReceiver;

    const SECRET: &str = "test-secret";

    struct Client {
        session: Session,
        rx: UnboundedReceiver<GatewayEvent>,
    }

    fn context() -> GatewayContext {
        GatewayContext {
            dispatcher: Dispatcher::new(),
            chat: ChatService::new(Arc::new(Database::open_in_memory().unwrap())),
            jwt_secret: Arc::from(SECRET),
        }
    }

    fn register(ctx: &GatewayContext, role: Role) -> Caller {
        let id = Uuid::new_v4();
        ctx.chat
            .db()
            .create_user(&id.to_string(), &format!("{}@example.com", id), "hash", role.as_str(), chrono::Utc::now())
            .unwrap();
        Caller { id, role }
    }

    fn token_for(caller: Caller) -> String {
        let claims = Claims {
            sub: caller.id,
            role: caller.role,
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    async fn connect_as(ctx: &GatewayContext, caller: Caller) -> Client {
        let (conn_id, rx) = ctx.dispatcher.connect().await;
        let mut client = Client {
            session: Session { conn_id, user_id: None },
            rx,
        };
        handle_command(ctx, &mut client.session, GatewayCommand::Authenticate { token: token_for(caller) }).await;
        assert!(matches!(client.rx.try_recv(), Ok(GatewayEvent::Authenticated { .. })));
        client
    }

    #[tokio::test]
    async fn commands_before_authentication_are_refused() {
        let ctx = context();
        let (conn_id, mut rx) = ctx.dispatcher.connect().await;
        let mut session = Session { conn_id, user_id: None };

        handle_command(&ctx, &mut session, GatewayCommand::JoinRoom { room_id: Uuid::new_v4() }).await;
        match rx.try_recv().unwrap() {
            GatewayEvent::Error { code, .. } => assert_eq!(code, "not_authenticated"),
            other => panic!("unexpected event {:?}", other),
        }

        handle_command(&ctx, &mut session, GatewayCommand::Authenticate { token: "garbage".into() }).await;
        match rx.try_recv().unwrap() {
            GatewayEvent::Error { code, .. } => assert_eq!(code, "auth_error"),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(session.user_id.is_none());
    }

    #[tokio::test]
    async fn sent_message_is_persisted_and_echoed_to_the_room() {
        let ctx = context();
        let a = register(&ctx, Role::Artist);
        let b = register(&ctx, Role::Artist);
        let room = ctx.chat.resolve_or_create(a, ChatTarget::OtherArtist(b.id)).await.unwrap();

        let mut client_a = connect_as(&ctx, a).await;
        let mut client_b = connect_as(&ctx, b).await;
        for client in [&mut client_a, &mut client_b] {
            handle_command(&ctx, &mut client.session, GatewayCommand::JoinRoom { room_id: room.id }).await;
        }

        let send = GatewayCommand::SendMessage {
            room_id: room.id,
            sender_id: Some(a.id),
            message: "soundcheck at 6".into(),
        };
        handle_command(&ctx, &mut client_a.session, send).await;

        for client in [&mut client_a, &mut client_b] {
            match client.rx.try_recv().unwrap() {
                GatewayEvent::NewMessage(message) => {
                    assert_eq!(message.message, "soundcheck at 6");
                    assert_eq!(message.sender_id, a.id);
                }
                other => panic!("unexpected event {:?}", other),
            }
        }

        let stored = ctx.chat.list(b.id, room.id).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn outsider_send_is_rejected_without_broadcast() {
        let ctx = context();
        let a = register(&ctx, Role::Artist);
        let b = register(&ctx, Role::Artist);
        let outsider = register(&ctx, Role::Venue);
        let room = ctx.chat.resolve_or_create(a, ChatTarget::OtherArtist(b.id)).await.unwrap();

        let mut client_a = connect_as(&ctx, a).await;
        let mut client_x = connect_as(&ctx, outsider).await;
        handle_command(&ctx, &mut client_a.session, GatewayCommand::JoinRoom { room_id: room.id }).await;
        // Joining is pure membership and is allowed.
        handle_command(&ctx, &mut client_x.session, GatewayCommand::JoinRoom { room_id: room.id }).await;

        let send = GatewayCommand::SendMessage { room_id: room.id, sender_id: None, message: "hi".into() };
        handle_command(&ctx, &mut client_x.session, send).await;

        match client_x.rx.try_recv().unwrap() {
            GatewayEvent::Error { code, .. } => assert_eq!(code, "not_authorized"),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(client_a.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn typing_skips_the_typist() {
        let ctx = context();
        let a = register(&ctx, Role::Artist);
        let b = register(&ctx, Role::Artist);
        let room_id = Uuid::new_v4();

        let mut client_a = connect_as(&ctx, a).await;
        let mut client_b = connect_as(&ctx, b).await;
        for client in [&mut client_a, &mut client_b] {
            handle_command(&ctx, &mut client.session, GatewayCommand::JoinRoom { room_id }).await;
        }

        let typing = GatewayCommand::Typing { room_id, user_id: Some(a.id), is_typing: true };
        handle_command(&ctx, &mut client_a.session, typing).await;

        assert!(client_a.rx.try_recv().is_err());
        match client_b.rx.try_recv().unwrap() {
            GatewayEvent::UserTyping { user_id, is_typing, .. } => {
                assert_eq!(user_id, a.id);
                assert!(is_typing);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn mark_read_updates_store_and_notifies_room() {
        let ctx = context();
        let a = register(&ctx, Role::Artist);
        let b = register(&ctx, Role::Artist);
        let room = ctx.chat.resolve_or_create(a, ChatTarget::OtherArtist(b.id)).await.unwrap();
        ctx.chat.append(a.id, room.id, "ping".into()).await.unwrap();

        let mut client_a = connect_as(&ctx, a).await;
        let mut client_b = connect_as(&ctx, b).await;
        for client in [&mut client_a, &mut client_b] {
            handle_command(&ctx, &mut client.session, GatewayCommand::JoinRoom { room_id: room.id }).await;
        }

        handle_command(&ctx, &mut client_b.session, GatewayCommand::MarkRead { room_id: room.id, user_id: None }).await;

        for client in [&mut client_a, &mut client_b] {
            assert!(matches!(
                client.rx.try_recv(),
                Ok(GatewayEvent::MessagesRead { user_id, .. }) if user_id == b.id
            ));
        }

        let messages = ctx.chat.list(a.id, room.id).await.unwrap();
        assert!(messages[0].is_read);
    }
}
