use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use raaya_api::{AppState, AppStateInner, routes};
use raaya_gateway::connection::{self, GatewayContext};
use raaya_gateway::dispatcher::Dispatcher;

/// Placeholder JWT secrets that MUST NOT be used outside development.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "raaya=debug,raaya_api=debug,raaya_gateway=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let allow_dev_secret = std::env::var("RAAYA_ALLOW_DEV_SECRET").is_ok_and(|v| v == "1");
    let jwt_secret = match std::env::var("RAAYA_JWT_SECRET") {
        Ok(secret) if !secret.is_empty() && !PLACEHOLDER_SECRETS.contains(&secret.as_str()) => secret,
        _ if allow_dev_secret => {
            warn!("RAAYA_JWT_SECRET is unset or a placeholder; using the development secret");
            PLACEHOLDER_SECRETS[1].to_string()
        }
        _ => {
            eprintln!("FATAL: RAAYA_JWT_SECRET is unset or still a placeholder.");
            eprintln!("       Set it in your .env file and restart,");
            eprintln!("       or set RAAYA_ALLOW_DEV_SECRET=1 for local development.");
            std::process::exit(1);
        }
    };
    let db_path = std::env::var("RAAYA_DB_PATH").unwrap_or_else(|_| "raaya.db".into());
    let host = std::env::var("RAAYA_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("RAAYA_PORT")
        .unwrap_or_else(|_| "8001".into())
        .parse()?;
    let token_ttl_days: i64 = std::env::var("RAAYA_TOKEN_TTL_DAYS")
        .unwrap_or_else(|_| "30".into())
        .parse()?;

    // Init database
    let db = Arc::new(raaya_db::Database::open(&PathBuf::from(&db_path))?);
    info!("Database ready at {}", db_path);

    // Shared state
    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner::new(db, dispatcher, jwt_secret, token_ttl_days));

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(app_state.clone());

    let app = Router::new()
        .merge(routes::router(app_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Raaya server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let ctx = GatewayContext {
        dispatcher: state.dispatcher.clone(),
        chat: state.chat.clone(),
        jwt_secret: Arc::from(state.jwt_secret.as_str()),
    };
    ws.on_upgrade(move |socket| connection::handle_connection(socket, ctx))
}
