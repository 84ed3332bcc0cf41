use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use raaya_chat::ChatService;
use raaya_db::Database;
use raaya_gateway::dispatcher::Dispatcher;
use raaya_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};
use raaya_types::models::{Role, User};

use crate::extract::ApiJson;
use crate::{ApiError, db_call};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub chat: ChatService,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, jwt_secret: String, token_ttl_days: i64) -> Self {
        Self {
            chat: ChatService::new(db.clone()),
            db,
            dispatcher,
            jwt_secret,
            token_ttl_days,
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    if email.len() < 3 || email.len() > 254 || !email.contains('@') {
        return Err(ApiError::BadRequest("invalid email address".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("password must be at least 8 characters".into()));
    }
    let display_name = match req.display_name.as_deref().map(str::trim) {
        Some("") => return Err(ApiError::BadRequest("display_name must not be empty".into())),
        other => other.map(str::to_string),
    };

    let lookup = email.clone();
    if db_call(&state, move |db| db.get_user_by_email(&lookup)).await?.is_some() {
        return Err(ApiError::Conflict("email already registered".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))?
        .to_string();

    let user_id = Uuid::new_v4();
    let role = req.role;

    db_call(&state, move |db| {
        let now = raaya_db::models::now();
        db.create_user(&user_id.to_string(), &email, &password_hash, role.as_str(), now)?;
        if let Some(name) = display_name {
            db.upsert_profile(&user_id.to_string(), role.as_str(), &name, None, None, now)?;
        }
        Ok(())
    })
    .await?;

    info!("Registered {} user {}", role, user_id);

    let token = create_token(&state, user_id, role)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { user_id, role, token })))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    let user = db_call(&state, move |db| db.get_user_by_email(&email))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash for {} unreadable: {}", user.id, e)))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user_id: Uuid = user.id.parse().map_err(|e| ApiError::Internal(anyhow::anyhow!("bad user id: {}", e)))?;
    let role = user.role()?;

    let token = create_token(&state, user_id, role)?;
    Ok(Json(AuthResponse { user_id, role, token }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, ApiError> {
    let user_id = claims.sub.to_string();
    let user = db_call(&state, move |db| db.get_user_by_id(&user_id))
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    Ok(Json(user.into_user()?))
}

pub(crate) fn create_token(state: &AppStateInner, user_id: Uuid, role: Role) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id,
        role,
        exp: (chrono::Utc::now() + chrono::Duration::days(state.token_ttl_days)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(e.into()))
}
