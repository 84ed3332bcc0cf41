use axum::{
    Extension, Json,
    extract::State,
};
use serde::Deserialize;
use uuid::Uuid;

use raaya_types::api::{ChatSettingsBody, Claims, UpdateProfileRequest};
use raaya_types::models::{ChatVisibility, ProfileSummary, Role};

use crate::extract::{ApiJson, ApiPath};
use crate::{ApiError, AppState, db_call};

/// Create or replace the caller's profile for the role they are signed in as.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<Json<ProfileSummary>, ApiError> {
    let display_name = req.display_name.trim().to_string();
    if display_name.is_empty() || display_name.chars().count() > 100 {
        return Err(ApiError::BadRequest("display_name must be 1-100 characters".into()));
    }

    let user_id = claims.sub.to_string();
    let role = claims.role;
    let profile = db_call(&state, move |db| {
        db.upsert_profile(
            &user_id,
            role.as_str(),
            &display_name,
            req.avatar_url.as_deref(),
            req.city.as_deref(),
            raaya_db::models::now(),
        )?;
        db.get_profile(&user_id, role.as_str())?
            .ok_or_else(|| anyhow::anyhow!("profile for {} vanished after upsert", user_id))?
            .into_summary()
    })
    .await?;

    Ok(Json(profile))
}

pub async fn get_profiles(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> Result<Json<Vec<ProfileSummary>>, ApiError> {
    let id = user_id.to_string();
    let profiles = db_call(&state, move |db| {
        if db.get_user_by_id(&id)?.is_none() {
            return Ok(None);
        }
        db.get_profiles_for_user(&id)?
            .into_iter()
            .map(|row| row.into_summary())
            .collect::<anyhow::Result<Vec<_>>>()
            .map(Some)
    })
    .await?
    .ok_or(ApiError::NotFound("user"))?;

    Ok(Json(profiles))
}

pub async fn get_chat_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ChatSettingsBody>, ApiError> {
    let user_id = claims.sub.to_string();
    let user = db_call(&state, move |db| db.get_user_by_id(&user_id))
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    Ok(Json(ChatSettingsBody {
        chat_settings: user.chat_settings(),
    }))
}

/// Raw body so an unknown visibility value is a 400 with our own error
/// body rather than a JSON rejection.
#[derive(Debug, Deserialize)]
pub struct ChatSettingsUpdate {
    pub chat_settings: String,
}

/// Only partners control who may open a chat with them.
pub async fn update_chat_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<ChatSettingsUpdate>,
) -> Result<Json<ChatSettingsBody>, ApiError> {
    if claims.role != Role::Partner {
        return Err(ApiError::Forbidden("only partners can change chat settings".into()));
    }

    let chat_settings: ChatVisibility = req
        .chat_settings
        .parse()
        .map_err(|_| ApiError::BadRequest("chat_settings must be one of: all, partners_only, off".into()))?;

    let user_id = claims.sub.to_string();
    let updated = db_call(&state, move |db| db.set_chat_settings(&user_id, chat_settings.as_str())).await?;
    if !updated {
        return Err(ApiError::NotFound("user"));
    }

    Ok(Json(ChatSettingsBody { chat_settings }))
}
