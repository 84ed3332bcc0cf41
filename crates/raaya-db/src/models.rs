//! Database row types — these map directly to SQLite rows.
//! Distinct from raaya-types models to keep the DB layer independent;
//! `into_*` converts a row once it leaves the database.
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use uuid::Uuid;

use raaya_types::models::{
    ChatMessage, ChatRoom, ChatType, ChatVisibility, ProfileSummary, ProviderType, Role,
    RoomTopology, User,
};

/// Current time at the precision timestamps are stored with, so a value
/// handed back to a caller compares equal to the one read later.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("bad timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("bad id '{}'", raw))
}

fn required_id(raw: Option<&String>, column: &str, room_id: &str) -> Result<Uuid> {
    let raw = raw.ok_or_else(|| anyhow!("room {} has no {}", room_id, column))?;
    parse_id(raw)
}

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub chat_settings: String,
    pub created_at: String,
}

impl UserRow {
    pub fn role(&self) -> Result<Role> {
        Ok(self.role.parse()?)
    }

    pub fn chat_settings(&self) -> ChatVisibility {
        self.chat_settings.parse().unwrap_or_default()
    }

    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: parse_id(&self.id)?,
            role: self.role()?,
            chat_settings: self.chat_settings(),
            created_at: parse_ts(&self.created_at)?,
            email: self.email,
        })
    }
}

pub struct ProfileRow {
    pub user_id: String,
    pub role: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub city: Option<String>,
    pub updated_at: String,
}

impl ProfileRow {
    pub fn into_summary(self) -> Result<ProfileSummary> {
        Ok(ProfileSummary {
            user_id: parse_id(&self.user_id)?,
            role: self.role.parse()?,
            display_name: self.display_name,
            avatar_url: self.avatar_url,
            city: self.city,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

pub struct ChatRoomRow {
    pub id: String,
    pub chat_type: String,
    pub venue_user_id: Option<String>,
    pub provider_user_id: Option<String>,
    pub provider_type: Option<String>,
    pub participant1_id: Option<String>,
    pub participant2_id: Option<String>,
    pub created_at: String,
    pub last_message_at: Option<String>,
}

impl ChatRoomRow {
    pub fn into_room(self) -> Result<ChatRoom> {
        let chat_type: ChatType = self.chat_type.parse()?;

        let topology = if chat_type.is_peer() {
            RoomTopology::PeerPair {
                participant1_id: required_id(self.participant1_id.as_ref(), "participant1_id", &self.id)?,
                participant2_id: required_id(self.participant2_id.as_ref(), "participant2_id", &self.id)?,
            }
        } else {
            let provider_type: ProviderType = self
                .provider_type
                .as_deref()
                .ok_or_else(|| anyhow!("room {} has no provider_type", self.id))?
                .parse()?;
            RoomTopology::HostedPair {
                venue_user_id: required_id(self.venue_user_id.as_ref(), "venue_user_id", &self.id)?,
                provider_user_id: required_id(self.provider_user_id.as_ref(), "provider_user_id", &self.id)?,
                provider_type,
            }
        };

        Ok(ChatRoom {
            id: parse_id(&self.id)?,
            chat_type,
            topology,
            created_at: parse_ts(&self.created_at)?,
            last_message_at: self.last_message_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

pub struct MessageRow {
    pub id: String,
    pub chat_room_id: String,
    pub sender_id: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_message(self) -> Result<ChatMessage> {
        Ok(ChatMessage {
            id: parse_id(&self.id)?,
            chat_room_id: parse_id(&self.chat_room_id)?,
            sender_id: parse_id(&self.sender_id)?,
            message: self.message,
            is_read: self.is_read,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}
