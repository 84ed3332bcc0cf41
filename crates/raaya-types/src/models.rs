use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Returned when a stored or submitted string is not a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Account role carried in every bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Artist,
    Partner,
    Venue,
    Admin,
}

string_enum!(Role, "role", {
    Artist => "artist",
    Partner => "partner",
    Venue => "venue",
    Admin => "admin",
});

/// The side of a hosted chat that offers a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Artist,
    Partner,
}

string_enum!(ProviderType, "provider type", {
    Artist => "artist",
    Partner => "partner",
});

impl ProviderType {
    pub fn role(&self) -> Role {
        match self {
            Self::Artist => Role::Artist,
            Self::Partner => Role::Partner,
        }
    }
}

/// Who may open a chat with a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatVisibility {
    #[default]
    All,
    PartnersOnly,
    Off,
}

string_enum!(ChatVisibility, "chat visibility", {
    All => "all",
    PartnersOnly => "partners_only",
    Off => "off",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    VenueArtist,
    VenuePartner,
    ArtistArtist,
    PartnerPartner,
    CrossType,
}

string_enum!(ChatType, "chat type", {
    VenueArtist => "venue_artist",
    VenuePartner => "venue_partner",
    ArtistArtist => "artist_artist",
    PartnerPartner => "partner_partner",
    CrossType => "cross_type",
});

impl ChatType {
    pub fn is_peer(&self) -> bool {
        matches!(self, Self::ArtistArtist | Self::PartnerPartner)
    }

    /// Uniqueness class: one room per unordered pair within a family.
    /// All hosted chat types share the `hosted` family.
    pub fn family(&self) -> &'static str {
        match self {
            Self::ArtistArtist => "artist_artist",
            Self::PartnerPartner => "partner_partner",
            Self::VenueArtist | Self::VenuePartner | Self::CrossType => "hosted",
        }
    }
}

/// The two endpoints of a room. Which shape applies follows from `chat_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoomTopology {
    PeerPair {
        participant1_id: Uuid,
        participant2_id: Uuid,
    },
    HostedPair {
        venue_user_id: Uuid,
        provider_user_id: Uuid,
        provider_type: ProviderType,
    },
}

impl RoomTopology {
    pub fn parties(&self) -> (Uuid, Uuid) {
        match self {
            Self::PeerPair { participant1_id, participant2_id } => (*participant1_id, *participant2_id),
            Self::HostedPair { venue_user_id, provider_user_id, .. } => (*venue_user_id, *provider_user_id),
        }
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        let (a, b) = self.parties();
        a == user_id || b == user_id
    }

    /// Order-independent key for the pair, e.g. `"<min>:<max>"`.
    pub fn pair_key(&self) -> String {
        let (a, b) = self.parties();
        pair_key(a, b)
    }
}

pub fn pair_key(a: Uuid, b: Uuid) -> String {
    if a <= b {
        format!("{}:{}", a, b)
    } else {
        format!("{}:{}", b, a)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: Uuid,
    pub chat_type: ChatType,
    #[serde(flatten)]
    pub topology: RoomTopology,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_room_id: Uuid,
    pub sender_id: Uuid,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Display data for one role of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub user_id: Uuid,
    pub role: Role,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub city: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub chat_settings: ChatVisibility,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_ignores_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(pair_key(a, b), pair_key(b, a));
    }

    #[test]
    fn hosted_types_share_a_family() {
        assert_eq!(ChatType::VenueArtist.family(), ChatType::CrossType.family());
        assert_eq!(ChatType::VenuePartner.family(), "hosted");
        assert_ne!(ChatType::ArtistArtist.family(), ChatType::PartnerPartner.family());
    }

    #[test]
    fn room_serializes_flat() {
        let room = ChatRoom {
            id: Uuid::new_v4(),
            chat_type: ChatType::VenuePartner,
            topology: RoomTopology::HostedPair {
                venue_user_id: Uuid::new_v4(),
                provider_user_id: Uuid::new_v4(),
                provider_type: ProviderType::Partner,
            },
            created_at: Utc::now(),
            last_message_at: None,
        };

        let json = serde_json::to_value(&room).unwrap();
        assert_eq!(json["chat_type"], "venue_partner");
        assert_eq!(json["provider_type"], "partner");
        assert!(json.get("venue_user_id").is_some());
        assert!(json.get("participant1_id").is_none());
    }

    #[test]
    fn unknown_visibility_is_rejected() {
        assert_eq!("partners_only".parse::<ChatVisibility>(), Ok(ChatVisibility::PartnersOnly));
        assert!("friends".parse::<ChatVisibility>().is_err());
    }
}
