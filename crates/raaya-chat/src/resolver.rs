use tracing::{info, warn};
use uuid::Uuid;

use raaya_db::Database;
use raaya_types::api::{AdminChatView, CreateRoomRequest, RoomParty, RoomSummary};
use raaya_types::models::{ChatRoom, ChatType, ChatVisibility, ProviderType, Role, RoomTopology};

use crate::{Caller, ChatError, ChatService};

/// The counterpart a requester wants to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatTarget {
    OtherArtist(Uuid),
    OtherPartner(Uuid),
    Provider {
        provider_user_id: Uuid,
        provider_type: ProviderType,
    },
}

impl ChatTarget {
    /// Pick the target from a room request. Peer fields only count for the
    /// matching role; the generic provider pairing is open to every role.
    pub fn from_request(role: Role, req: &CreateRoomRequest) -> Result<Self, ChatError> {
        if role == Role::Artist {
            if let Some(id) = req.other_artist_id {
                return Ok(Self::OtherArtist(id));
            }
        }

        if role == Role::Partner {
            if let Some(id) = req.other_partner_id {
                return Ok(Self::OtherPartner(id));
            }
        }

        if let (Some(provider_user_id), Some(provider_type)) =
            (req.provider_user_id, req.provider_type.as_deref())
        {
            let provider_type = provider_type.parse().map_err(|_| {
                ChatError::InvalidChatRequest(format!("unknown provider_type '{}'", provider_type))
            })?;
            return Ok(Self::Provider {
                provider_user_id,
                provider_type,
            });
        }

        Err(ChatError::InvalidChatRequest(format!(
            "no chat target recognised for role {}",
            role
        )))
    }

    pub fn counterpart(&self) -> Uuid {
        match self {
            Self::OtherArtist(id) | Self::OtherPartner(id) => *id,
            Self::Provider { provider_user_id, .. } => *provider_user_id,
        }
    }
}

/// Whether `caller_id` is one of the room's two parties.
pub fn authorize(caller_id: Uuid, room: &ChatRoom) -> bool {
    match &room.topology {
        RoomTopology::PeerPair { participant1_id, participant2_id } => {
            caller_id == *participant1_id || caller_id == *participant2_id
        }
        RoomTopology::HostedPair { venue_user_id, provider_user_id, .. } => {
            caller_id == *venue_user_id || caller_id == *provider_user_id
        }
    }
}

/// Load a room or fail with `NotFound`.
pub(crate) fn load_room(db: &Database, room_id: Uuid) -> Result<ChatRoom, ChatError> {
    let row = db
        .get_room(&room_id.to_string())?
        .ok_or(ChatError::NotFound("chat room"))?;
    Ok(row.into_room()?)
}

fn counterpart_visibility(db: &Database, user_id: Uuid) -> Result<Option<ChatVisibility>, ChatError> {
    Ok(db
        .get_user_by_id(&user_id.to_string())?
        .map(|user| user.chat_settings()))
}

/// Shape of the room a target produces: chat type plus endpoints.
/// Also applies the counterpart's visibility preference.
fn plan_room(db: &Database, caller: Caller, target: ChatTarget) -> Result<(ChatType, RoomTopology), ChatError> {
    match target {
        ChatTarget::OtherArtist(other) => Ok((
            ChatType::ArtistArtist,
            RoomTopology::PeerPair {
                participant1_id: caller.id,
                participant2_id: other,
            },
        )),

        ChatTarget::OtherPartner(other) => {
            // The requester is a partner, so partners_only passes.
            if counterpart_visibility(db, other)? == Some(ChatVisibility::Off) {
                return Err(ChatError::ChatDisabled);
            }
            Ok((
                ChatType::PartnerPartner,
                RoomTopology::PeerPair {
                    participant1_id: caller.id,
                    participant2_id: other,
                },
            ))
        }

        ChatTarget::Provider { provider_user_id, provider_type } => {
            match counterpart_visibility(db, provider_user_id)?.ok_or(ChatError::NotFound("user"))? {
                ChatVisibility::Off => return Err(ChatError::ChatDisabled),
                ChatVisibility::PartnersOnly if caller.role != Role::Partner => {
                    return Err(ChatError::ChatRestricted);
                }
                _ => {}
            }

            let chat_type = match (caller.role, provider_type) {
                (Role::Venue, ProviderType::Artist) => ChatType::VenueArtist,
                (Role::Venue, ProviderType::Partner) => ChatType::VenuePartner,
                _ => ChatType::CrossType,
            };
            Ok((
                chat_type,
                RoomTopology::HostedPair {
                    venue_user_id: caller.id,
                    provider_user_id,
                    provider_type,
                },
            ))
        }
    }
}

/// Display data for both parties of a room.
pub(crate) fn room_parties(db: &Database, room: &ChatRoom) -> anyhow::Result<Vec<RoomParty>> {
    let roles: [(Uuid, Option<Role>); 2] = match &room.topology {
        RoomTopology::PeerPair { participant1_id, participant2_id } => {
            let role = if room.chat_type == ChatType::PartnerPartner {
                Role::Partner
            } else {
                Role::Artist
            };
            [(*participant1_id, Some(role)), (*participant2_id, Some(role))]
        }
        RoomTopology::HostedPair { venue_user_id, provider_user_id, provider_type } => {
            // The initiator of a cross-type chat is an artist or partner,
            // so its role comes from the account itself.
            let initiator_role = match db.get_user_by_id(&venue_user_id.to_string())? {
                Some(user) => Some(user.role()?),
                None => None,
            };
            [(*venue_user_id, initiator_role), (*provider_user_id, Some(provider_type.role()))]
        }
    };

    let mut parties = Vec::with_capacity(2);
    for (user_id, role) in roles {
        let profile = match role {
            Some(role) => db
                .get_profile(&user_id.to_string(), role.as_str())?
                .map(|row| row.into_summary())
                .transpose()?,
            None => None,
        };
        parties.push(RoomParty { user_id, role, profile });
    }
    Ok(parties)
}

impl ChatService {
    /// Return the room for the caller and target, creating it on first contact.
    /// Lookups are order-independent, so whichever party asks second gets the
    /// same room back.
    pub async fn resolve_or_create(&self, caller: Caller, target: ChatTarget) -> Result<ChatRoom, ChatError> {
        if target.counterpart() == caller.id {
            return Err(ChatError::InvalidChatRequest("cannot open a chat with yourself".into()));
        }

        let (room, created) = self
            .blocking(move |db| {
                let (chat_type, topology) = plan_room(db, caller, target)?;
                let family = chat_type.family();
                let key = topology.pair_key();

                if let Some(existing) = db.find_room_by_pair(family, &key)? {
                    return Ok((existing.into_room()?, false));
                }

                let room = ChatRoom {
                    id: Uuid::new_v4(),
                    chat_type,
                    topology,
                    created_at: raaya_db::models::now(),
                    last_message_at: None,
                };

                if db.insert_room(&room)? {
                    return Ok((room, true));
                }

                // Lost a race with the other party's first contact.
                let winner = db
                    .find_room_by_pair(family, &key)?
                    .ok_or_else(|| anyhow::anyhow!("room for pair {} vanished after conflict", key))?;
                Ok((winner.into_room()?, false))
            })
            .await?;

        if created {
            let (a, b) = room.topology.parties();
            info!("Created {} room {} for {} and {}", room.chat_type, room.id, a, b);
        }
        Ok(room)
    }

    pub async fn get_room(&self, room_id: Uuid) -> Result<ChatRoom, ChatError> {
        self.blocking(move |db| load_room(db, room_id)).await
    }

    /// Every room the caller is a party to, most recently active first,
    /// with both parties' profiles and the latest message.
    pub async fn rooms_for(&self, caller: Caller) -> Result<Vec<RoomSummary>, ChatError> {
        self.blocking(move |db| {
            let rows = db.get_rooms_for_user(&caller.id.to_string())?;
            let mut summaries = Vec::with_capacity(rows.len());

            for row in rows {
                let room = match row.into_room() {
                    Ok(room) => room,
                    Err(e) => {
                        warn!("Skipping corrupt chat room: {}", e);
                        continue;
                    }
                };

                let parties = room_parties(db, &room)?;
                let last_message = db
                    .get_last_message(&room.id.to_string())?
                    .map(|row| row.into_message())
                    .transpose()?;

                summaries.push(RoomSummary { room, parties, last_message });
            }

            Ok(summaries)
        })
        .await
    }

    /// Moderation view of every room with its full history.
    pub async fn admin_chats(&self, caller: Caller) -> Result<Vec<AdminChatView>, ChatError> {
        if caller.role != Role::Admin {
            return Err(ChatError::NotAuthorized);
        }

        self.blocking(|db| {
            let mut views = Vec::new();
            for row in db.get_all_rooms()? {
                let room = row.into_room()?;
                let parties = room_parties(db, &room)?;
                let messages = db
                    .get_messages(&room.id.to_string())?
                    .into_iter()
                    .map(|row| row.into_message())
                    .collect::<anyhow::Result<Vec<_>>>()?;
                views.push(AdminChatView { room, parties, messages });
            }
            Ok(views)
        })
        .await
    }
}
