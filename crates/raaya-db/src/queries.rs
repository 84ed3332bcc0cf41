use crate::Database;
use crate::models::{ChatRoomRow, MessageRow, ProfileRow, UserRow, format_ts};
use anyhow::Result;
use chrono::{DateTime, Utc};
use raaya_types::models::{ChatMessage, ChatRoom, RoomTopology};
use rusqlite::{Connection, Row};

const ROOM_COLUMNS: &str = "id, chat_type, venue_user_id, provider_user_id, provider_type,
     participant1_id, participant2_id, created_at, last_message_at";

const MESSAGE_COLUMNS: &str = "id, chat_room_id, sender_id, message, is_read, created_at";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        role: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, role, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, email, password_hash, role, format_ts(created_at)),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Returns false when no such user exists.
    pub fn set_chat_settings(&self, user_id: &str, chat_settings: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET chat_settings = ?1 WHERE id = ?2",
                (chat_settings, user_id),
            )?;
            Ok(changed > 0)
        })
    }

    // -- Profiles --

    pub fn upsert_profile(
        &self,
        user_id: &str,
        role: &str,
        display_name: &str,
        avatar_url: Option<&str>,
        city: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO profiles (user_id, role, display_name, avatar_url, city, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id, role) DO UPDATE SET
                    display_name = excluded.display_name,
                    avatar_url = excluded.avatar_url,
                    city = excluded.city,
                    updated_at = excluded.updated_at",
                rusqlite::params![user_id, role, display_name, avatar_url, city, format_ts(updated_at)],
            )?;
            Ok(())
        })
    }

    pub fn get_profile(&self, user_id: &str, role: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_id, role, display_name, avatar_url, city, updated_at
                 FROM profiles WHERE user_id = ?1 AND role = ?2",
                (user_id, role),
                profile_from_row,
            )
            .optional()
        })
    }

    pub fn get_profiles_for_user(&self, user_id: &str) -> Result<Vec<ProfileRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, role, display_name, avatar_url, city, updated_at
                 FROM profiles WHERE user_id = ?1 ORDER BY role",
            )?;
            let rows = stmt
                .query_map([user_id], profile_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Chat rooms --

    /// Find the room for an unordered pair within a family. The stored
    /// `pair_key` is order-independent, so either party's lookup hits it.
    pub fn find_room_by_pair(&self, family: &str, pair_key: &str) -> Result<Option<ChatRoomRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM chat_rooms WHERE family = ?1 AND pair_key = ?2", ROOM_COLUMNS),
                (family, pair_key),
                room_from_row,
            )
            .optional()
        })
    }

    /// Insert a room. Returns false if a room for the same pair and family
    /// already exists, in which case nothing is written.
    pub fn insert_room(&self, room: &ChatRoom) -> Result<bool> {
        let (venue, provider, provider_type, p1, p2) = match &room.topology {
            RoomTopology::PeerPair { participant1_id, participant2_id } => (
                None,
                None,
                None,
                Some(participant1_id.to_string()),
                Some(participant2_id.to_string()),
            ),
            RoomTopology::HostedPair { venue_user_id, provider_user_id, provider_type } => (
                Some(venue_user_id.to_string()),
                Some(provider_user_id.to_string()),
                Some(provider_type.as_str()),
                None,
                None,
            ),
        };

        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO chat_rooms
                    (id, chat_type, family, pair_key, venue_user_id, provider_user_id, provider_type,
                     participant1_id, participant2_id, created_at, last_message_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    room.id.to_string(),
                    room.chat_type.as_str(),
                    room.chat_type.family(),
                    room.topology.pair_key(),
                    venue,
                    provider,
                    provider_type,
                    p1,
                    p2,
                    format_ts(room.created_at),
                    room.last_message_at.map(format_ts),
                ],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn get_room(&self, id: &str) -> Result<Option<ChatRoomRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM chat_rooms WHERE id = ?1", ROOM_COLUMNS),
                [id],
                room_from_row,
            )
            .optional()
        })
    }

    /// Every room the user is a party to, in any position.
    pub fn get_rooms_for_user(&self, user_id: &str) -> Result<Vec<ChatRoomRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM chat_rooms
                 WHERE venue_user_id = ?1 OR provider_user_id = ?1
                    OR participant1_id = ?1 OR participant2_id = ?1
                 ORDER BY COALESCE(last_message_at, created_at) DESC",
                ROOM_COLUMNS
            ))?;
            let rows = stmt
                .query_map([user_id], room_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_all_rooms(&self) -> Result<Vec<ChatRoomRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM chat_rooms ORDER BY created_at",
                ROOM_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], room_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn touch_room(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE chat_rooms SET last_message_at = ?1 WHERE id = ?2",
                (format_ts(at), id),
            )?;
            Ok(())
        })
    }

    // -- Messages --

    pub fn insert_message(&self, message: &ChatMessage) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, chat_room_id, sender_id, message, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    message.id.to_string(),
                    message.chat_room_id.to_string(),
                    message.sender_id.to_string(),
                    message.message,
                    message.is_read,
                    format_ts(message.created_at),
                ],
            )?;
            Ok(())
        })
    }

    /// All messages of a room, oldest first; ties on `created_at` keep
    /// insertion order.
    pub fn get_messages(&self, room_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM messages WHERE chat_room_id = ?1 ORDER BY created_at ASC, seq ASC",
                MESSAGE_COLUMNS
            ))?;
            let rows = stmt
                .query_map([room_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_last_message(&self, room_id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM messages WHERE chat_room_id = ?1
                     ORDER BY created_at DESC, seq DESC LIMIT 1",
                    MESSAGE_COLUMNS
                ),
                [room_id],
                message_from_row,
            )
            .optional()
        })
    }

    /// Mark every message in the room not sent by `reader_id` as read.
    /// Returns the number of messages that flipped.
    pub fn mark_read(&self, room_id: &str, reader_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE chat_room_id = ?1 AND sender_id != ?2 AND is_read = 0",
                (room_id, reader_id),
            )?;
            Ok(changed)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, email, password, role, chat_settings, created_at FROM users WHERE {} = ?1",
        column
    ))?;

    stmt.query_row([value], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            email: row.get(1)?,
            password: row.get(2)?,
            role: row.get(3)?,
            chat_settings: row.get(4)?,
            created_at: row.get(5)?,
        })
    })
    .optional()
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        user_id: row.get(0)?,
        role: row.get(1)?,
        display_name: row.get(2)?,
        avatar_url: row.get(3)?,
        city: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn room_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRoomRow> {
    Ok(ChatRoomRow {
        id: row.get(0)?,
        chat_type: row.get(1)?,
        venue_user_id: row.get(2)?,
        provider_user_id: row.get(3)?,
        provider_type: row.get(4)?,
        participant1_id: row.get(5)?,
        participant2_id: row.get(6)?,
        created_at: row.get(7)?,
        last_message_at: row.get(8)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        chat_room_id: row.get(1)?,
        sender_id: row.get(2)?,
        message: row.get(3)?,
        is_read: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use raaya_types::models::{ChatType, ProviderType};
    use uuid::Uuid;

    fn db_with_users(n: usize) -> (Database, Vec<Uuid>) {
        let db = Database::open_in_memory().unwrap();
        let ids: Vec<Uuid> = (0..n).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            db.create_user(&id.to_string(), &format!("u{}@example.com", i), "hash", "artist", Utc::now())
                .unwrap();
        }
        (db, ids)
    }

    fn peer_room(a: Uuid, b: Uuid) -> ChatRoom {
        ChatRoom {
            id: Uuid::new_v4(),
            chat_type: ChatType::ArtistArtist,
            topology: RoomTopology::PeerPair { participant1_id: a, participant2_id: b },
            created_at: Utc::now(),
            last_message_at: None,
        }
    }

    fn message(room_id: Uuid, sender_id: Uuid, text: &str, at: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            chat_room_id: room_id,
            sender_id,
            message: text.to_string(),
            is_read: false,
            created_at: at,
        }
    }

    #[test]
    fn duplicate_pair_insert_is_ignored() {
        let (db, ids) = db_with_users(2);
        assert!(db.insert_room(&peer_room(ids[0], ids[1])).unwrap());
        // Same pair, opposite order
        assert!(!db.insert_room(&peer_room(ids[1], ids[0])).unwrap());

        let found = db
            .find_room_by_pair("artist_artist", &raaya_types::models::pair_key(ids[1], ids[0]))
            .unwrap();
        assert!(found.is_some());
        assert_eq!(db.get_all_rooms().unwrap().len(), 1);
    }

    #[test]
    fn hosted_room_round_trips_through_row() {
        let (db, ids) = db_with_users(2);
        let room = ChatRoom {
            id: Uuid::new_v4(),
            chat_type: ChatType::VenuePartner,
            topology: RoomTopology::HostedPair {
                venue_user_id: ids[0],
                provider_user_id: ids[1],
                provider_type: ProviderType::Partner,
            },
            created_at: Utc::now(),
            last_message_at: None,
        };
        db.insert_room(&room).unwrap();

        let loaded = db.get_room(&room.id.to_string()).unwrap().unwrap().into_room().unwrap();
        assert_eq!(loaded.topology, room.topology);
        assert_eq!(loaded.chat_type, ChatType::VenuePartner);
    }

    #[test]
    fn messages_order_by_time_then_insertion() {
        let (db, ids) = db_with_users(2);
        let room = peer_room(ids[0], ids[1]);
        db.insert_room(&room).unwrap();

        let t0 = Utc::now();
        db.insert_message(&message(room.id, ids[0], "late", t0 + Duration::seconds(5))).unwrap();
        db.insert_message(&message(room.id, ids[0], "tie-a", t0)).unwrap();
        db.insert_message(&message(room.id, ids[1], "tie-b", t0)).unwrap();

        let texts: Vec<String> = db
            .get_messages(&room.id.to_string())
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(texts, vec!["tie-a", "tie-b", "late"]);

        let last = db.get_last_message(&room.id.to_string()).unwrap().unwrap();
        assert_eq!(last.message, "late");
    }

    #[test]
    fn mark_read_skips_own_messages() {
        let (db, ids) = db_with_users(2);
        let room = peer_room(ids[0], ids[1]);
        db.insert_room(&room).unwrap();
        db.insert_message(&message(room.id, ids[0], "from a", Utc::now())).unwrap();
        db.insert_message(&message(room.id, ids[1], "from b", Utc::now())).unwrap();

        assert_eq!(db.mark_read(&room.id.to_string(), &ids[1].to_string()).unwrap(), 1);
        assert_eq!(db.mark_read(&room.id.to_string(), &ids[1].to_string()).unwrap(), 0);

        let rows = db.get_messages(&room.id.to_string()).unwrap();
        let from_b = rows.iter().find(|m| m.message == "from b").unwrap();
        assert!(!from_b.is_read);
    }

    #[test]
    fn rooms_for_user_match_any_position() {
        let (db, ids) = db_with_users(3);
        db.insert_room(&peer_room(ids[0], ids[1])).unwrap();
        db.insert_room(&peer_room(ids[2], ids[0])).unwrap();
        db.insert_room(&peer_room(ids[1], ids[2])).unwrap();

        assert_eq!(db.get_rooms_for_user(&ids[0].to_string()).unwrap().len(), 2);
    }
}
