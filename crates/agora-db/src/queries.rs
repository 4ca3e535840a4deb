use crate::models::{
    DirectMessageRow, DirectMessageWithSenderRow, FriendRow, MessageRow, MessageWithAuthorRow,
    RoomMemberRow, RoomRow, UserRow,
};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str =
    "id, username, email, password, avatar_color, status, last_seen, created_at";

const MESSAGE_COLUMNS: &str =
    "id, room_id, user_id, content, message_type, edited, edited_at, created_at";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password_hash: &str,
        avatar_color: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password, avatar_color, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (id, username, email, password_hash, avatar_color, created_at),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    /// True if either the username or the email is already registered.
    pub fn user_exists(&self, username: &str, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE username = ?1 OR email = ?2",
                (username, email),
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Every user except `id`, ordered by username.
    pub fn list_users_except(&self, id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY username ASC"
            ))?;
            let rows = stmt
                .query_map([id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Presence transition write. Returns false if the user does not exist.
    pub fn set_user_status(&self, id: &str, status: &str, last_seen: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET status = ?1, last_seen = ?2 WHERE id = ?3",
                (status, last_seen, id),
            )?;
            Ok(changed > 0)
        })
    }

    // -- Rooms --

    /// Create a room and make `owner_id` its first member, atomically.
    pub fn create_room(
        &self,
        id: &str,
        name: &str,
        description: Option<&str>,
        owner_id: &str,
        created_at: &str,
    ) -> Result<RoomRow> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO rooms (id, name, description, owner_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, name, description, owner_id, created_at),
            )?;
            tx.execute(
                "INSERT INTO room_members (room_id, user_id, role, joined_at)
                 VALUES (?1, ?2, 'owner', ?3)",
                (id, owner_id, created_at),
            )?;
            tx.commit()?;

            Ok(RoomRow {
                id: id.to_string(),
                name: name.to_string(),
                description: description.map(str::to_string),
                owner_id: Some(owner_id.to_string()),
                is_private: false,
                created_at: created_at.to_string(),
            })
        })
    }

    /// Public rooms with their persisted member counts, oldest first.
    pub fn list_public_rooms(&self) -> Result<Vec<(RoomRow, u32)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.name, r.description, r.owner_id, r.is_private, r.created_at,
                        COUNT(rm.user_id)
                 FROM rooms r
                 LEFT JOIN room_members rm ON rm.room_id = r.id
                 WHERE r.is_private = 0
                 GROUP BY r.id
                 ORDER BY r.created_at ASC",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((room_from_row(row)?, row.get(6)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Idempotent membership insert. Returns true only when a row was added.
    pub fn add_room_member(&self, room_id: &str, user_id: &str, joined_at: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO room_members (room_id, user_id, joined_at)
                 VALUES (?1, ?2, ?3)",
                (room_id, user_id, joined_at),
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn room_name_taken(&self, name: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM rooms WHERE name = ?1",
                [name],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    pub fn count_room_members(&self, room_id: &str) -> Result<u32> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM room_members WHERE room_id = ?1",
                [room_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn room_exists(&self, room_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM rooms WHERE id = ?1",
                [room_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Persisted members of a room with their role, owner first.
    pub fn get_room_members(&self, room_id: &str) -> Result<Vec<RoomMemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.avatar_color, u.status, rm.role
                 FROM room_members rm
                 JOIN users u ON u.id = rm.user_id
                 WHERE rm.room_id = ?1
                 ORDER BY rm.role = 'owner' DESC, rm.joined_at ASC, u.username ASC",
            )?;
            let rows = stmt
                .query_map([room_id], |row| {
                    Ok(RoomMemberRow {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        avatar_color: row.get(2)?,
                        status: row.get(3)?,
                        role: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        room_id: &str,
        user_id: Option<&str>,
        content: &str,
        created_at: &str,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| {
            let row = conn.query_row(
                &format!(
                    "INSERT INTO messages (id, room_id, user_id, content, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     RETURNING {MESSAGE_COLUMNS}"
                ),
                (id, room_id, user_id, content, created_at),
                message_from_row,
            )?;
            Ok(row)
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                [id],
                message_from_row,
            )
            .optional()
        })
    }

    /// Author-scoped edit. `None` when no row matched: wrong author or no
    /// such message. The returned row carries the room the message lives in.
    pub fn update_message(
        &self,
        id: &str,
        author_id: &str,
        content: &str,
        edited_at: &str,
    ) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "UPDATE messages SET content = ?1, edited = 1, edited_at = ?2
                     WHERE id = ?3 AND user_id = ?4
                     RETURNING {MESSAGE_COLUMNS}"
                ),
                (content, edited_at, id, author_id),
                message_from_row,
            )
            .optional()
        })
    }

    /// Author-scoped delete. Returns the room the removed message was in, or
    /// `None` if nothing matched.
    pub fn delete_message(&self, id: &str, author_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "DELETE FROM messages WHERE id = ?1 AND user_id = ?2 RETURNING room_id",
                (id, author_id),
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Newest-first page of a room's history. `before` is the
    /// `(created_at, id)` of the oldest message already seen; without an id
    /// the cursor excludes the whole timestamp.
    pub fn get_room_messages(
        &self,
        room_id: &str,
        limit: u32,
        before: Option<&str>,
        before_id: Option<&str>,
    ) -> Result<Vec<MessageWithAuthorRow>> {
        self.with_conn(|conn| {
            // JOIN users to fetch the author identity in a single query
            let mut stmt = conn.prepare(
                "SELECT m.id, m.room_id, m.user_id, m.content, m.message_type, m.edited,
                        m.edited_at, m.created_at, u.username, u.avatar_color
                 FROM messages m
                 LEFT JOIN users u ON m.user_id = u.id
                 WHERE m.room_id = ?1
                   AND (?2 IS NULL
                        OR m.created_at < ?2
                        OR (m.created_at = ?2 AND ?3 IS NOT NULL AND m.id < ?3))
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT ?4",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![room_id, before, before_id, limit], |row| {
                    Ok(MessageWithAuthorRow {
                        message: message_from_row(row)?,
                        username: row.get(8)?,
                        avatar_color: row.get(9)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Direct messages --

    pub fn insert_direct_message(
        &self,
        id: &str,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
        created_at: &str,
    ) -> Result<DirectMessageRow> {
        self.with_conn(|conn| {
            let row = conn.query_row(
                "INSERT INTO direct_messages (id, sender_id, receiver_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 RETURNING id, sender_id, receiver_id, content, read, created_at",
                (id, sender_id, receiver_id, content, created_at),
                direct_message_from_row,
            )?;
            Ok(row)
        })
    }

    /// Newest-first messages exchanged between `a` and `b`, either direction.
    pub fn get_conversation(
        &self,
        a: &str,
        b: &str,
        limit: u32,
    ) -> Result<Vec<DirectMessageWithSenderRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT dm.id, dm.sender_id, dm.receiver_id, dm.content, dm.read, dm.created_at,
                        s.username, s.avatar_color
                 FROM direct_messages dm
                 JOIN users s ON s.id = dm.sender_id
                 WHERE (dm.sender_id = ?1 AND dm.receiver_id = ?2)
                    OR (dm.sender_id = ?2 AND dm.receiver_id = ?1)
                 ORDER BY dm.created_at DESC
                 LIMIT ?3",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![a, b, limit], |row| {
                    Ok(DirectMessageWithSenderRow {
                        message: direct_message_from_row(row)?,
                        sender_username: row.get(6)?,
                        sender_avatar_color: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Mark everything `sender_id` sent to `receiver_id` as read.
    pub fn mark_conversation_read(&self, sender_id: &str, receiver_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE direct_messages SET read = 1
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND read = 0",
                (sender_id, receiver_id),
            )?;
            Ok(updated)
        })
    }

    /// Unread DM counts for `receiver_id`, grouped by sender.
    pub fn unread_counts(&self, receiver_id: &str) -> Result<Vec<(String, u32)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sender_id, COUNT(*)
                 FROM direct_messages
                 WHERE receiver_id = ?1 AND read = 0
                 GROUP BY sender_id",
            )?;
            let rows = stmt
                .query_map([receiver_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Friendships --

    /// Record a pending request. Returns false if the pair already has a
    /// friendship in either direction.
    pub fn request_friend(
        &self,
        id: &str,
        requester_id: &str,
        receiver_id: &str,
        created_at: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO friendships (id, requester_id, receiver_id, created_at)
                 SELECT ?1, ?2, ?3, ?4
                 WHERE NOT EXISTS (
                     SELECT 1 FROM friendships
                     WHERE (requester_id = ?2 AND receiver_id = ?3)
                        OR (requester_id = ?3 AND receiver_id = ?2)
                 )",
                (id, requester_id, receiver_id, created_at),
            )?;
            Ok(inserted > 0)
        })
    }

    /// Accept the pending request `requester_id` sent to `receiver_id`.
    pub fn accept_friend(&self, requester_id: &str, receiver_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE friendships SET status = 'accepted'
                 WHERE requester_id = ?1 AND receiver_id = ?2 AND status = 'pending'",
                (requester_id, receiver_id),
            )?;
            Ok(updated > 0)
        })
    }

    /// Drop a friendship or request between `a` and `b`, whoever sent it.
    pub fn remove_friend(&self, a: &str, b: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM friendships
                 WHERE (requester_id = ?1 AND receiver_id = ?2)
                    OR (requester_id = ?2 AND receiver_id = ?1)",
                (a, b),
            )?;
            Ok(deleted > 0)
        })
    }

    pub fn has_pending_request(&self, requester_id: &str, receiver_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM friendships
                 WHERE requester_id = ?1 AND receiver_id = ?2 AND status = 'pending'",
                (requester_id, receiver_id),
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Accepted friends of `user_id`, by username.
    pub fn list_friends(&self, user_id: &str) -> Result<Vec<FriendRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.avatar_color, u.status, f.created_at
                 FROM friendships f
                 JOIN users u ON u.id = CASE
                     WHEN f.requester_id = ?1 THEN f.receiver_id
                     ELSE f.requester_id
                 END
                 WHERE (f.requester_id = ?1 OR f.receiver_id = ?1)
                   AND f.status = 'accepted'
                 ORDER BY u.username ASC",
            )?;
            let rows = stmt
                .query_map([user_id], friend_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Requests waiting on `user_id`, oldest first. Each row is the requester.
    pub fn list_pending_requests(&self, user_id: &str) -> Result<Vec<FriendRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.avatar_color, u.status, f.created_at
                 FROM friendships f
                 JOIN users u ON u.id = f.requester_id
                 WHERE f.receiver_id = ?1 AND f.status = 'pending'
                 ORDER BY f.created_at ASC",
            )?;
            let rows = stmt
                .query_map([user_id], friend_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is always one of our own literals, never client input
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"
    ))?;

    stmt.query_row([value], user_from_row).optional()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        avatar_color: row.get(4)?,
        status: row.get(5)?,
        last_seen: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn room_from_row(row: &Row<'_>) -> rusqlite::Result<RoomRow> {
    Ok(RoomRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        owner_id: row.get(3)?,
        is_private: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        room_id: row.get(1)?,
        user_id: row.get(2)?,
        content: row.get(3)?,
        message_type: row.get(4)?,
        edited: row.get(5)?,
        edited_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn friend_from_row(row: &Row<'_>) -> rusqlite::Result<FriendRow> {
    Ok(FriendRow {
        user_id: row.get(0)?,
        username: row.get(1)?,
        avatar_color: row.get(2)?,
        status: row.get(3)?,
        since: row.get(4)?,
    })
}

fn direct_message_from_row(row: &Row<'_>) -> rusqlite::Result<DirectMessageRow> {
    Ok(DirectMessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        read: row.get(4)?,
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
