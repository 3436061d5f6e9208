use crate::models::{MessageRow, UserRow, now_timestamp};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, Row};

/// Stored in place of a password hash for accounts that must never log in.
pub const UNUSABLE_PASSWORD: &str = "!";

const USER_COLUMNS: &str = "id, full_name, email, password, profile_pic, bio, refresh_token, \
                            upload_enabled, ai_enabled, created_at";

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, text, image, seen, created_at";

pub struct NewMessage<'a> {
    pub id: &'a str,
    pub sender_id: &'a str,
    pub receiver_id: &'a str,
    pub text: Option<&'a str>,
    pub image: Option<&'a str>,
}

impl Database {
    // -- Users --

    /// Returns false when the email (or id) is already taken.
    pub fn create_user(
        &self,
        id: &str,
        full_name: &str,
        email: &str,
        password_hash: &str,
        bio: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, full_name, email, password, bio, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, full_name, email, password_hash, bio, now_timestamp()],
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Insert a login-less account if the id is not taken yet. Returns true when inserted.
    pub fn ensure_system_user(&self, id: &str, full_name: &str, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO users (id, full_name, email, password, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, full_name, email, UNUSABLE_PASSWORD, now_timestamp()],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Every user except `id`, in signup order.
    pub fn list_users_except(&self, id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY created_at, rowid"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_profile(
        &self,
        id: &str,
        full_name: Option<&str>,
        bio: Option<&str>,
        profile_pic: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET
                    full_name = COALESCE(?2, full_name),
                    bio = COALESCE(?3, bio),
                    profile_pic = COALESCE(?4, profile_pic)
                 WHERE id = ?1",
                rusqlite::params![id, full_name, bio, profile_pic],
            )?;
            Ok(())
        })
    }

    /// Returns false when the user does not exist.
    pub fn set_user_flags(
        &self,
        id: &str,
        upload_enabled: Option<bool>,
        ai_enabled: Option<bool>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET
                    upload_enabled = COALESCE(?2, upload_enabled),
                    ai_enabled = COALESCE(?3, ai_enabled)
                 WHERE id = ?1",
                rusqlite::params![id, upload_enabled, ai_enabled],
            )?;
            Ok(changed == 1)
        })
    }

    // -- Refresh tokens --

    /// Overwrite (or clear, with `None`) the single stored refresh token.
    pub fn set_refresh_token(&self, id: &str, token: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET refresh_token = ?2 WHERE id = ?1",
                rusqlite::params![id, token],
            )?;
            Ok(())
        })
    }

    /// Compare-and-swap: replace the stored token only if it still equals `current`.
    /// Returns false when another rotation or a revocation got there first.
    pub fn rotate_refresh_token(&self, id: &str, current: &str, next: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET refresh_token = ?3 WHERE id = ?1 AND refresh_token = ?2",
                rusqlite::params![id, current, next],
            )?;
            Ok(changed == 1)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<MessageRow> {
        self.with_conn(|conn| {
            let created_at = now_timestamp();
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, text, image, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    msg.id,
                    msg.sender_id,
                    msg.receiver_id,
                    msg.text,
                    msg.image,
                    created_at
                ],
            )?;

            Ok(MessageRow {
                id: msg.id.to_string(),
                sender_id: msg.sender_id.to_string(),
                receiver_id: msg.receiver_id.to_string(),
                text: msg.text.map(str::to_string),
                image: msg.image.map(str::to_string),
                seen: false,
                created_at,
            })
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let row = stmt.query_row([id], message_from_row).optional()?;
            Ok(row)
        })
    }

    /// Both directions of the conversation between `a` and `b`, oldest first.
    pub fn get_conversation(&self, a: &str, b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at ASC, rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([a, b], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark everything `sender_id` sent to `receiver_id` as seen. Returns rows changed.
    pub fn mark_conversation_seen(&self, sender_id: &str, receiver_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET seen = 1
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND seen = 0",
                [sender_id, receiver_id],
            )?;
            Ok(changed)
        })
    }

    /// Idempotent: a message already seen stays seen.
    pub fn mark_message_seen(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE messages SET seen = 1 WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    /// Unseen message count per sender for messages addressed to `receiver_id`.
    pub fn unseen_counts(&self, receiver_id: &str) -> Result<Vec<(String, i64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sender_id, COUNT(*) FROM messages
                 WHERE receiver_id = ?1 AND seen = 0
                 GROUP BY sender_id",
            )?;
            let rows = stmt
                .query_map([receiver_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Settings --

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let value: Option<String> = conn
                .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(value)
        })
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [key, value],
            )?;
            Ok(())
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        profile_pic: row.get(4)?,
        bio: row.get(5)?,
        refresh_token: row.get(6)?,
        upload_enabled: row.get(7)?,
        ai_enabled: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        text: row.get(3)?,
        image: row.get(4)?,
        seen: row.get(5)?,
        created_at: row.get(6)?,
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
