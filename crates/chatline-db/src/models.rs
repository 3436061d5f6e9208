//! Database row types. These map directly to SQLite rows.
//! Distinct from chatline-types API models to keep the DB layer independent.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;
use uuid::Uuid;

use chatline_types::models::{Message, User};

pub struct UserRow {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub profile_pic: Option<String>,
    pub bio: Option<String>,
    pub refresh_token: Option<String>,
    pub upload_enabled: bool,
    pub ai_enabled: bool,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image: Option<String>,
    pub seen: bool,
    pub created_at: String,
}

impl UserRow {
    pub fn into_user(self) -> User {
        User {
            id: parse_id(&self.id, "user"),
            created_at: parse_timestamp(&self.created_at, &self.id),
            full_name: self.full_name,
            email: self.email,
            profile_pic: self.profile_pic,
            bio: self.bio,
            upload_enabled: self.upload_enabled,
            ai_enabled: self.ai_enabled,
        }
    }
}

impl MessageRow {
    pub fn into_message(self) -> Message {
        Message {
            id: parse_id(&self.id, "message"),
            sender_id: parse_id(&self.sender_id, "sender"),
            receiver_id: parse_id(&self.receiver_id, "receiver"),
            created_at: parse_timestamp(&self.created_at, &self.id),
            text: self.text,
            image: self.image,
            seen: self.seen,
        }
    }
}

/// Timestamps are written with a fixed width so lexical order is time order.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} id '{}': {}", what, raw, e);
        Uuid::default()
    })
}

fn parse_timestamp(raw: &str, row_id: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by hand via sqlite3 use "YYYY-MM-DD HH:MM:SS" without timezone.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on row '{}': {}", raw, row_id, e);
            DateTime::default()
        })
}
