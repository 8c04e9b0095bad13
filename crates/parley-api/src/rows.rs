//! Row -> API model conversions. Corrupt columns are logged and replaced with
//! defaults rather than failing the whole response.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use parley_crypto::Cipher;
use parley_db::models::{MessageRow, UserRow};
use parley_types::models::{Message, UserProfile};

pub fn parse_uuid(raw: &str, what: &str, row_id: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on row '{}': {}", what, raw, row_id, e);
        Uuid::default()
    })
}

pub fn parse_timestamp(raw: &str, row_id: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone: treat as naive UTC
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on row '{}': {}", raw, row_id, e);
            DateTime::default()
        })
}

/// Public profile; the password hash stays behind.
pub fn profile_from_row(row: UserRow) -> UserProfile {
    UserProfile {
        id: parse_uuid(&row.id, "id", &row.id),
        created_at: parse_timestamp(&row.created_at, &row.id),
        full_name: row.full_name,
        email: row.email,
        profile_pic: row.profile_pic,
    }
}

/// Client representation of a stored message, text decrypted.
pub fn message_from_row(cipher: &Cipher, row: MessageRow) -> Message {
    Message {
        id: parse_uuid(&row.id, "id", &row.id),
        sender_id: parse_uuid(&row.sender_id, "sender_id", &row.id),
        receiver_id: parse_uuid(&row.receiver_id, "receiver_id", &row.id),
        text: cipher.decrypt(row.text.as_deref()),
        created_at: parse_timestamp(&row.created_at, &row.id),
        image: row.image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_crypto::{DECRYPT_FAILED_SENTINEL, generate_key};

    fn row(text: Option<String>) -> MessageRow {
        MessageRow {
            id: Uuid::new_v4().to_string(),
            sender_id: Uuid::new_v4().to_string(),
            receiver_id: Uuid::new_v4().to_string(),
            text,
            image: None,
            created_at: "2026-01-02T03:04:05.678Z".into(),
        }
    }

    #[test]
    fn message_text_is_decrypted() {
        let cipher = Cipher::new(generate_key());
        let stored = cipher.encrypt(Some("hi")).unwrap();

        let msg = message_from_row(&cipher, row(stored));
        assert_eq!(msg.text.as_deref(), Some("hi"));
        assert_eq!(msg.created_at.timestamp_subsec_millis(), 678);
    }

    #[test]
    fn undecryptable_text_becomes_sentinel() {
        let cipher = Cipher::new(generate_key());
        let msg = message_from_row(&cipher, row(Some("00:11".into())));
        assert_eq!(msg.text.as_deref(), Some(DECRYPT_FAILED_SENTINEL));
    }

    #[test]
    fn sqlite_style_timestamps_are_accepted() {
        let ts = parse_timestamp("2026-01-02 03:04:05", "r");
        assert_eq!(ts.to_rfc3339(), "2026-01-02T03:04:05+00:00");
    }

    #[test]
    fn profile_omits_password() {
        let profile = profile_from_row(UserRow {
            id: Uuid::new_v4().to_string(),
            email: "a@example.com".into(),
            full_name: "A".into(),
            password: "$argon2id$secret".into(),
            profile_pic: None,
            created_at: "2026-01-02T03:04:05.000Z".into(),
        });

        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("password"));
    }
}
