use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public profile of a registered user. Never carries credential material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub profile_pic: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A direct message as clients see it.
///
/// `text` is always plaintext here. Ciphertext only exists in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serializes_camel_case_with_null_text() {
        let msg = Message {
            id: Uuid::nil(),
            sender_id: Uuid::nil(),
            receiver_id: Uuid::nil(),
            text: None,
            image: Some("https://cdn.example/a.png".into()),
            created_at: DateTime::default(),
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("senderId").is_some());
        assert!(json.get("receiverId").is_some());
        assert!(json.get("createdAt").is_some());
        assert!(json["text"].is_null());
        assert_eq!(json["image"], "https://cdn.example/a.png");
    }
}
