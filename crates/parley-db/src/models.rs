//! Database row types, mapped directly from SQLite rows.
//! Distinct from parley-types API models to keep the DB layer independent.

#[derive(Debug)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub profile_pic: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    /// Storage encoding of the text (ciphertext or legacy plaintext).
    pub text: Option<String>,
    pub image: Option<String>,
    pub created_at: String,
}

/// A message about to be stored. The store assigns id and timestamp.
pub struct NewMessage<'a> {
    pub sender_id: &'a str,
    pub receiver_id: &'a str,
    pub text: Option<&'a str>,
    pub image: Option<&'a str>,
}
