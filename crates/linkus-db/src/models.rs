/// Database row types — these map directly to SQLite rows.
/// Distinct from linkus-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub password_hash: String,
    pub avatar_url: Option<String>,
    pub email_verified: bool,
    pub email_verification_token: Option<String>,
    pub created_at: String,
}

/// Public identity fields joined onto messages, participants and contacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRow {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender: ProfileRow,
    pub content: String,
    pub message_type: String,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct LastMessageRow {
    pub id: String,
    pub content: String,
    pub message_type: String,
    pub sender_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ConversationSummaryRow {
    pub id: String,
    pub is_private: bool,
    pub created_at: String,
    pub last_read_at: Option<String>,
    pub unread_count: i64,
    pub last_message: Option<LastMessageRow>,
    pub last_activity_at: String,
    /// Everyone in the conversation except the requesting user.
    pub participants: Vec<ProfileRow>,
}

#[derive(Debug, Clone)]
pub struct ContactRow {
    pub id: String,
    pub user_id: String,
    pub contact_user_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ContactDetailRow {
    pub contact: ProfileRow,
    pub email: String,
    pub created_at: String,
}
