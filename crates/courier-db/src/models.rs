/// Database row types — these map directly to SQLite rows.
/// Distinct from the courier-types API models to keep the storage layer
/// independent of the wire format.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub phone: String,
    pub name: String,
    pub bio: String,
    pub avatar_url: String,
    pub is_online: bool,
}

/// One row per chat in a user's chat list, with last-message preview
/// and unread count already resolved.
#[derive(Debug)]
pub struct ChatOverviewRow {
    pub id: String,
    /// Chat's own name for groups, the other participant's name otherwise.
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub peer_online: bool,
    pub last_message: Option<String>,
    pub last_message_at: Option<String>,
    pub unread: i64,
}

#[derive(Debug)]
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub text: String,
    pub is_read: bool,
    pub attachment_type: Option<String>,
    pub attachment_url: Option<String>,
    pub attachment_name: Option<String>,
    pub created_at: String,
}
