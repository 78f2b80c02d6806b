use crate::models::{ChatOverviewRow, MessageRow, UserRow};
use crate::{Database, Result, StoreError};
use rusqlite::{Connection, OptionalExtension, params};

/// The provider-specific unique key an identity claim resolves through.
#[derive(Debug, Clone)]
pub enum ProviderKey {
    Google(String),
    Telegram(String),
    Phone(String),
}

/// Row to insert when a provider key is seen for the first time.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub phone: String,
    pub name: String,
    pub avatar_url: String,
    pub google_id: Option<String>,
    pub telegram_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub text: String,
    pub attachment_type: Option<String>,
    pub attachment_url: Option<String>,
    pub attachment_name: Option<String>,
}

impl Database {
    // -- Users / identity --

    /// Look up a user by provider key, inserting the claimed profile when the
    /// key is unknown. Runs in one transaction; the UNIQUE indexes on
    /// google_id / telegram_id / phone are the backstop against concurrent
    /// first logins. Either way the resolved user is marked online.
    ///
    /// Returns the stored row and whether it was just created.
    pub fn resolve_user(&self, key: &ProviderKey, new_user: &NewUser) -> Result<(UserRow, bool)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if let Some(user) = query_user_by_key(&tx, key)? {
                touch_presence(&tx, &user.id)?;
                tx.commit()?;
                return Ok((user, false));
            }

            if let Err(err) = insert_user(&tx, new_user) {
                if is_unique_violation(&err) {
                    // Lost a race on the provider key, or the claimed phone
                    // belongs to a different account.
                    if let Some(user) = query_user_by_key(&tx, key)? {
                        touch_presence(&tx, &user.id)?;
                        tx.commit()?;
                        return Ok((user, false));
                    }
                    return Err(StoreError::PhoneTaken);
                }
                return Err(err.into());
            }

            touch_presence(&tx, &new_user.id)?;
            let user = query_user_by_key(&tx, key)?.ok_or(StoreError::NotFound)?;
            tx.commit()?;
            Ok((user, true))
        })
    }

    pub fn user_by_phone(&self, phone: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_key(conn, &ProviderKey::Phone(phone.to_string())))
    }

    // -- Chats --

    /// One row per non-blocked chat of `user_id`: display fields resolved
    /// (group chats show their own name/avatar, 1:1 chats show the other
    /// participant's), last-message preview, and the count of unread
    /// messages sent by others. Most recently active chats first; chats
    /// with no messages sort last.
    pub fn list_chats(&self, user_id: &str) -> Result<Vec<ChatOverviewRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT
                    c.id,
                    CASE WHEN c.is_group THEN c.name ELSE peer.name END,
                    CASE WHEN c.is_group THEN c.avatar_url ELSE peer.avatar_url END,
                    COALESCE(peer.is_online, 0),
                    last.text,
                    last.created_at,
                    (SELECT COUNT(*) FROM messages m
                      WHERE m.chat_id = c.id AND m.is_read = 0 AND m.sender_id <> ?1)
                 FROM chats c
                 JOIN chat_participants cp ON cp.chat_id = c.id
                 LEFT JOIN chat_participants other ON other.chat_id = c.id
                     AND other.user_id <> ?1 AND c.is_group = 0
                 LEFT JOIN users peer ON peer.id = other.user_id
                 LEFT JOIN messages last ON last.rowid = (
                     SELECT m.rowid FROM messages m
                      WHERE m.chat_id = c.id
                      ORDER BY m.created_at DESC, m.rowid DESC
                      LIMIT 1
                 )
                 WHERE cp.user_id = ?1 AND cp.is_blocked = 0
                 ORDER BY last.created_at IS NULL, last.created_at DESC",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ChatOverviewRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        avatar_url: row.get(2)?,
                        peer_online: row.get(3)?,
                        last_message: row.get(4)?,
                        last_message_at: row.get(5)?,
                        unread: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Find the existing 1:1 chat between two users, creating it (chat row
    /// plus both participant rows) in one transaction when absent. The
    /// participant pair is unordered, so either caller resolves to the same
    /// chat. Returns the chat id.
    pub fn find_or_create_direct_chat(
        &self,
        user_id: &str,
        contact_id: &str,
        new_chat_id: &str,
    ) -> Result<String> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT c.id FROM chats c
                     JOIN chat_participants a ON a.chat_id = c.id AND a.user_id = ?1
                     JOIN chat_participants b ON b.chat_id = c.id AND b.user_id = ?2
                     WHERE c.is_group = 0",
                    params![user_id, contact_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(id) = existing {
                tx.commit()?;
                return Ok(id);
            }

            tx.execute("INSERT INTO chats (id, is_group) VALUES (?1, 0)", [new_chat_id])?;
            tx.execute(
                "INSERT INTO chat_participants (chat_id, user_id) VALUES (?1, ?2)",
                params![new_chat_id, user_id],
            )?;
            tx.execute(
                "INSERT INTO chat_participants (chat_id, user_id) VALUES (?1, ?2)",
                params![new_chat_id, contact_id],
            )?;
            tx.commit()?;

            Ok(new_chat_id.to_string())
        })
    }

    /// One-sided block: flags the user's own participant row. The chat and
    /// its messages are untouched and the other participant's view is
    /// unaffected.
    pub fn block_chat(&self, chat_id: &str, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE chat_participants SET is_blocked = 1
                 WHERE chat_id = ?1 AND user_id = ?2",
                params![chat_id, user_id],
            )?;
            Ok(())
        })
    }

    // -- Messages --

    /// Full history of a chat, oldest first, then flips is_read on every
    /// message from other senders — fetching a chat is what marks it read.
    /// Both statements run in one transaction; the returned rows carry the
    /// read state as it was before the flip.
    pub fn chat_history_marking_read(
        &self,
        chat_id: &str,
        reader_id: &str,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let rows = query_chat_messages(&tx, chat_id)?;

            tx.execute(
                "UPDATE messages SET is_read = 1
                 WHERE chat_id = ?1 AND sender_id <> ?2 AND is_read = 0",
                params![chat_id, reader_id],
            )?;
            tx.commit()?;

            Ok(rows)
        })
    }

    /// Insert a message and return its server-assigned created_at.
    pub fn append_message(&self, msg: &NewMessage) -> Result<String> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages
                    (id, chat_id, sender_id, text,
                     attachment_type, attachment_url, attachment_name)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    msg.id,
                    msg.chat_id,
                    msg.sender_id,
                    msg.text,
                    msg.attachment_type,
                    msg.attachment_url,
                    msg.attachment_name,
                ],
            )?;

            let created_at = conn.query_row(
                "SELECT created_at FROM messages WHERE id = ?1",
                [&msg.id],
                |row| row.get(0),
            )?;
            Ok(created_at)
        })
    }
}

fn query_user_by_key(conn: &Connection, key: &ProviderKey) -> Result<Option<UserRow>> {
    let (column, value) = match key {
        ProviderKey::Google(id) => ("google_id", id.as_str()),
        ProviderKey::Telegram(id) => ("telegram_id", id.as_str()),
        ProviderKey::Phone(phone) => ("phone", phone.as_str()),
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT id, phone, name, bio, avatar_url, is_online FROM users WHERE {} = ?1",
        column
    ))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                phone: row.get(1)?,
                name: row.get(2)?,
                bio: row.get(3)?,
                avatar_url: row.get(4)?,
                is_online: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn insert_user(conn: &Connection, user: &NewUser) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO users (id, phone, name, avatar_url, google_id, telegram_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.id,
            user.phone,
            user.name,
            user.avatar_url,
            user.google_id,
            user.telegram_id,
        ],
    )?;
    Ok(())
}

fn touch_presence(conn: &Connection, user_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET is_online = 1, last_seen = datetime('now') WHERE id = ?1",
        [user_id],
    )?;
    Ok(())
}

fn query_chat_messages(conn: &Connection, chat_id: &str) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender_id, text, is_read,
                attachment_type, attachment_url, attachment_name, created_at
         FROM messages
         WHERE chat_id = ?1
         ORDER BY created_at ASC, rowid ASC",
    )?;

    let rows = stmt
        .query_map([chat_id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                text: row.get(2)?,
                is_read: row.get(3)?,
                attachment_type: row.get(4)?,
                attachment_url: row.get(5)?,
                attachment_name: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn phone_claim(phone: &str, name: &str) -> (ProviderKey, NewUser) {
        (
            ProviderKey::Phone(phone.to_string()),
            NewUser {
                id: Uuid::new_v4().to_string(),
                phone: phone.to_string(),
                name: name.to_string(),
                avatar_url: String::new(),
                google_id: None,
                telegram_id: None,
            },
        )
    }

    fn phone_user(db: &Database, phone: &str, name: &str) -> UserRow {
        let (key, new_user) = phone_claim(phone, name);
        db.resolve_user(&key, &new_user).unwrap().0
    }

    fn send(db: &Database, chat_id: &str, sender_id: &str, text: &str) -> String {
        let msg = NewMessage {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            attachment_type: None,
            attachment_url: None,
            attachment_name: None,
        };
        db.append_message(&msg).unwrap();
        msg.id
    }

    fn backdate(db: &Database, message_id: &str, ts: &str) {
        db.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE messages SET created_at = ?1 WHERE id = ?2",
                params![ts, message_id],
            )?;
            Ok(())
        })
        .unwrap();
    }

    fn user_count(db: &Database) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?)
        })
        .unwrap()
    }

    #[test]
    fn resolving_the_same_provider_key_twice_returns_one_user() {
        let db = test_db();
        let key = ProviderKey::Google("g-1".to_string());
        let first_claim = NewUser {
            id: Uuid::new_v4().to_string(),
            phone: "ann@example.com".to_string(),
            name: "Ann".to_string(),
            avatar_url: "http://a/p.png".to_string(),
            google_id: Some("g-1".to_string()),
            telegram_id: None,
        };

        let (created, was_created) = db.resolve_user(&key, &first_claim).unwrap();
        assert!(was_created);

        // Second login carries a different display name; the stored profile
        // wins and no new row appears.
        let second_claim = NewUser {
            id: Uuid::new_v4().to_string(),
            name: "Annie".to_string(),
            ..first_claim.clone()
        };
        let (found, was_created) = db.resolve_user(&key, &second_claim).unwrap();
        assert!(!was_created);
        assert_eq!(found.id, created.id);
        assert_eq!(found.name, "Ann");
        assert_eq!(user_count(&db), 1);
    }

    #[test]
    fn resolving_marks_the_user_online() {
        let db = test_db();
        let user = phone_user(&db, "+1", "Ann");
        assert!(user.is_online);

        let last_seen: Option<String> = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT last_seen FROM users WHERE id = ?1",
                    [&user.id],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert!(last_seen.is_some());
    }

    #[test]
    fn claimed_phone_owned_by_another_account_is_rejected() {
        let db = test_db();
        phone_user(&db, "+1", "Ann");

        // A Google first-login whose fallback phone (the email) collides
        // with an existing account's phone.
        let key = ProviderKey::Google("g-9".to_string());
        let claim = NewUser {
            id: Uuid::new_v4().to_string(),
            phone: "+1".to_string(),
            name: "Impostor".to_string(),
            avatar_url: String::new(),
            google_id: Some("g-9".to_string()),
            telegram_id: None,
        };

        let err = db.resolve_user(&key, &claim).unwrap_err();
        assert!(matches!(err, StoreError::PhoneTaken));
        assert_eq!(user_count(&db), 1);
    }

    #[test]
    fn direct_chat_is_reused_in_either_direction() {
        let db = test_db();
        let ann = phone_user(&db, "+1", "Ann");
        let bob = phone_user(&db, "+2", "Bob");

        let first = db
            .find_or_create_direct_chat(&ann.id, &bob.id, &Uuid::new_v4().to_string())
            .unwrap();
        let second = db
            .find_or_create_direct_chat(&bob.id, &ann.id, &Uuid::new_v4().to_string())
            .unwrap();
        assert_eq!(first, second);

        let chat_count: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM chats", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(chat_count, 1);

        let participant_count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM chat_participants WHERE chat_id = ?1",
                    [&first],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(participant_count, 2);
    }

    #[test]
    fn unread_counts_drop_after_the_recipient_fetches_history() {
        let db = test_db();
        let ann = phone_user(&db, "+1", "Ann");
        let bob = phone_user(&db, "+2", "Bob");
        let chat = db
            .find_or_create_direct_chat(&ann.id, &bob.id, &Uuid::new_v4().to_string())
            .unwrap();

        send(&db, &chat, &ann.id, "hi");
        send(&db, &chat, &ann.id, "you there?");

        // The sender never counts their own messages as unread.
        let ann_view = db.list_chats(&ann.id).unwrap();
        assert_eq!(ann_view[0].unread, 0);

        let bob_view = db.list_chats(&bob.id).unwrap();
        assert_eq!(bob_view[0].unread, 2);
        assert_eq!(bob_view[0].last_message.as_deref(), Some("you there?"));
        assert_eq!(bob_view[0].name.as_deref(), Some("Ann"));

        let history = db.chat_history_marking_read(&chat, &bob.id).unwrap();
        assert_eq!(history.len(), 2);
        // Rows reflect the state before this fetch marked them.
        assert!(!history[0].is_read);

        let bob_view = db.list_chats(&bob.id).unwrap();
        assert_eq!(bob_view[0].unread, 0);
    }

    #[test]
    fn fetching_history_never_marks_the_readers_own_messages() {
        let db = test_db();
        let ann = phone_user(&db, "+1", "Ann");
        let bob = phone_user(&db, "+2", "Bob");
        let chat = db
            .find_or_create_direct_chat(&ann.id, &bob.id, &Uuid::new_v4().to_string())
            .unwrap();

        send(&db, &chat, &ann.id, "hi");

        // Ann re-reading her own chat must not consume Bob's unread count.
        db.chat_history_marking_read(&chat, &ann.id).unwrap();
        let bob_view = db.list_chats(&bob.id).unwrap();
        assert_eq!(bob_view[0].unread, 1);

        let history = db.chat_history_marking_read(&chat, &ann.id).unwrap();
        assert!(!history[0].is_read);
    }

    #[test]
    fn blocking_hides_the_chat_from_the_blocker_only() {
        let db = test_db();
        let ann = phone_user(&db, "+1", "Ann");
        let bob = phone_user(&db, "+2", "Bob");
        let chat = db
            .find_or_create_direct_chat(&ann.id, &bob.id, &Uuid::new_v4().to_string())
            .unwrap();
        send(&db, &chat, &ann.id, "hi");

        db.block_chat(&chat, &bob.id).unwrap();

        assert!(db.list_chats(&bob.id).unwrap().is_empty());
        assert_eq!(db.list_chats(&ann.id).unwrap().len(), 1);

        // The chat and its messages persist in storage.
        let history = db.chat_history_marking_read(&chat, &bob.id).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn chats_order_by_recency_with_empty_chats_last() {
        let db = test_db();
        let ann = phone_user(&db, "+1", "Ann");
        let bob = phone_user(&db, "+2", "Bob");
        let cat = phone_user(&db, "+3", "Cat");
        let dan = phone_user(&db, "+4", "Dan");

        let with_bob = db
            .find_or_create_direct_chat(&ann.id, &bob.id, &Uuid::new_v4().to_string())
            .unwrap();
        let with_cat = db
            .find_or_create_direct_chat(&ann.id, &cat.id, &Uuid::new_v4().to_string())
            .unwrap();
        // No messages with Dan.
        db.find_or_create_direct_chat(&ann.id, &dan.id, &Uuid::new_v4().to_string())
            .unwrap();

        let old = send(&db, &with_bob, &bob.id, "old");
        backdate(&db, &old, "2026-01-01 09:00:00.000");
        let new = send(&db, &with_cat, &cat.id, "new");
        backdate(&db, &new, "2026-01-02 09:00:00.000");

        let chats = db.list_chats(&ann.id).unwrap();
        assert_eq!(chats.len(), 3);
        assert_eq!(chats[0].id, with_cat);
        assert_eq!(chats[1].id, with_bob);
        assert!(chats[2].last_message.is_none());
    }

    #[test]
    fn group_chats_display_their_own_name() {
        let db = test_db();
        let ann = phone_user(&db, "+1", "Ann");
        let bob = phone_user(&db, "+2", "Bob");
        let cat = phone_user(&db, "+3", "Cat");

        let group_id = Uuid::new_v4().to_string();
        db.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO chats (id, is_group, name, avatar_url) VALUES (?1, 1, 'Plans', 'http://a/g.png')",
                [&group_id],
            )?;
            for user in [&ann.id, &bob.id, &cat.id] {
                conn.execute(
                    "INSERT INTO chat_participants (chat_id, user_id) VALUES (?1, ?2)",
                    params![group_id, user],
                )?;
            }
            Ok(())
        })
        .unwrap();

        let chats = db.list_chats(&ann.id).unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].name.as_deref(), Some("Plans"));
        assert_eq!(chats[0].avatar_url.as_deref(), Some("http://a/g.png"));
        assert!(!chats[0].peer_online);
    }

    #[test]
    fn attachments_are_stored_and_returned() {
        let db = test_db();
        let ann = phone_user(&db, "+1", "Ann");
        let bob = phone_user(&db, "+2", "Bob");
        let chat = db
            .find_or_create_direct_chat(&ann.id, &bob.id, &Uuid::new_v4().to_string())
            .unwrap();

        let msg = NewMessage {
            id: Uuid::new_v4().to_string(),
            chat_id: chat.clone(),
            sender_id: ann.id.clone(),
            text: "see photo".to_string(),
            attachment_type: Some("image".to_string()),
            attachment_url: Some("http://a/1.jpg".to_string()),
            attachment_name: Some("1.jpg".to_string()),
        };
        let created_at = db.append_message(&msg).unwrap();
        assert!(!created_at.is_empty());

        let history = db.chat_history_marking_read(&chat, &bob.id).unwrap();
        assert_eq!(history[0].attachment_type.as_deref(), Some("image"));
        assert_eq!(history[0].attachment_url.as_deref(), Some("http://a/1.jpg"));
        assert_eq!(history[0].attachment_name.as_deref(), Some("1.jpg"));
    }

    #[test]
    fn history_is_ordered_oldest_first() {
        let db = test_db();
        let ann = phone_user(&db, "+1", "Ann");
        let bob = phone_user(&db, "+2", "Bob");
        let chat = db
            .find_or_create_direct_chat(&ann.id, &bob.id, &Uuid::new_v4().to_string())
            .unwrap();

        let a = send(&db, &chat, &ann.id, "first");
        backdate(&db, &a, "2026-01-01 09:00:00.000");
        let b = send(&db, &chat, &bob.id, "second");
        backdate(&db, &b, "2026-01-01 09:00:01.000");
        send(&db, &chat, &ann.id, "third");

        let history = db.chat_history_marking_read(&chat, &bob.id).unwrap();
        let texts: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["first", "second", "third"]);
    }
}
