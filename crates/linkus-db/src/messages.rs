use rusqlite::Row;
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult, is_constraint_violation, is_foreign_key_violation};
use crate::models::{MessageRow, ProfileRow};
use crate::{Database, now_timestamp};

pub const SEARCH_LIMIT: usize = 50;

/// Messages joined with their sender's public profile. Callers append the
/// WHERE / ORDER BY clauses; `message_from_row` expects this column order.
pub(crate) const MESSAGE_SELECT: &str = "SELECT m.id, m.conversation_id, m.content, m.message_type,
        m.file_url, m.file_name, m.file_size, m.created_at,
        u.id, u.username, u.full_name, u.avatar_url
 FROM messages m
 JOIN users u ON u.id = m.sender_id";

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub message_type: String,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
}

impl NewMessage {
    pub fn text(conversation_id: &str, sender_id: &str, content: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            message_type: "text".to_string(),
            file_url: None,
            file_name: None,
            file_size: None,
        }
    }
}

impl Database {
    /// Insert a message and return it with sender info attached.
    ///
    /// Membership is NOT checked here: callers must have confirmed the sender
    /// participates in the conversation.
    pub fn create_message(&self, msg: NewMessage) -> StoreResult<MessageRow> {
        self.with_tx(|tx| {
            let id = Uuid::new_v4().to_string();
            let inserted = tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, content, message_type, file_url, file_name, file_size, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    id,
                    msg.conversation_id,
                    msg.sender_id,
                    msg.content,
                    msg.message_type,
                    msg.file_url,
                    msg.file_name,
                    msg.file_size,
                    now_timestamp(),
                ],
            );

            match inserted {
                Ok(_) => {}
                // Conversation or sender vanished since the membership check
                Err(e) if is_foreign_key_violation(&e) => {
                    debug!("Rejected message insert: {}", e);
                    return Err(StoreError::NotFound);
                }
                Err(e) if is_constraint_violation(&e) => {
                    return Err(StoreError::Invalid(e.to_string()));
                }
                Err(e) => return Err(e.into()),
            }

            let sql = format!("{} WHERE m.id = ?1", MESSAGE_SELECT);
            Ok(tx.query_row(&sql, [&id], message_from_row)?)
        })
    }

    /// Text messages matching every word of `term`, limited to conversations
    /// the user participates in. Newest first, at most [`SEARCH_LIMIT`].
    pub fn search_messages(&self, user_id: &str, term: &str) -> StoreResult<Vec<MessageRow>> {
        let patterns: Vec<String> = term
            .split_whitespace()
            .map(|word| format!("%{}%", escape_like(word)))
            .collect();
        if patterns.is_empty() {
            return Ok(vec![]);
        }

        let mut sql = format!(
            "{} WHERE m.message_type = 'text'
               AND m.conversation_id IN
                   (SELECT conversation_id FROM conversation_participants WHERE user_id = ?1)",
            MESSAGE_SELECT
        );
        for i in 0..patterns.len() {
            sql.push_str(&format!(" AND m.content LIKE ?{} ESCAPE '\\'", i + 2));
        }
        sql.push_str(&format!(
            " ORDER BY m.created_at DESC, m.rowid DESC LIMIT {}",
            SEARCH_LIMIT
        ));

        let mut values: Vec<&str> = Vec::with_capacity(patterns.len() + 1);
        values.push(user_id);
        values.extend(patterns.iter().map(String::as_str));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(values.iter()), message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        content: row.get(2)?,
        message_type: row.get(3)?,
        file_url: row.get(4)?,
        file_name: row.get(5)?,
        file_size: row.get(6)?,
        created_at: row.get(7)?,
        sender: ProfileRow {
            id: row.get(8)?,
            username: row.get(9)?,
            full_name: row.get(10)?,
            avatar_url: row.get(11)?,
        },
    })
}

fn escape_like(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    for c in word.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{open_db, user};

    #[test]
    fn test_create_message_returns_sender() {
        let t = open_db();
        let a = user(&t.db, "a@example.com");
        let b = user(&t.db, "b@example.com");
        let conv = t.db.get_or_create_private_conversation(&a.id, &b.id).unwrap();

        let msg = t
            .db
            .create_message(NewMessage {
                conversation_id: conv.clone(),
                sender_id: a.id.clone(),
                content: String::new(),
                message_type: "file".to_string(),
                file_url: Some("https://files.example.com/x.pdf".to_string()),
                file_name: Some("x.pdf".to_string()),
                file_size: Some(2048),
            })
            .unwrap();

        assert_eq!(msg.conversation_id, conv);
        assert_eq!(msg.sender.id, a.id);
        assert_eq!(msg.sender.username, a.username);
        assert_eq!(msg.sender.full_name, "Test User");
        assert_eq!(msg.file_size, Some(2048));
        assert_eq!(msg.message_type, "file");
    }

    #[test]
    fn test_create_message_in_missing_conversation() {
        let t = open_db();
        let a = user(&t.db, "a@example.com");
        assert!(matches!(
            t.db.create_message(NewMessage::text("nope", &a.id, "hi")),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_search_is_scoped_to_participant_conversations() {
        let t = open_db();
        let a = user(&t.db, "a@example.com");
        let b = user(&t.db, "b@example.com");
        let eve = user(&t.db, "eve@example.com");

        let ours = t.db.get_or_create_private_conversation(&a.id, &b.id).unwrap();
        let theirs = t.db.get_or_create_private_conversation(&b.id, &eve.id).unwrap();

        t.db.create_message(NewMessage::text(&ours, &b.id, "hello there")).unwrap();
        t.db.create_message(NewMessage::text(&theirs, &eve.id, "hello from eve")).unwrap();
        t.db.create_message(NewMessage::text(&ours, &a.id, "Hello again")).unwrap();

        let mut file = NewMessage::text(&ours, &a.id, "hello.txt");
        file.message_type = "file".to_string();
        t.db.create_message(file).unwrap();

        let found = t.db.search_messages(&a.id, "hello").unwrap();
        let contents: Vec<&str> = found.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Hello again", "hello there"]);
        assert!(found.iter().all(|m| m.conversation_id == ours));

        let found = t.db.search_messages(&b.id, "hello").unwrap();
        assert_eq!(found.len(), 3);

        assert!(t.db.search_messages(&a.id, "   ").unwrap().is_empty());
        assert_eq!(t.db.search_messages(&a.id, "again HELLO").unwrap().len(), 1);
    }

    #[test]
    fn test_search_treats_wildcards_literally() {
        let t = open_db();
        let a = user(&t.db, "a@example.com");
        let b = user(&t.db, "b@example.com");
        let conv = t.db.get_or_create_private_conversation(&a.id, &b.id).unwrap();
        t.db.create_message(NewMessage::text(&conv, &a.id, "50% off")).unwrap();
        t.db.create_message(NewMessage::text(&conv, &a.id, "500 items")).unwrap();

        let found = t.db.search_messages(&a.id, "50%").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].content, "50% off");
    }

    #[test]
    fn test_search_is_capped() {
        let t = open_db();
        let a = user(&t.db, "a@example.com");
        let b = user(&t.db, "b@example.com");
        let conv = t.db.get_or_create_private_conversation(&a.id, &b.id).unwrap();
        for i in 0..(SEARCH_LIMIT + 5) {
            t.db.create_message(NewMessage::text(&conv, &a.id, &format!("ping {}", i)))
                .unwrap();
        }

        let found = t.db.search_messages(&a.id, "ping").unwrap();
        assert_eq!(found.len(), SEARCH_LIMIT);
        assert_eq!(found[0].content, format!("ping {}", SEARCH_LIMIT + 4));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("a_b%c\\"), "a\\_b\\%c\\\\");
    }
}
