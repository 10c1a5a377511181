use std::collections::HashMap;

use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::messages::{MESSAGE_SELECT, message_from_row};
use crate::models::{ConversationSummaryRow, LastMessageRow, MessageRow, ProfileRow};
use crate::{Database, OptionalExt, now_timestamp};

impl Database {
    /// Resolve the private conversation between two users, creating it (and
    /// both participant rows) if it does not exist yet. Lookup and insert share
    /// one write transaction, so concurrent callers for the same pair always
    /// agree on a single conversation.
    pub fn get_or_create_private_conversation(&self, user1_id: &str, user2_id: &str) -> StoreResult<String> {
        if user1_id == user2_id {
            return Err(StoreError::Invalid("cannot open a private conversation with yourself".into()));
        }

        self.with_tx(|tx| {
            let existing: Option<String> = tx
                .query_row(
                    "SELECT c.id FROM conversations c
                     JOIN conversation_participants a ON a.conversation_id = c.id AND a.user_id = ?1
                     JOIN conversation_participants b ON b.conversation_id = c.id AND b.user_id = ?2
                     WHERE c.is_private = 1
                     LIMIT 1",
                    [user1_id, user2_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(id) = existing {
                return Ok(id);
            }

            require_users(tx, &[user1_id, user2_id])?;

            let id = Uuid::new_v4().to_string();
            let now = now_timestamp();
            tx.execute(
                "INSERT INTO conversations (id, is_private, created_at) VALUES (?1, 1, ?2)",
                [&id, &now],
            )?;
            for user_id in [user1_id, user2_id] {
                insert_participant(tx, &id, user_id, &now)?;
            }

            info!("Created private conversation {}", id);
            Ok(id)
        })
    }

    /// Create a group conversation holding the creator and every listed member.
    pub fn create_group_conversation(&self, creator_id: &str, member_ids: &[String]) -> StoreResult<String> {
        let mut members: Vec<&str> = vec![creator_id];
        for m in member_ids {
            if !members.contains(&m.as_str()) {
                members.push(m);
            }
        }
        if members.len() < 2 {
            return Err(StoreError::Invalid("a group needs at least one other member".into()));
        }

        self.with_tx(|tx| {
            require_users(tx, &members)?;

            let id = Uuid::new_v4().to_string();
            let now = now_timestamp();
            tx.execute(
                "INSERT INTO conversations (id, is_private, created_at) VALUES (?1, 0, ?2)",
                [&id, &now],
            )?;
            for user_id in &members {
                insert_participant(tx, &id, user_id, &now)?;
            }

            info!("Created group conversation {} with {} members", id, members.len());
            Ok(id)
        })
    }

    /// Add a member to a group conversation. The actor must already be a
    /// participant; private conversations never take a third member.
    pub fn add_participant(&self, conversation_id: &str, actor_id: &str, user_id: &str) -> StoreResult<()> {
        self.with_tx(|tx| {
            if !participant_exists(tx, conversation_id, actor_id)? {
                return Err(StoreError::Unauthorized);
            }

            let is_private: bool = tx.query_row(
                "SELECT is_private FROM conversations WHERE id = ?1",
                [conversation_id],
                |row| row.get(0),
            )?;
            if is_private {
                return Err(StoreError::Invalid("private conversations have exactly two participants".into()));
            }
            if participant_exists(tx, conversation_id, user_id)? {
                return Ok(());
            }

            require_users(tx, &[user_id])?;
            insert_participant(tx, conversation_id, user_id, &now_timestamp())?;
            Ok(())
        })
    }

    pub fn is_participant(&self, conversation_id: &str, user_id: &str) -> StoreResult<bool> {
        self.with_conn(|conn| participant_exists(conn, conversation_id, user_id))
    }

    /// Every conversation the user participates in, most recently active first.
    pub fn get_user_conversations(&self, user_id: &str) -> StoreResult<Vec<ConversationSummaryRow>> {
        self.with_conn(|conn| {
            // One snapshot for both queries
            let tx = conn.unchecked_transaction()?;

            let mut stmt = tx.prepare(
                "SELECT c.id, c.is_private, c.created_at, p.last_read_at,
                        (SELECT COUNT(*) FROM messages um
                          WHERE um.conversation_id = c.id
                            AND um.sender_id != ?1
                            AND (p.last_read_at IS NULL OR um.created_at > p.last_read_at)),
                        lm.id, lm.content, lm.message_type, lm.sender_id, lm.created_at,
                        COALESCE(lm.created_at, c.created_at) AS last_activity_at
                 FROM conversation_participants p
                 JOIN conversations c ON c.id = p.conversation_id
                 LEFT JOIN messages lm ON lm.id = (
                     SELECT id FROM messages
                      WHERE conversation_id = c.id
                      ORDER BY created_at DESC, rowid DESC
                      LIMIT 1)
                 WHERE p.user_id = ?1
                 ORDER BY last_activity_at DESC, c.created_at DESC",
            )?;

            let mut summaries = stmt
                .query_map([user_id], |row| {
                    let last_message = match row.get::<_, Option<String>>(5)? {
                        Some(id) => Some(LastMessageRow {
                            id,
                            content: row.get(6)?,
                            message_type: row.get(7)?,
                            sender_id: row.get(8)?,
                            created_at: row.get(9)?,
                        }),
                        None => None,
                    };
                    Ok(ConversationSummaryRow {
                        id: row.get(0)?,
                        is_private: row.get(1)?,
                        created_at: row.get(2)?,
                        last_read_at: row.get(3)?,
                        unread_count: row.get(4)?,
                        last_message,
                        last_activity_at: row.get(10)?,
                        participants: vec![],
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut others: HashMap<String, Vec<ProfileRow>> = HashMap::new();
            let mut stmt = tx.prepare(
                "SELECT p.conversation_id, u.id, u.username, u.full_name, u.avatar_url
                 FROM conversation_participants p
                 JOIN users u ON u.id = p.user_id
                 WHERE p.user_id != ?1
                   AND p.conversation_id IN
                       (SELECT conversation_id FROM conversation_participants WHERE user_id = ?1)
                 ORDER BY u.username",
            )?;
            let rows = stmt.query_map([user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    ProfileRow {
                        id: row.get(1)?,
                        username: row.get(2)?,
                        full_name: row.get(3)?,
                        avatar_url: row.get(4)?,
                    },
                ))
            })?;
            for row in rows {
                let (conversation_id, profile) = row?;
                others.entry(conversation_id).or_default().push(profile);
            }

            for summary in &mut summaries {
                summary.participants = others.remove(&summary.id).unwrap_or_default();
            }
            Ok(summaries)
        })
    }

    /// A page of messages in chronological order. `offset` counts back from
    /// the newest message, so `(limit=50, offset=0)` is the latest page.
    pub fn get_conversation_messages(
        &self,
        conversation_id: &str,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> StoreResult<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            if !participant_exists(&tx, conversation_id, user_id)? {
                return Err(StoreError::Unauthorized);
            }

            let sql = format!(
                "{} WHERE m.conversation_id = ?1
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?2 OFFSET ?3",
                MESSAGE_SELECT
            );
            let mut stmt = tx.prepare(&sql)?;
            let mut messages = stmt
                .query_map(rusqlite::params![conversation_id, limit, offset], message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            messages.reverse();
            Ok(messages)
        })
    }

    /// Leave a conversation. The conversation itself is removed once nobody is
    /// left in it. Returns `true` when that happened.
    pub fn delete_conversation(&self, conversation_id: &str, user_id: &str) -> StoreResult<bool> {
        self.with_tx(|tx| {
            let removed = tx.execute(
                "DELETE FROM conversation_participants WHERE conversation_id = ?1 AND user_id = ?2",
                [conversation_id, user_id],
            )?;
            if removed == 0 {
                return Err(StoreError::Unauthorized);
            }

            let collected = tx.execute(
                "DELETE FROM conversations
                 WHERE id = ?1
                   AND NOT EXISTS (SELECT 1 FROM conversation_participants WHERE conversation_id = ?1)",
                [conversation_id],
            )?;

            if collected > 0 {
                info!("Conversation {} has no participants left, removed", conversation_id);
            } else {
                debug!("User {} left conversation {}", user_id, conversation_id);
            }
            Ok(collected > 0)
        })
    }

    /// Move the caller's read watermark to now.
    pub fn update_last_read(&self, conversation_id: &str, user_id: &str) -> StoreResult<()> {
        self.with_tx(|tx| {
            let updated = tx.execute(
                "UPDATE conversation_participants SET last_read_at = ?3
                 WHERE conversation_id = ?1 AND user_id = ?2",
                rusqlite::params![conversation_id, user_id, now_timestamp()],
            )?;
            if updated == 0 {
                return Err(StoreError::Unauthorized);
            }
            Ok(())
        })
    }
}

pub(crate) fn participant_exists(conn: &Connection, conversation_id: &str, user_id: &str) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM conversation_participants WHERE conversation_id = ?1 AND user_id = ?2",
            [conversation_id, user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Fail with `NotFound` unless every id names an existing user.
pub(crate) fn require_users(conn: &Connection, user_ids: &[&str]) -> StoreResult<()> {
    for id in user_ids {
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM users WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        if found.is_none() {
            return Err(StoreError::NotFound);
        }
    }
    Ok(())
}

fn insert_participant(conn: &Connection, conversation_id: &str, user_id: &str, joined_at: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO conversation_participants (id, conversation_id, user_id, joined_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![Uuid::new_v4().to_string(), conversation_id, user_id, joined_at],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::messages::NewMessage;
    use crate::test_support::{TestDb, open_db, user};

    fn count(t: &TestDb, sql: &str) -> i64 {
        t.db
            .with_conn(|conn| Ok(conn.query_row(sql, [], |r| r.get(0))?))
            .unwrap()
    }

    fn say(t: &TestDb, conversation_id: &str, sender_id: &str, content: &str) -> MessageRow {
        t.db.create_message(NewMessage::text(conversation_id, sender_id, content))
            .unwrap()
    }

    #[test]
    fn test_private_conversation_is_idempotent() {
        let t = open_db();
        let a = user(&t.db, "a@example.com");
        let b = user(&t.db, "b@example.com");

        let first = t.db.get_or_create_private_conversation(&a.id, &b.id).unwrap();
        let second = t.db.get_or_create_private_conversation(&a.id, &b.id).unwrap();
        let reversed = t.db.get_or_create_private_conversation(&b.id, &a.id).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, reversed);
        assert_eq!(count(&t, "SELECT COUNT(*) FROM conversations"), 1);
        assert_eq!(count(&t, "SELECT COUNT(*) FROM conversation_participants"), 2);
    }

    #[test]
    fn test_private_conversation_concurrent_callers_agree() {
        let t = open_db();
        let a = user(&t.db, "a@example.com");
        let b = user(&t.db, "b@example.com");
        let db = Arc::new(t.db);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                let (x, y) = if i % 2 == 0 {
                    (a.id.clone(), b.id.clone())
                } else {
                    (b.id.clone(), a.id.clone())
                };
                thread::spawn(move || db.get_or_create_private_conversation(&x, &y).unwrap())
            })
            .collect();

        let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.iter().all(|id| *id == ids[0]));

        let conversations: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?))
            .unwrap();
        let participants: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM conversation_participants", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(conversations, 1);
        assert_eq!(participants, 2);
    }

    #[test]
    fn test_last_participants_leaving_together() {
        let t = open_db();
        let a = user(&t.db, "a@example.com");
        let b = user(&t.db, "b@example.com");
        let conv = t.db.get_or_create_private_conversation(&a.id, &b.id).unwrap();
        say(&t, &conv, &a.id, "one");
        say(&t, &conv, &b.id, "two");
        let db = Arc::new(t.db);

        let handles: Vec<_> = [a.id.clone(), b.id.clone()]
            .into_iter()
            .map(|uid| {
                let db = db.clone();
                let conv = conv.clone();
                thread::spawn(move || db.delete_conversation(&conv, &uid))
            })
            .collect();

        let results: Vec<StoreResult<bool>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|r| r.is_ok()));
        let collected = results.iter().filter(|r| matches!(r, Ok(true))).count();
        assert_eq!(collected, 1);

        for table in ["conversations", "conversation_participants", "messages"] {
            let rows: i64 = db
                .with_conn(|conn| {
                    Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?)
                })
                .unwrap();
            assert_eq!(rows, 0, "{} should be empty", table);
        }
    }

    #[test]
    fn test_private_conversation_rejects_self_and_unknown_users() {
        let t = open_db();
        let a = user(&t.db, "a@example.com");

        assert!(matches!(
            t.db.get_or_create_private_conversation(&a.id, &a.id),
            Err(StoreError::Invalid(_))
        ));
        assert!(matches!(
            t.db.get_or_create_private_conversation(&a.id, "missing"),
            Err(StoreError::NotFound)
        ));
        assert_eq!(count(&t, "SELECT COUNT(*) FROM conversations"), 0);
    }

    #[test]
    fn test_messages_page_newest_slice_in_chronological_order() {
        let t = open_db();
        let a = user(&t.db, "a@example.com");
        let b = user(&t.db, "b@example.com");
        let conv = t.db.get_or_create_private_conversation(&a.id, &b.id).unwrap();

        for i in 1..=5 {
            say(&t, &conv, &a.id, &format!("m{}", i));
        }

        let page = t.db.get_conversation_messages(&conv, &b.id, 2, 0).unwrap();
        let contents: Vec<&str> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m4", "m5"]);

        let older = t.db.get_conversation_messages(&conv, &b.id, 2, 2).unwrap();
        let contents: Vec<&str> = older.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3"]);

        assert_eq!(page[0].sender.id, a.id);
    }

    #[test]
    fn test_non_participant_is_unauthorized() {
        let t = open_db();
        let a = user(&t.db, "a@example.com");
        let b = user(&t.db, "b@example.com");
        let eve = user(&t.db, "eve@example.com");
        let conv = t.db.get_or_create_private_conversation(&a.id, &b.id).unwrap();
        say(&t, &conv, &a.id, "secret");

        assert!(matches!(
            t.db.get_conversation_messages(&conv, &eve.id, 50, 0),
            Err(StoreError::Unauthorized)
        ));
        assert!(matches!(
            t.db.delete_conversation(&conv, &eve.id),
            Err(StoreError::Unauthorized)
        ));
        assert!(matches!(t.db.update_last_read(&conv, &eve.id), Err(StoreError::Unauthorized)));
        assert_eq!(count(&t, "SELECT COUNT(*) FROM conversation_participants"), 2);
    }

    #[test]
    fn test_delete_leaves_then_collects_conversation() {
        let t = open_db();
        let a = user(&t.db, "a@example.com");
        let b = user(&t.db, "b@example.com");
        let conv = t.db.get_or_create_private_conversation(&a.id, &b.id).unwrap();
        say(&t, &conv, &a.id, "bye");

        assert!(!t.db.delete_conversation(&conv, &a.id).unwrap());
        // The other participant keeps access
        assert_eq!(t.db.get_conversation_messages(&conv, &b.id, 50, 0).unwrap().len(), 1);
        assert!(matches!(
            t.db.get_conversation_messages(&conv, &a.id, 50, 0),
            Err(StoreError::Unauthorized)
        ));

        assert!(t.db.delete_conversation(&conv, &b.id).unwrap());
        assert_eq!(count(&t, "SELECT COUNT(*) FROM conversations"), 0);
        assert_eq!(count(&t, "SELECT COUNT(*) FROM messages"), 0);
        assert!(matches!(
            t.db.get_conversation_messages(&conv, &b.id, 50, 0),
            Err(StoreError::Unauthorized)
        ));

        // A fresh private conversation can be opened again afterwards
        let again = t.db.get_or_create_private_conversation(&a.id, &b.id).unwrap();
        assert_ne!(again, conv);
    }

    #[test]
    fn test_conversation_list_summaries() {
        let t = open_db();
        let a = user(&t.db, "a@example.com");
        let b = user(&t.db, "b@example.com");
        let c = user(&t.db, "c@example.com");

        let with_b = t.db.get_or_create_private_conversation(&a.id, &b.id).unwrap();
        let with_c = t.db.get_or_create_private_conversation(&a.id, &c.id).unwrap();

        say(&t, &with_c, &c.id, "hi from c");
        say(&t, &with_b, &b.id, "hi from b");
        say(&t, &with_b, &b.id, "still b");
        say(&t, &with_b, &a.id, "reply");

        let list = t.db.get_user_conversations(&a.id).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, with_b);
        assert_eq!(list[1].id, with_c);

        assert_eq!(list[0].unread_count, 2);
        assert_eq!(list[0].last_message.as_ref().unwrap().content, "reply");
        assert_eq!(list[0].participants.len(), 1);
        assert_eq!(list[0].participants[0].id, b.id);
        assert!(list[0].is_private);

        t.db.update_last_read(&with_b, &a.id).unwrap();
        let list = t.db.get_user_conversations(&a.id).unwrap();
        assert_eq!(list[0].unread_count, 0);
        assert!(list[0].last_read_at.is_some());
        assert_eq!(list[1].unread_count, 1);

        // b only sees the conversation with a
        let list = t.db.get_user_conversations(&b.id).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].participants[0].id, a.id);
    }

    #[test]
    fn test_group_membership() {
        let t = open_db();
        let a = user(&t.db, "a@example.com");
        let b = user(&t.db, "b@example.com");
        let c = user(&t.db, "c@example.com");

        let group = t
            .db
            .create_group_conversation(&a.id, &[b.id.clone(), b.id.clone()])
            .unwrap();
        assert!(t.db.is_participant(&group, &b.id).unwrap());
        assert!(!t.db.is_participant(&group, &c.id).unwrap());

        assert!(matches!(
            t.db.add_participant(&group, &c.id, &c.id),
            Err(StoreError::Unauthorized)
        ));
        t.db.add_participant(&group, &b.id, &c.id).unwrap();
        t.db.add_participant(&group, &b.id, &c.id).unwrap();
        assert!(t.db.is_participant(&group, &c.id).unwrap());

        let private = t.db.get_or_create_private_conversation(&a.id, &b.id).unwrap();
        assert_ne!(private, group);
        assert!(matches!(
            t.db.add_participant(&private, &a.id, &c.id),
            Err(StoreError::Invalid(_))
        ));
        assert!(matches!(
            t.db.create_group_conversation(&a.id, &[a.id.clone()]),
            Err(StoreError::Invalid(_))
        ));
    }
}
