use tracing::debug;
use uuid::Uuid;

use crate::conversations::require_users;
use crate::error::{StoreError, StoreResult, is_constraint_violation};
use crate::models::{ContactDetailRow, ContactRow, ProfileRow};
use crate::{Database, OptionalExt, now_timestamp};

impl Database {
    /// Add a directed contact edge from `user_id` to `contact_user_id`.
    pub fn add_contact(&self, user_id: &str, contact_user_id: &str) -> StoreResult<ContactRow> {
        if user_id == contact_user_id {
            return Err(StoreError::Invalid("cannot add yourself as a contact".into()));
        }

        self.with_tx(|tx| {
            require_users(tx, &[user_id, contact_user_id])?;

            let row = ContactRow {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                contact_user_id: contact_user_id.to_string(),
                created_at: now_timestamp(),
            };
            match tx.execute(
                "INSERT INTO contacts (id, user_id, contact_user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                [&row.id, &row.user_id, &row.contact_user_id, &row.created_at],
            ) {
                Ok(_) => {
                    debug!("User {} added contact {}", user_id, contact_user_id);
                    Ok(row)
                }
                Err(e) if is_constraint_violation(&e) => {
                    Err(StoreError::Invalid("already in contacts".into()))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Returns `false` when there was no such contact.
    pub fn remove_contact(&self, user_id: &str, contact_user_id: &str) -> StoreResult<bool> {
        self.with_tx(|tx| {
            let removed = tx.execute(
                "DELETE FROM contacts WHERE user_id = ?1 AND contact_user_id = ?2",
                [user_id, contact_user_id],
            )?;
            Ok(removed > 0)
        })
    }

    /// The user's contacts with profile details, ordered by username.
    pub fn list_contacts(&self, user_id: &str) -> StoreResult<Vec<ContactDetailRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.full_name, u.avatar_url, u.email, c.created_at
                 FROM contacts c
                 JOIN users u ON u.id = c.contact_user_id
                 WHERE c.user_id = ?1
                 ORDER BY u.username",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ContactDetailRow {
                        contact: ProfileRow {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            full_name: row.get(2)?,
                            avatar_url: row.get(3)?,
                        },
                        email: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn is_contact(&self, user_id: &str, contact_user_id: &str) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM contacts WHERE user_id = ?1 AND contact_user_id = ?2",
                    [user_id, contact_user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }
}
