use rusqlite::{Connection, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AccountError, StoreResult, is_constraint_violation, violates_column};
use crate::models::UserRow;
use crate::{Database, OptionalExt, now_timestamp, username};

const USER_COLUMNS: &str = "id, email, username, full_name, password_hash, avatar_url, \
     email_verified, email_verification_token, created_at";

const USERNAME_ATTEMPTS: usize = 8;

pub struct NewUser {
    pub email: String,
    /// Already-hashed credential; the DB layer never sees plaintext.
    pub password_hash: String,
    pub full_name: String,
}

impl Database {
    /// Create an unverified account with a fresh verification token and a
    /// generated username. The email is trimmed and lowercased first.
    pub fn create_user(&self, new_user: NewUser) -> Result<UserRow, AccountError> {
        let email = new_user.email.trim().to_lowercase();
        let full_name = new_user.full_name.trim().to_string();

        self.with_tx(|tx| {
            let exists: Option<String> = tx
                .query_row("SELECT id FROM users WHERE email = ?1", [&email], |row| row.get(0))
                .optional()?;
            if exists.is_some() {
                return Err(AccountError::UserExists);
            }

            let id = Uuid::new_v4().to_string();
            let token = Uuid::new_v4().to_string();
            let created_at = now_timestamp();

            for _ in 0..USERNAME_ATTEMPTS {
                let candidate = username::generate(&email);
                let inserted = tx.execute(
                    "INSERT INTO users (id, email, username, full_name, password_hash, email_verification_token, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![id, email, candidate, full_name, new_user.password_hash, token, created_at],
                );

                match inserted {
                    Ok(_) => {
                        debug!("Created user {} ({})", id, candidate);
                        return Ok(UserRow {
                            id,
                            email,
                            username: candidate,
                            full_name,
                            password_hash: new_user.password_hash,
                            avatar_url: None,
                            email_verified: false,
                            email_verification_token: Some(token),
                            created_at,
                        });
                    }
                    Err(e) if violates_column(&e, "users.username") => {
                        debug!("Username {} taken, retrying", candidate);
                    }
                    Err(e) if violates_column(&e, "users.email") => {
                        return Err(AccountError::UserExists);
                    }
                    Err(e) if is_constraint_violation(&e) => {
                        warn!("Constraint violation creating user: {}", e);
                        return Err(AccountError::Db(e.to_string()));
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            Err(AccountError::Unexpected(format!(
                "no free username after {} attempts",
                USERNAME_ATTEMPTS
            )))
        })
    }

    pub fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRow>> {
        let email = email.trim().to_lowercase();
        self.with_conn(|conn| query_user(conn, "email", &email))
    }

    pub fn get_user_by_id(&self, id: &str) -> StoreResult<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Consume a verification token. Returns `None` for unknown or
    /// already-used tokens.
    pub fn verify_email(&self, token: &str) -> StoreResult<Option<UserRow>> {
        self.with_tx(|tx| {
            let sql = format!(
                "UPDATE users SET email_verified = 1, email_verification_token = NULL
                 WHERE email_verification_token = ?1
                 RETURNING {}",
                USER_COLUMNS
            );
            tx.query_row(&sql, [token], user_from_row).optional()
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> StoreResult<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    conn.query_row(&sql, [value], user_from_row).optional()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        full_name: row.get(3)?,
        password_hash: row.get(4)?,
        avatar_url: row.get(5)?,
        email_verified: row.get(6)?,
        email_verification_token: row.get(7)?,
        created_at: row.get(8)?,
    })
}
