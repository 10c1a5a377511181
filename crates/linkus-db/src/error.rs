use rusqlite::ErrorCode;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure kinds shared by the conversation, message and contact stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The caller has no participant row for the conversation.
    #[error("not a participant of this conversation")]
    Unauthorized,

    #[error("no matching record")]
    NotFound,

    #[error("invalid request: {0}")]
    Invalid(String),

    /// The underlying database failed. Never retried here.
    #[error("database unavailable: {0}")]
    BackendUnavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::BackendUnavailable(e.to_string())
    }
}

/// Account creation failures, tagged with a stable code for API clients.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("User already exists with this email")]
    UserExists,

    #[error("Error creating user: {0}")]
    Db(String),

    #[error("Unexpected error creating user: {0}")]
    Unexpected(String),
}

impl AccountError {
    pub fn code(&self) -> &'static str {
        match self {
            AccountError::UserExists => "USER_EXISTS",
            AccountError::Db(_) => "DB_ERROR",
            AccountError::Unexpected(_) => "UNEXPECTED_ERROR",
        }
    }
}

impl From<rusqlite::Error> for AccountError {
    fn from(e: rusqlite::Error) -> Self {
        AccountError::Db(e.to_string())
    }
}

impl From<StoreError> for AccountError {
    fn from(e: StoreError) -> Self {
        AccountError::Db(e.to_string())
    }
}

/// True when the error is a UNIQUE / FOREIGN KEY / CHECK violation.
pub(crate) fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

pub(crate) fn is_foreign_key_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

/// True when a constraint violation message names the given column.
pub(crate) fn violates_column(e: &rusqlite::Error, column: &str) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, Some(msg)) => {
            err.code == ErrorCode::ConstraintViolation && msg.contains(column)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_error_codes() {
        assert_eq!(AccountError::UserExists.code(), "USER_EXISTS");
        assert_eq!(AccountError::Db("x".into()).code(), "DB_ERROR");
        assert_eq!(AccountError::Unexpected("x".into()).code(), "UNEXPECTED_ERROR");
    }

    #[test]
    fn test_rusqlite_errors_are_backend_failures() {
        let err: StoreError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, StoreError::BackendUnavailable(_)));
    }
}
