use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;
use validator::{Validate, ValidationErrors};

use linkus_db::{AccountError, StoreError};
use linkus_types::api::{ErrorResponse, FieldError};

/// Every failure a handler can return. `Unauthorized` and `NotFound` from the
/// stores both surface as 404 so callers cannot probe for conversations.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation error")]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Forbidden(String),

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    /// The cause is logged, never sent to the client.
    #[error("Internal server error")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unauthorized | StoreError::NotFound => ApiError::NotFound,
            StoreError::Invalid(reason) => ApiError::BadRequest(reason),
            StoreError::BackendUnavailable(cause) => ApiError::Internal(cause),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        let code = e.code();
        match e {
            AccountError::UserExists => ApiError::Conflict("User with this email already exists".into()),
            AccountError::Db(cause) | AccountError::Unexpected(cause) => {
                ApiError::Internal(format!("{}: {}", code, cause))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(cause) => {
                error!("Internal error: {}", cause);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let mut body = ErrorResponse::new(self.to_string());
        if let ApiError::Validation(errors) = self {
            body.errors = errors;
        }

        (status, Json(body)).into_response()
    }
}

/// Run `validator` rules and flatten failures into `{field, message}` pairs.
pub fn validate<T: Validate>(req: &T) -> Result<(), ApiError> {
    req.validate().map_err(|e| ApiError::Validation(field_errors(&e)))
}

fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            // Struct-level rules are reported under "__all__"
            let field = if field == "__all__" { "body".to_string() } else { field.to_string() };
            errs.iter().map(move |e| FieldError {
                field: field.clone(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field)),
            })
        })
        .collect();

    // HashMap order is arbitrary
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}
