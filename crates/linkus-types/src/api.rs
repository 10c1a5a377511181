use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::{MessageType, UserSummary};

// -- JWT Claims --

/// JWT claims issued at login and checked by the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Errors --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Uniform failure body: `{ "success": false, "message": ..., "errors": [...] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<FieldError>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            errors: vec![],
        }
    }
}

// -- Auth --

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    #[validate(
        required(message = "Email is required"),
        email(message = "Please provide a valid email address")
    )]
    pub email: Option<String>,

    #[validate(
        required(message = "Password is required"),
        custom(function = "password_length")
    )]
    pub password: Option<String>,

    #[validate(
        required(message = "Full name is required"),
        custom(function = "full_name_length")
    )]
    pub full_name: Option<String>,
}

impl RegisterRequest {
    /// Trim text fields and lowercase the email. Run before validation so the
    /// length rules apply to what gets stored.
    pub fn normalized(self) -> Self {
        Self {
            email: self.email.map(|e| e.trim().to_lowercase()),
            password: self.password,
            full_name: self.full_name.map(|n| n.trim().to_string()),
        }
    }
}

fn password_length(password: &str) -> Result<(), ValidationError> {
    char_bounds(
        password,
        6,
        50,
        "Password must be at least 6 characters long",
        "Password must not exceed 50 characters",
    )
}

fn full_name_length(full_name: &str) -> Result<(), ValidationError> {
    char_bounds(
        full_name,
        2,
        100,
        "Full name must be at least 2 characters long",
        "Full name must not exceed 100 characters",
    )
}

/// Length check with a separate message for each bound.
fn char_bounds(
    value: &str,
    min: usize,
    max: usize,
    too_short: &'static str,
    too_long: &'static str,
) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len < min {
        Err(ValidationError::new("min_length").with_message(too_short.into()))
    } else if len > max {
        Err(ValidationError::new("max_length").with_message(too_long.into()))
    } else {
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub user: UserSummary,
    pub email_sent: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenPrivateConversationRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddParticipantRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationIdResponse {
    pub conversation_id: Uuid,
}

// -- Messages --

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_message_payload"))]
pub struct SendMessageRequest {
    #[serde(default)]
    #[validate(length(max = 5000, message = "Message must not exceed 5000 characters"))]
    pub content: String,

    #[serde(default)]
    pub message_type: MessageType,

    #[validate(url(message = "File URL must be a valid URL"))]
    pub file_url: Option<String>,

    #[validate(length(max = 255, message = "File name must not exceed 255 characters"))]
    pub file_name: Option<String>,

    #[validate(range(min = 0, message = "File size cannot be negative"))]
    pub file_size: Option<i64>,
}

fn validate_message_payload(req: &SendMessageRequest) -> Result<(), ValidationError> {
    match req.message_type {
        MessageType::Text if req.content.trim().is_empty() => Err(ValidationError::new("empty")
            .with_message("Text messages need content".into())),
        MessageType::File | MessageType::Image if req.file_url.is_none() => {
            Err(ValidationError::new("missing_file")
                .with_message("File messages need a file_url".into()))
        }
        _ => Ok(()),
    }
}

// -- Contacts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddContactRequest {
    pub contact_user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IsContactResponse {
    pub is_contact: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(email: &str, password: &str, full_name: &str) -> RegisterRequest {
        RegisterRequest {
            email: Some(email.to_string()),
            password: Some(password.to_string()),
            full_name: Some(full_name.to_string()),
        }
        .normalized()
    }

    #[test]
    fn test_register_request_validation() {
        assert!(register("ada@example.com", "secret1", "Ada Lovelace").validate().is_ok());
        assert!(register("not-an-email", "secret1", "Ada").validate().is_err());
        assert!(register("ada@example.com", "short", "Ada").validate().is_err());
        assert!(register("ada@example.com", &"x".repeat(51), "Ada").validate().is_err());
        // Trimmed before the length check
        assert!(register("ada@example.com", "secret1", "  A  ").validate().is_err());
        assert!(register("ada@example.com", "secret1", &"n".repeat(101)).validate().is_err());
    }

    #[test]
    fn test_register_request_missing_fields() {
        let req: RegisterRequest = serde_json::from_str(r#"{"email":"ada@example.com"}"#).unwrap();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("password"));
        assert!(fields.contains_key("full_name"));
        assert!(!fields.contains_key("email"));
    }

    #[test]
    fn test_each_length_bound_has_its_own_message() {
        let message = |req: RegisterRequest, field: &str| {
            let errors = req.validate().unwrap_err();
            errors.field_errors()[field][0].message.as_ref().unwrap().to_string()
        };

        assert_eq!(
            message(register("ada@example.com", "short", "Ada"), "password"),
            "Password must be at least 6 characters long"
        );
        assert_eq!(
            message(register("ada@example.com", &"x".repeat(51), "Ada"), "password"),
            "Password must not exceed 50 characters"
        );
        assert_eq!(
            message(register("ada@example.com", "secret1", "A"), "full_name"),
            "Full name must be at least 2 characters long"
        );
        assert_eq!(
            message(register("ada@example.com", "secret1", &"n".repeat(101)), "full_name"),
            "Full name must not exceed 100 characters"
        );
    }

    #[test]
    fn test_normalized_email() {
        let req = register("  Ada@Example.COM ", "secret1", " Ada ");
        assert_eq!(req.email.as_deref(), Some("ada@example.com"));
        assert_eq!(req.full_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_send_message_payload_rules() {
        let text: SendMessageRequest = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(text.message_type, MessageType::Text);
        assert!(text.validate().is_ok());

        let blank: SendMessageRequest = serde_json::from_str(r#"{"content":"   "}"#).unwrap();
        assert!(blank.validate().is_err());

        let file: SendMessageRequest =
            serde_json::from_str(r#"{"message_type":"file","file_name":"a.pdf"}"#).unwrap();
        assert!(file.validate().is_err());

        let file: SendMessageRequest = serde_json::from_str(
            r#"{"message_type":"file","file_url":"https://cdn.example.com/a.pdf","file_size":10}"#,
        )
        .unwrap();
        assert!(file.validate().is_ok());
    }
}
