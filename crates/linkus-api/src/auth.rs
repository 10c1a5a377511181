use std::sync::{Arc, LazyLock};

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info, warn};
use uuid::Uuid;

use linkus_db::accounts::NewUser;
use linkus_db::models::UserRow;
use linkus_db::{AccountError, Database, StoreError};
use linkus_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use linkus_types::models::UserSummary;

use crate::config::Config;
use crate::convert::parse_id;
use crate::email::{MailError, Mailer};
use crate::error::{ApiError, validate};
use crate::extract::ApiJson;
use crate::pages;
use crate::rate_limit::RequestLimiter;

pub type AppState = Arc<AppStateInner>;

/// Verified against when the email is unknown so both paths cost one Argon2 run.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("linkus-no-such-account").ok());

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub frontend_url: String,
    pub mailer: Mailer,
    pub auth_limiter: RequestLimiter,
    pub general_limiter: RequestLimiter,
}

impl AppStateInner {
    pub fn new(config: &Config, db: Database) -> anyhow::Result<AppState> {
        Ok(Arc::new(Self {
            db,
            jwt_secret: config.jwt_secret.clone(),
            frontend_url: config.frontend_url.trim_end_matches('/').to_string(),
            mailer: Mailer::new(&config.smtp, &config.backend_url)?,
            auth_limiter: RequestLimiter::new("auth", &config.auth_rate_limit)?,
            general_limiter: RequestLimiter::new("general", &config.rate_limit)?,
        }))
    }
}

/// Run a blocking DB call off the async runtime.
pub(crate) async fn run_db<F, T, E>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| ApiError::Internal(format!("spawn_blocking join error: {}", e)))?
        .map_err(Into::into)
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let req = req.normalized();
    validate(&req)?;

    let (Some(email), Some(password), Some(full_name)) = (req.email, req.password, req.full_name) else {
        return Err(ApiError::BadRequest("Missing required fields".into()));
    };

    // Hashing is CPU-bound, so it shares the blocking task with the insert
    let user = run_db(&state, move |db| -> Result<UserRow, AccountError> {
        let password_hash = hash_password(&password).map_err(|e| AccountError::Unexpected(e.to_string()))?;
        db.create_user(NewUser {
            email,
            password_hash,
            full_name,
        })
    })
    .await?;

    let email_sent = match &user.email_verification_token {
        Some(token) => match state.mailer.send_verification_email(&user.email, token).await {
            Ok(_) => true,
            Err(MailError::NotConfigured) => false,
            Err(e) => {
                warn!("Verification email to {} failed: {}", user.email, e);
                false
            }
        },
        None => false,
    };

    info!("Registered user {} ({})", user.id, user.username);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: "User registered successfully. Please check your email for verification.".into(),
            user: UserSummary {
                id: parse_id(&user.id, "user"),
                email: user.email,
                username: user.username,
                full_name: user.full_name,
            },
            email_sent,
        }),
    ))
}

/// Landing page for the link in the verification email.
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> (StatusCode, Html<String>) {
    let login_url = format!("{}/login", state.frontend_url);

    match run_db(&state, move |db| db.verify_email(&token)).await {
        Ok(Some(user)) => {
            info!("Verified email for user {}", user.id);
            (StatusCode::OK, Html(pages::verification_success(&login_url)))
        }
        Ok(None) => (StatusCode::BAD_REQUEST, Html(pages::verification_failed(&login_url))),
        Err(e) => {
            error!("Email verification failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Html(pages::server_error(&login_url)))
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let LoginRequest { email, password } = req;
    let user = run_db(&state, move |db| -> Result<Option<UserRow>, StoreError> {
        Ok(check_credentials(db.find_by_email(&email)?, &password))
    })
    .await?
    .ok_or(ApiError::InvalidCredentials)?;

    if !user.email_verified {
        return Err(ApiError::Forbidden("Please verify your email before logging in".into()));
    }

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| ApiError::Internal(format!("corrupt user id '{}': {}", user.id, e)))?;

    let token = create_token(&state.jwt_secret, user_id, &user.username)
        .map_err(|e| ApiError::Internal(format!("token encoding failed: {}", e)))?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

fn check_credentials(user: Option<UserRow>, password: &str) -> Option<UserRow> {
    match user {
        Some(user) => verify_password(password, &user.password_hash).then_some(user),
        None => {
            if let Some(hash) = DUMMY_HASH.as_deref() {
                verify_password(password, hash);
            }
            None
        }
    }
}

fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

pub(crate) fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
