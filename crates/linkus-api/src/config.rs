use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// JWT secrets that only make sense on a developer machine.
pub const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// Public base URL of this server, used in verification links.
    pub backend_url: String,
    /// Where the verification pages send people afterwards.
    pub frontend_url: String,
    pub smtp: SmtpSettings,
    /// Applied to register and login.
    pub auth_rate_limit: RateLimitSettings,
    /// Applied to every other route.
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone, Default)]
pub struct SmtpSettings {
    /// No host means the mailer runs in no-op mode.
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3001,
            db_path: PathBuf::from("linkus.db"),
            jwt_secret: "dev-secret-change-me".into(),
            backend_url: "http://localhost:3001".into(),
            frontend_url: "http://localhost:3000".into(),
            smtp: SmtpSettings {
                port: 587,
                ..SmtpSettings::default()
            },
            auth_rate_limit: RateLimitSettings {
                max_requests: 5,
                window: Duration::from_secs(15 * 60),
            },
            rate_limit: RateLimitSettings {
                max_requests: 100,
                window: Duration::from_secs(60 * 60),
            },
        }
    }
}

impl Config {
    /// Build the config from environment variables, falling back to the
    /// development defaults. Load `.env` before calling this.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        Ok(Self {
            host: var_opt("LINKUS_HOST").unwrap_or(defaults.host),
            port: parse_var("LINKUS_PORT", defaults.port)?,
            db_path: var_opt("LINKUS_DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            jwt_secret: var_opt("LINKUS_JWT_SECRET").unwrap_or(defaults.jwt_secret),
            backend_url: var_opt("BACKEND_URL").unwrap_or(defaults.backend_url),
            frontend_url: var_opt("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            smtp: SmtpSettings {
                host: var_opt("SMTP_HOST"),
                port: parse_var("SMTP_PORT", defaults.smtp.port)?,
                username: var_opt("SMTP_USER"),
                password: var_opt("SMTP_PASS"),
                from_email: var_opt("FROM_EMAIL"),
            },
            auth_rate_limit: RateLimitSettings {
                max_requests: parse_var("LINKUS_AUTH_RATE_LIMIT", defaults.auth_rate_limit.max_requests)?,
                window: Duration::from_secs(parse_var(
                    "LINKUS_AUTH_RATE_WINDOW_SECS",
                    defaults.auth_rate_limit.window.as_secs(),
                )?),
            },
            rate_limit: RateLimitSettings {
                max_requests: parse_var("LINKUS_RATE_LIMIT", defaults.rate_limit.max_requests)?,
                window: Duration::from_secs(parse_var(
                    "LINKUS_RATE_WINDOW_SECS",
                    defaults.rate_limit.window.as_secs(),
                )?),
            },
        })
    }

    pub fn uses_placeholder_secret(&self) -> bool {
        self.jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str())
    }
}

/// Unset and empty variables are treated the same.
fn var_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var_opt(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", name, raw)),
        None => Ok(default),
    }
}
