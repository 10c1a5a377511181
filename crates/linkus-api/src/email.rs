use anyhow::{Context, Result};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SmtpSettings;

const SENDER_NAME: &str = "LinkUs";
const FALLBACK_FROM: &str = "no-reply@localhost";
const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("SMTP is not configured")]
    NotConfigured,

    #[error("invalid recipient address: {0}")]
    Address(String),

    #[error("failed to build email: {0}")]
    Build(String),

    #[error("SMTP delivery failed: {0}")]
    Transport(String),
}

/// Outbound verification mail over SMTP.
///
/// Without an SMTP host the mailer stays in no-op mode: it logs the link it
/// would have sent and reports [`MailError::NotConfigured`].
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
    backend_url: String,
}

impl Mailer {
    pub fn new(settings: &SmtpSettings, backend_url: &str) -> Result<Self> {
        let from_addr = settings
            .from_email
            .as_deref()
            .or(settings.username.as_deref())
            .unwrap_or(FALLBACK_FROM);
        let from = Mailbox::new(
            Some(SENDER_NAME.to_string()),
            from_addr
                .parse::<Address>()
                .with_context(|| format!("invalid sender address {:?}", from_addr))?,
        );

        let transport = match settings.host.as_deref() {
            None => {
                warn!("SMTP host not configured; verification emails will only be logged");
                None
            }
            Some(host) => {
                let builder = if settings.port == IMPLICIT_TLS_PORT {
                    AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                }
                .with_context(|| format!("failed to configure SMTP transport for {}", host))?
                .port(settings.port);

                let builder = match (&settings.username, &settings.password) {
                    (Some(user), Some(pass)) => {
                        builder.credentials(Credentials::new(user.clone(), pass.clone()))
                    }
                    _ => builder,
                };
                Some(builder.build())
            }
        };

        Ok(Self {
            transport,
            from,
            backend_url: backend_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Check that the relay accepts connections. Only logs; never fatal.
    pub async fn verify_connection(&self) -> bool {
        let Some(transport) = &self.transport else {
            warn!("Email credentials not configured");
            return false;
        };

        match transport.test_connection().await {
            Ok(true) => {
                info!("Email service configured successfully");
                true
            }
            Ok(false) => {
                warn!("SMTP relay refused the test connection");
                false
            }
            Err(e) => {
                warn!("Email service configuration failed: {}", e);
                false
            }
        }
    }

    pub fn verification_url(&self, token: &str) -> String {
        format!("{}/api/auth/verify-email/{}", self.backend_url, token)
    }

    /// Send the verification link. Returns the Message-ID on success.
    pub async fn send_verification_email(&self, recipient: &str, token: &str) -> Result<String, MailError> {
        let link = self.verification_url(token);

        let Some(transport) = &self.transport else {
            info!(recipient, link = %link, "Mailer in no-op mode; skipping verification email");
            return Err(MailError::NotConfigured);
        };

        let to = recipient
            .parse::<Mailbox>()
            .map_err(|e| MailError::Address(e.to_string()))?;
        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain());

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("Verify your email address")
            .message_id(Some(message_id.clone()))
            .multipart(MultiPart::alternative_plain_html(
                verification_text(&link),
                verification_html(&link),
            ))
            .map_err(|e| MailError::Build(e.to_string()))?;

        transport
            .send(email)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        info!(recipient, message_id = %message_id, "Verification email sent");
        Ok(message_id)
    }
}

fn verification_text(link: &str) -> String {
    format!(
        "Thanks for signing up to LinkUs.\n\n\
         Please verify your email address to finish your registration:\n{}\n\n\
         If you did not create this account, you can ignore this email.",
        link
    )
}

fn verification_html(link: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2 style="color: #333; text-align: center;">Thanks for signing up. Please verify your email address to finish your registration.</h2>
  <div style="text-align: center; margin: 30px 0;">
    <a href="{link}" style="background-color: #007bff; color: white; padding: 12px 30px; text-decoration: none; border-radius: 5px; display: inline-block;">Verify email address</a>
  </div>
  <p style="color: #666; font-size: 14px;">If the button does not work, copy this link into your browser:<br><a href="{link}">{link}</a></p>
  <p style="color: #666; font-size: 14px;">If you did not create this account, you can ignore this email.</p>
</div>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_url() {
        let mailer = Mailer::new(&SmtpSettings::default(), "https://api.example.com/").unwrap();
        assert!(!mailer.is_enabled());
        assert_eq!(
            mailer.verification_url("abc"),
            "https://api.example.com/api/auth/verify-email/abc"
        );
    }

    #[test]
    fn test_sender_falls_back_to_smtp_user() {
        let settings = SmtpSettings {
            username: Some("mailer@example.com".into()),
            ..SmtpSettings::default()
        };
        let mailer = Mailer::new(&settings, "http://localhost:3001").unwrap();
        assert_eq!(mailer.from.email.to_string(), "mailer@example.com");
        assert_eq!(mailer.from.name.as_deref(), Some("LinkUs"));
    }

    #[test]
    fn test_invalid_sender_is_rejected() {
        let settings = SmtpSettings {
            from_email: Some("not an address".into()),
            ..SmtpSettings::default()
        };
        assert!(Mailer::new(&settings, "http://localhost:3001").is_err());
    }

    #[tokio::test]
    async fn test_noop_mode_reports_not_configured() {
        let mailer = Mailer::new(&SmtpSettings::default(), "http://localhost:3001").unwrap();
        let result = mailer.send_verification_email("ada@example.com", "tok").await;
        assert!(matches!(result, Err(MailError::NotConfigured)));
    }

    #[test]
    fn test_bodies_carry_the_link() {
        let link = "http://localhost:3001/api/auth/verify-email/t";
        assert!(verification_text(link).contains(link));
        assert!(verification_html(link).contains(link));
    }
}
