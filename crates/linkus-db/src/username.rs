use rand::Rng;

const MAX_BASE_LEN: usize = 20;
const FALLBACK_BASE: &str = "user";

/// Username stem derived from an email's local part: lowercase
/// `[a-z0-9_]` only, at most 20 characters.
pub fn base_username(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let base: String = local
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(MAX_BASE_LEN)
        .collect();

    if base.is_empty() {
        FALLBACK_BASE.to_string()
    } else {
        base
    }
}

/// Candidate username: the email stem plus a random 4-digit suffix.
/// Callers retry with a fresh candidate on collision.
pub fn generate(email: &str) -> String {
    let suffix: u16 = rand::rng().random_range(0..10_000);
    format!("{}_{:04}", base_username(email), suffix)
}
