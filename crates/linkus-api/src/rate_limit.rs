use std::net::SocketAddr;
use std::num::NonZeroU32;

use anyhow::{Result, anyhow};
use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::{debug, warn};

use linkus_types::api::Claims;

use crate::auth::AppState;
use crate::config::RateLimitSettings;

/// Keyed limiter: at most `max_requests` per `window`, per client key. A
/// drained bucket refills one request per full window.
pub struct RequestLimiter {
    name: &'static str,
    limiter: DefaultKeyedRateLimiter<String>,
    clock: DefaultClock,
}

impl RequestLimiter {
    pub fn new(name: &'static str, settings: &RateLimitSettings) -> Result<Self> {
        let burst = NonZeroU32::new(settings.max_requests)
            .ok_or_else(|| anyhow!("{} rate limit must allow at least one request", name))?;
        let quota = Quota::with_period(settings.window)
            .ok_or_else(|| anyhow!("{} rate limit window must be non-zero", name))?
            .allow_burst(burst);

        Ok(Self {
            name,
            limiter: RateLimiter::keyed(quota),
            clock: DefaultClock::default(),
        })
    }

    /// `Err(secs)` carries how long the client should wait, at least 1s.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        self.limiter.check_key(&key.to_string()).map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            wait.as_secs_f64().round().max(1.0) as u64
        })
    }

    /// Drop buckets that have fully refilled. Returns how many keys remain.
    pub fn prune(&self) -> usize {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        let remaining = self.limiter.len();
        debug!("{} limiter: {} active keys", self.name, remaining);
        remaining
    }
}

pub async fn limit_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    enforce(&state.auth_limiter, req, next).await
}

pub async fn limit_general(State(state): State<AppState>, req: Request, next: Next) -> Response {
    enforce(&state.general_limiter, req, next).await
}

async fn enforce(limiter: &RequestLimiter, req: Request, next: Next) -> Response {
    let key = client_key(&req);
    match limiter.check(&key) {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            warn!("{} limiter rejected {} (retry in {}s)", limiter.name, key, retry_after);
            too_many_requests(retry_after)
        }
    }
}

/// `{ip}_{user_id}`, with `anonymous` for unauthenticated requests.
fn client_key(req: &Request) -> String {
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".into());
    let user = req
        .extensions()
        .get::<Claims>()
        .map(|claims| claims.sub.to_string())
        .unwrap_or_else(|| "anonymous".into());
    format!("{}_{}", ip, user)
}

fn too_many_requests(retry_after: u64) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "success": false,
            "message": "Too many requests",
            "retryAfter": retry_after,
        })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn limiter(max_requests: u32, secs: u64) -> RequestLimiter {
        RequestLimiter::new(
            "test",
            &RateLimitSettings {
                max_requests,
                window: Duration::from_secs(secs),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_burst_then_reject() {
        let limiter = limiter(5, 900);
        for _ in 0..5 {
            assert!(limiter.check("1.2.3.4_anonymous").is_ok());
        }
        let wait = limiter.check("1.2.3.4_anonymous").unwrap_err();
        assert!(wait >= 1 && wait <= 900);

        // Other keys have their own bucket
        assert!(limiter.check("5.6.7.8_anonymous").is_ok());
    }

    #[test]
    fn test_window_caps_accepted_requests() {
        let limiter = RequestLimiter::new(
            "test",
            &RateLimitSettings {
                max_requests: 3,
                window: Duration::from_millis(1_000),
            },
        )
        .unwrap();

        let started = std::time::Instant::now();
        let mut accepted = 0;
        while started.elapsed() < Duration::from_millis(900) {
            if limiter.check("9.9.9.9_anonymous").is_ok() {
                accepted += 1;
            }
            std::thread::sleep(Duration::from_millis(25));
        }
        assert_eq!(accepted, 3);
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        assert!(RequestLimiter::new("x", &RateLimitSettings { max_requests: 0, window: Duration::from_secs(60) }).is_err());
        assert!(RequestLimiter::new("x", &RateLimitSettings { max_requests: 5, window: Duration::ZERO }).is_err());
    }

    #[test]
    fn test_rejection_response() {
        let response = too_many_requests(42);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
