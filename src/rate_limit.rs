/// Rate Limiting System
///
/// Two layers, independent of the per-account lockout counter: a keyed
/// per-source-address ceiling on the login entry point, and the coarse
/// global ceilings applied to everything else.
use crate::{
    api::middleware::client_ip,
    config::RateLimitConfig,
    error::{CoreError, CoreResult},
};
use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{keyed::DefaultKeyedStateStore, InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;
type KeyedLimiter = GovernorLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    login: Arc<KeyedLimiter>,
    authenticated: Arc<DirectLimiter>,
    unauthenticated: Arc<DirectLimiter>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let login_quota = Quota::per_minute(
            NonZeroU32::new(config.login_per_minute).unwrap_or(NonZeroU32::new(5).unwrap()),
        );

        let auth_quota = Quota::per_second(
            NonZeroU32::new(config.authenticated_rps).unwrap_or(NonZeroU32::new(100).unwrap()),
        )
        .allow_burst(NonZeroU32::new(50).unwrap());

        let unauth_quota = Quota::per_second(
            NonZeroU32::new(config.unauthenticated_rps).unwrap_or(NonZeroU32::new(10).unwrap()),
        )
        .allow_burst(NonZeroU32::new(10).unwrap());

        Self {
            enabled: config.enabled,
            login: Arc::new(GovernorLimiter::keyed(login_quota)),
            authenticated: Arc::new(GovernorLimiter::direct(auth_quota)),
            unauthenticated: Arc::new(GovernorLimiter::direct(unauth_quota)),
        }
    }

    /// Check the per-address login ceiling
    pub fn check_login(&self, source_ip: &str) -> CoreResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match self.login.check_key(&source_ip.to_string()) {
            Ok(_) => Ok(()),
            Err(_) => Err(CoreError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(60),
            }),
        }
    }

    /// Check rate limit for authenticated requests
    pub fn check_authenticated(&self) -> CoreResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match self.authenticated.check() {
            Ok(_) => Ok(()),
            Err(_) => Err(CoreError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(1),
            }),
        }
    }

    /// Check rate limit for unauthenticated requests
    pub fn check_unauthenticated(&self) -> CoreResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match self.unauthenticated.check() {
            Ok(_) => Ok(()),
            Err(_) => Err(CoreError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(1),
            }),
        }
    }
}

/// Rate limiting middleware
///
/// The login entry point gets the keyed per-address check before any of
/// its logic runs; everything else gets the coarse ceilings.
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let is_login =
        request.uri().path() == "/api/login" && request.method() == Method::POST;

    let has_auth_header = request.headers().get("authorization").is_some();

    let result = if is_login {
        let ip = client_ip(request.headers()).unwrap_or_else(|| "unknown".to_string());
        ctx.rate_limiter.check_login(&ip)
    } else if has_auth_header {
        ctx.rate_limiter.check_authenticated()
    } else {
        ctx.rate_limiter.check_unauthenticated()
    };

    match result {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => Err(StatusCode::TOO_MANY_REQUESTS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(login_per_minute: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            login_per_minute,
            unauthenticated_rps: 10,
            authenticated_rps: 100,
        }
    }

    #[test]
    fn test_limiter_allows_first_requests() {
        let limiter = RateLimiter::new(&config(5));
        assert!(limiter.check_login("203.0.113.7").is_ok());
        assert!(limiter.check_authenticated().is_ok());
        assert!(limiter.check_unauthenticated().is_ok());
    }

    #[test]
    fn test_login_ceiling_per_address() {
        let limiter = RateLimiter::new(&config(5));

        for _ in 0..5 {
            assert!(limiter.check_login("203.0.113.7").is_ok());
        }
        // Sixth request from the same address rejects
        assert!(limiter.check_login("203.0.113.7").is_err());

        // A different source address is unaffected
        assert!(limiter.check_login("203.0.113.8").is_ok());
    }

    #[test]
    fn test_disabled_limiter_passes_everything() {
        let mut cfg = config(1);
        cfg.enabled = false;
        let limiter = RateLimiter::new(&cfg);

        for _ in 0..20 {
            assert!(limiter.check_login("203.0.113.7").is_ok());
        }
    }
}
