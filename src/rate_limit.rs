/// Rate Limiting
///
/// Two directions: an inbound limiter on the HTTP surface, and an outbound
/// [`CallGate`] that spaces calls to rate-sensitive upstream APIs.
use crate::error::{DidError, DidResult, ErrorResponse};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::Instant};

/// Inbound rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Requests per second
    pub requests_per_second: u32,
    /// Burst size
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 20,
            burst_size: 40,
        }
    }
}

/// Inbound request limiter
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Option<Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        if !config.enabled {
            return Self { limiter: None };
        }

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(per_second);
        let quota = Quota::per_second(per_second).allow_burst(burst);

        Self {
            limiter: Some(Arc::new(GovernorLimiter::direct(quota))),
        }
    }

    /// Check the limit for one request
    pub fn check(&self) -> DidResult<()> {
        match &self.limiter {
            Some(limiter) => limiter
                .check()
                .map_err(|_| DidError::Validation("Rate limit exceeded".to_string())),
            None => Ok(()),
        }
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Response {
    match ctx.rate_limiter.check() {
        Ok(()) => next.run(request).await,
        Err(_) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse {
                error: "RateLimitExceeded".to_string(),
                message: "Rate limit exceeded".to_string(),
            }),
        )
            .into_response(),
    }
}

/// Minimum spacing between outbound calls
///
/// `wait` sleeps for whatever remains of `min_interval` since the previous
/// call, then stamps the new call time. Callers are serialized through the
/// gate so spacing holds across concurrent users.
#[derive(Debug, Clone)]
pub struct CallGate {
    min_interval: Duration,
    last_call: Arc<Mutex<Option<Instant>>>,
}

impl CallGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Arc::new(Mutex::new(None)),
        }
    }

    /// Gate with no spacing
    pub fn unrestricted() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn test_burst_limit() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: true,
            requests_per_second: 1,
            burst_size: 5,
        });

        for _ in 0..5 {
            assert!(limiter.check().is_ok());
        }
        assert!(limiter.check().is_err());
    }

    #[test]
    fn test_disabled_limiter_never_blocks() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: false,
            requests_per_second: 1,
            burst_size: 1,
        });
        for _ in 0..100 {
            assert!(limiter.check().is_ok());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_gate_spaces_calls() {
        let gate = CallGate::new(Duration::from_millis(350));
        let start = Instant::now();

        gate.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        gate.wait().await;
        gate.wait().await;
        assert_eq!(start.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_gate_only_sleeps_remainder() {
        let gate = CallGate::new(Duration::from_millis(350));
        gate.wait().await;

        tokio::time::advance(Duration::from_millis(300)).await;
        let before = Instant::now();
        gate.wait().await;
        assert_eq!(before.elapsed(), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrestricted_gate_never_sleeps() {
        let gate = CallGate::unrestricted();
        let start = Instant::now();
        for _ in 0..10 {
            gate.wait().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
