//! Rate limiting and response header helpers
//!
//! Every request leaving the session manager passes through the same
//! [`HttpHandler`] so the whole process stays under one requests-per-second
//! budget, whatever session generation issued it.

use std::num::NonZeroU32;

use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE};
use reqwest::{Response, StatusCode};

use crate::constants::limits;
use crate::errors::{AuthError, AuthResult};

type DirectRateLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

/// Process-wide request throttle
#[derive(Debug)]
pub struct HttpHandler {
    rate_limiter: DirectRateLimiter,
}

impl HttpHandler {
    /// Creates a new HttpHandler allowing `rate_limit_rps` requests per second
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidConfiguration` if the rate is zero
    pub fn new(rate_limit_rps: u32) -> AuthResult<Self> {
        let rate_limiter = Self::build_rate_limiter(rate_limit_rps)?;
        Ok(Self { rate_limiter })
    }

    fn build_rate_limiter(rate_limit_rps: u32) -> AuthResult<DirectRateLimiter> {
        let quota = Quota::per_second(NonZeroU32::new(rate_limit_rps).ok_or_else(|| {
            AuthError::InvalidConfiguration {
                reason: "Rate limit must be non-zero".to_string(),
            }
        })?);
        Ok(RateLimiter::direct(quota))
    }

    /// Waits for a request slot, with jitter to avoid thundering herd
    pub async fn throttle(&self) {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(limits::RATE_LIMIT_JITTER))
            .await;
    }
}

/// Parses the complete length out of a `Content-Range` value
///
/// Accepts both `bytes 0-99/1234` and the unsatisfied-range form `bytes */1234`.
/// An unknown length (`/*`) yields `None`.
pub fn parse_complete_length(content_range: &str) -> Option<u64> {
    let rest = content_range.trim().strip_prefix("bytes")?.trim_start();
    let (_, total) = rest.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// Complete length announced by a response's `Content-Range` header
pub fn content_range_total(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_complete_length)
}

/// Full size of the remote file as reported by a download response
///
/// For `206 Partial Content` this is the complete length from `Content-Range`,
/// falling back to `offset + Content-Length`. For a plain `200` it is the
/// `Content-Length`.
pub fn reported_size(response: &Response, offset: u64) -> Option<u64> {
    let content_length = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());

    if response.status() == StatusCode::PARTIAL_CONTENT {
        content_range_total(response).or_else(|| content_length.map(|len| offset + len))
    } else {
        content_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_creation() {
        let handler = HttpHandler::new(5).unwrap();
        // First slot is always available immediately
        handler.throttle().await;
    }

    #[test]
    fn test_rate_limiter_zero_fails() {
        assert!(matches!(
            HttpHandler::new(0),
            Err(AuthError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_parse_complete_length() {
        assert_eq!(parse_complete_length("bytes 100-199/1234"), Some(1234));
        assert_eq!(parse_complete_length("bytes */5000"), Some(5000));
        assert_eq!(parse_complete_length("bytes 0-9/*"), None);
        assert_eq!(parse_complete_length("items 0-9/10"), None);
        assert_eq!(parse_complete_length(""), None);
    }
}
