/*
 * Copyright 2025 Oxide Computer Company
 */

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;

/**
 * Transport-level retry behaviour attached to every request a client makes:
 * a small bounded number of retries with exponential backoff, for statuses
 * that indicate transient overload on the controller.
 */
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /** Retries after the initial attempt. */
    pub max_retries: u32,
    /** Base for the exponential backoff schedule, in seconds. */
    pub backoff_factor: f64,
    /** Statuses that are worth another attempt. */
    pub retry_status: Vec<StatusCode>,
    /** Prefer a server-supplied Retry-After delay over our own schedule. */
    pub respect_retry_after: bool,
    /** Redirect-following cap installed on the underlying client. */
    pub max_redirects: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            backoff_factor: 0.3,
            retry_status: vec![
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusCode::BAD_GATEWAY,
                StatusCode::SERVICE_UNAVAILABLE,
                StatusCode::GATEWAY_TIMEOUT,
            ],
            respect_retry_after: true,
            max_redirects: 16,
        }
    }
}

impl RetryPolicy {
    pub fn retryable(&self, status: StatusCode) -> bool {
        self.retry_status.contains(&status)
    }

    /**
     * Delay before the n-th retry (1-based): factor * 2^(n - 1).  The
     * default policy sleeps 0.3s, 0.6s, then 1.2s.
     */
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        Duration::from_secs_f64(self.backoff_factor * 2f64.powi(exp as i32))
    }
}

/**
 * Parse a Retry-After header value, which may be delta-seconds or an
 * HTTP-date.  Anything else yields None and the caller falls back to the
 * computed backoff schedule.
 */
pub(crate) fn parse_retry_after(v: &str) -> Option<Duration> {
    let v = v.trim();

    if let Ok(secs) = v.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    if let Ok(when) = DateTime::parse_from_rfc2822(v) {
        /*
         * A date in the past means the server is happy for us to retry
         * immediately; a negative delta will not convert.
         */
        return (when.with_timezone(&Utc) - Utc::now()).to_std().ok();
    }

    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_policy_matches_transient_statuses() {
        let p = RetryPolicy::default();

        for code in [429u16, 500, 502, 503, 504] {
            assert!(p.retryable(StatusCode::from_u16(code).unwrap()));
        }
        assert!(!p.retryable(StatusCode::NOT_FOUND));
        assert!(!p.retryable(StatusCode::CONFLICT));
        assert!(!p.retryable(StatusCode::OK));
    }

    #[test]
    fn backoff_schedule_doubles() {
        let p = RetryPolicy::default();

        let b1 = p.backoff(1).as_secs_f64();
        let b2 = p.backoff(2).as_secs_f64();
        let b3 = p.backoff(3).as_secs_f64();

        assert!((b1 - 0.3).abs() < 1e-6);
        assert!((b2 - 0.6).abs() < 1e-6);
        assert!((b3 - 1.2).abs() < 1e-6);
        assert!(b1 < b2 && b2 < b3);
    }

    #[test]
    fn retry_after_delta_seconds() {
        assert_eq!(parse_retry_after("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::from_secs(0)));
    }

    #[test]
    fn retry_after_http_date() {
        let when = (Utc::now() + chrono::Duration::seconds(60)).to_rfc2822();
        let d = parse_retry_after(&when).unwrap();
        assert!(d <= Duration::from_secs(60));
        assert!(d >= Duration::from_secs(50));

        let past = (Utc::now() - chrono::Duration::seconds(60)).to_rfc2822();
        assert_eq!(parse_retry_after(&past), None);
    }

    #[test]
    fn retry_after_garbage() {
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after(""), None);
        assert_eq!(parse_retry_after("-5"), None);
    }
}
