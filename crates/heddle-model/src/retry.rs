// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Bounded retry on HTTP 429, honoring `Retry-After` when present.

use chrono::{DateTime, Utc};

/// Retry policy: how many attempts beyond the first, and the base backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { retries: 3, base_delay_ms: 1000 }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self { retries: 0, base_delay_ms: 0 }
    }

    /// Delay before the given zero-indexed attempt, given an optional
    /// `Retry-After` header value. `now` is injected for testability.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<&str>, now: DateTime<Utc>) -> std::time::Duration {
        if let Some(header) = retry_after {
            if let Some(ms) = parse_retry_after(header, now) {
                return std::time::Duration::from_millis(ms);
            }
        }
        let backoff = self.base_delay_ms.saturating_mul(1u64 << attempt.min(32));
        std::time::Duration::from_millis(backoff)
    }
}

/// Parse a `Retry-After` header value: either an integer number of seconds
/// or an HTTP-date, resolved to `max(0, target - now)` milliseconds.
fn parse_retry_after(header: &str, now: DateTime<Utc>) -> Option<u64> {
    if let Ok(secs) = header.trim().parse::<u64>() {
        return Some(secs.saturating_mul(1000));
    }
    let target = DateTime::parse_from_rfc2822(header.trim()).ok()?.with_timezone(&Utc);
    let ms = (target - now).num_milliseconds();
    Some(ms.max(0) as u64)
}
