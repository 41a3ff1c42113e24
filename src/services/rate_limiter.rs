//! Per-caller, per-endpoint request budgets.
//!
//! Fixed one-minute windows aligned to the clock minute. A counter is keyed by
//! `(api_key_id, endpoint_id, window_start)`; anonymous callers of public
//! endpoints share the `None` key. Check and increment happen under a single
//! lock, so concurrent requests can never exceed the limit.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::models::endpoint::Endpoint;

const WINDOW_SECS: i64 = 60;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// `None` when the endpoint is unlimited
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    /// Seconds until the current window rolls (only set when denied)
    pub retry_after_secs: Option<u64>,
}

impl RateDecision {
    fn unlimited() -> Self {
        Self {
            allowed: true,
            limit: None,
            remaining: None,
            retry_after_secs: None,
        }
    }
}

type CounterKey = (Option<i64>, i64);

#[derive(Default)]
struct Windows {
    /// Start of the window every counter belongs to
    window_start: i64,
    counters: HashMap<CounterKey, u32>,
}

#[derive(Default)]
pub struct RateLimiter {
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit or reject one request from `api_key_id` against `endpoint`, now.
    pub async fn admit(&self, api_key_id: Option<i64>, endpoint: &Endpoint) -> RateDecision {
        self.admit_at(api_key_id, endpoint, Utc::now()).await
    }

    /// Admission check at an explicit instant.
    pub async fn admit_at(
        &self,
        api_key_id: Option<i64>,
        endpoint: &Endpoint,
        now: DateTime<Utc>,
    ) -> RateDecision {
        let Some(limit) = endpoint.rate_limit() else {
            return RateDecision::unlimited();
        };

        let now_secs = now.timestamp();
        let window_start = now_secs - now_secs.rem_euclid(WINDOW_SECS);

        let mut windows = self.windows.lock().await;
        if windows.window_start != window_start {
            // Counters only ever belong to the current window
            windows.counters.clear();
            windows.window_start = window_start;
        }

        let count = windows
            .counters
            .entry((api_key_id, endpoint.id))
            .or_insert(0);

        if *count >= limit {
            let retry_after = (window_start + WINDOW_SECS - now_secs).max(1) as u64;
            tracing::debug!(
                api_key_id,
                endpoint_id = endpoint.id,
                limit,
                retry_after,
                "Rate limit exceeded"
            );
            return RateDecision {
                allowed: false,
                limit: Some(limit),
                remaining: Some(0),
                retry_after_secs: Some(retry_after),
            };
        }

        *count += 1;
        RateDecision {
            allowed: true,
            limit: Some(limit),
            remaining: Some(limit - *count),
            retry_after_secs: None,
        }
    }

    /// Drop every counter.
    pub async fn clear(&self) {
        let mut windows = self.windows.lock().await;
        windows.counters.clear();
        tracing::debug!("Rate limiter cleared");
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.windows.lock().await.counters.len()
    }
}
