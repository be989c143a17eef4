//! Token bucket rate limiting for data loader connect/disconnect attempts.
//!
//! Tokens accumulate lazily: every check first regenerates the tokens earned
//! since the last refill, capped at `max_tokens`. Consumption fails closed, so
//! a declined attempt has no side effect and can simply be retried later.

use crate::error::{ReplicantError, Result};
use parking_lot::Mutex;
use std::time::Instant;

/// Rate limit settings for a data loader.
#[derive(Clone, Debug, PartialEq)]
pub struct RateLimitConfig {
    /// Tokens regenerated per second.
    /// Default: 1.0
    pub tokens_per_second: f64,

    /// Bucket capacity. The bucket starts full.
    /// Default: 5.0
    pub max_tokens: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            tokens_per_second: 1.0,
            max_tokens: 5.0,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket shared between the runtime and transport threads.
#[derive(Debug)]
pub struct RateLimiter {
    tokens_per_second: f64,
    max_tokens: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Create a full bucket.
    pub fn new(tokens_per_second: f64, max_tokens: f64) -> Result<Self> {
        if !(tokens_per_second > 0.0) || !(max_tokens > 0.0) {
            return Err(ReplicantError::InvalidConfig(format!(
                "rate limit must be positive (tokens_per_second={}, max_tokens={})",
                tokens_per_second, max_tokens
            )));
        }

        Ok(Self {
            tokens_per_second,
            max_tokens,
            state: Mutex::new(BucketState {
                tokens: max_tokens,
                last_refill: Instant::now(),
            }),
        })
    }

    pub fn from_config(config: &RateLimitConfig) -> Result<Self> {
        Self::new(config.tokens_per_second, config.max_tokens)
    }

    pub fn tokens_per_second(&self) -> f64 {
        self.tokens_per_second
    }

    pub fn max_tokens(&self) -> f64 {
        self.max_tokens
    }

    /// Add the tokens earned since the last refill.
    pub fn regenerate(&self) {
        self.regenerate_at(Instant::now());
    }

    /// Take `cost` tokens if available. Returns false and leaves the bucket
    /// untouched otherwise.
    pub fn consume(&self, cost: f64) -> bool {
        self.consume_at(cost, Instant::now())
    }

    /// Run `action` only if `cost` tokens can be consumed.
    pub fn attempt_action<F: FnOnce()>(&self, cost: f64, action: F) -> bool {
        if self.consume(cost) {
            action();
            true
        } else {
            false
        }
    }

    /// Current token count after regeneration.
    pub fn available_tokens(&self) -> f64 {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        state.tokens
    }

    pub(crate) fn regenerate_at(&self, now: Instant) {
        let mut state = self.state.lock();
        self.refill(&mut state, now);
    }

    pub(crate) fn consume_at(&self, cost: f64, now: Instant) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state, now);

        if state.tokens >= cost {
            state.tokens -= cost;
            true
        } else {
            false
        }
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        // An instant older than the last refill earns nothing.
        let elapsed = now.saturating_duration_since(state.last_refill);
        if elapsed.is_zero() {
            return;
        }
        let earned = elapsed.as_secs_f64() * self.tokens_per_second;
        state.tokens = (state.tokens + earned).min(self.max_tokens);
        state.last_refill = now;
    }
}
