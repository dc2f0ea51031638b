//! Per-key token-bucket admission control.
//!
//! Buckets follow the classic bandwidth model: each configured rule grants
//! `requests` tokens, refilled in full every `period`. A request is
//! admitted when every rule still has a token; unseen keys start fully
//! stocked. The bucket store is bounded (capacity plus idle eviction), so
//! the set of tracked callers cannot grow without limit.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::debug;

use crate::config::{RateLimitConfig, RateLimitRule};
use crate::error::{Result, TrackReelError};
use crate::ttl_cache::TtlCache;

#[derive(Debug)]
struct BandwidthState {
    rule: RateLimitRule,
    tokens: u64,
    last_refill: Instant,
}

impl BandwidthState {
    fn new(rule: RateLimitRule, now: Instant) -> Self {
        Self {
            rule,
            tokens: rule.requests,
            last_refill: now,
        }
    }

    /// Interval refill: each fully elapsed period restocks the quota.
    fn refill(&mut self, now: Instant) {
        let period = self.rule.period();
        if period.is_zero() {
            self.tokens = self.rule.requests;
            return;
        }
        let elapsed = now.duration_since(self.last_refill);
        let periods = (elapsed.as_nanos() / period.as_nanos()) as u32;
        if periods > 0 {
            self.tokens = self.rule.requests;
            self.last_refill += period * periods;
        }
    }

    fn time_until_token(&self, now: Instant) -> Duration {
        if self.tokens >= 1 {
            Duration::ZERO
        } else {
            (self.last_refill + self.rule.period()).saturating_duration_since(now)
        }
    }
}

#[derive(Debug)]
struct Bucket {
    limits: Vec<BandwidthState>,
}

impl Bucket {
    fn new(rules: &[RateLimitRule], now: Instant) -> Self {
        Self {
            limits: rules
                .iter()
                .map(|rule| BandwidthState::new(*rule, now))
                .collect(),
        }
    }

    /// Consume one token from every rule, or none at all.
    fn try_consume(&mut self, now: Instant) -> bool {
        for limit in &mut self.limits {
            limit.refill(now);
        }
        if self.limits.iter().all(|limit| limit.tokens >= 1) {
            for limit in &mut self.limits {
                limit.tokens -= 1;
            }
            true
        } else {
            false
        }
    }

    fn time_until_available(&mut self, now: Instant) -> Duration {
        for limit in &mut self.limits {
            limit.refill(now);
        }
        self.limits
            .iter()
            .map(|limit| limit.time_until_token(now))
            .max()
            .unwrap_or(Duration::ZERO)
    }
}

/// Token-bucket rate limiter with a bounded per-caller bucket store.
///
/// All bucket access goes through one mutex, so concurrent checks for the
/// same key are linearizable: a token is consumed exactly once.
pub struct RateLimiter {
    enabled: bool,
    rules: Vec<RateLimitRule>,
    buckets: Mutex<TtlCache<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            rules: config.limits.clone(),
            buckets: Mutex::new(TtlCache::new(
                config.max_tracked_keys,
                Duration::from_secs(config.idle_eviction_secs),
            )),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && !self.rules.is_empty()
    }

    /// Try to admit one request for `key`.
    ///
    /// Consumes one token on success and leaves the bucket unchanged on
    /// failure. A disabled limiter admits everything.
    pub fn try_acquire(&self, key: &str) -> bool {
        if !self.is_enabled() {
            return true;
        }
        let now = Instant::now();
        let mut buckets = self.buckets.lock().expect("bucket store mutex poisoned");
        let bucket = buckets.get_or_insert_with(key.to_string(), || Bucket::new(&self.rules, now));
        let admitted = bucket.try_consume(now);
        if !admitted {
            debug!("rate limit hit for key '{key}'");
        }
        admitted
    }

    /// Estimate how long until a request for `key` would be admitted,
    /// without consuming anything. Zero when disabled or stocked.
    pub fn time_until_allowed(&self, key: &str) -> Duration {
        if !self.is_enabled() {
            return Duration::ZERO;
        }
        let now = Instant::now();
        let mut buckets = self.buckets.lock().expect("bucket store mutex poisoned");
        let bucket = buckets.get_or_insert_with(key.to_string(), || Bucket::new(&self.rules, now));
        bucket.time_until_available(now)
    }

    /// Admission check that surfaces the wait as a [`TrackReelError`].
    pub fn check(&self, key: &str) -> Result<()> {
        if self.try_acquire(key) {
            Ok(())
        } else {
            Err(TrackReelError::RateLimited {
                retry_after: self.time_until_allowed(key),
            })
        }
    }
}
