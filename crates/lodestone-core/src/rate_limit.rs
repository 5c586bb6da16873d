//! Token-bucket rate limiting keyed by sender identity.
//!
//! Each channel keeps one [`BucketTable`]; buckets are created lazily on a
//! sender's first message and discarded when that sender disconnects.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::id::PeerId;

/// Token-bucket parameters: up to `max_entrance` messages per `interval`
/// seconds, refilled continuously.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    #[serde(rename = "maxEntrance")]
    pub max_entrance: u32,
    /// Refill interval in seconds.
    #[serde(rename = "interval")]
    pub interval: f64,
}

impl RateLimit {
    pub fn new(max_entrance: u32, interval: f64) -> Self {
        Self {
            max_entrance,
            interval,
        }
    }

    /// Tokens regained per second.
    fn refill_rate(&self) -> f64 {
        if self.interval <= 0.0 {
            f64::INFINITY
        } else {
            f64::from(self.max_entrance) / self.interval
        }
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        // 30 messages per second per sender unless configured otherwise.
        Self {
            max_entrance: 30,
            interval: 1.0,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-sender buckets for one channel.
#[derive(Debug)]
pub struct BucketTable {
    limit: RateLimit,
    buckets: HashMap<PeerId, Bucket>,
}

impl BucketTable {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            buckets: HashMap::new(),
        }
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Replace the limit. Existing buckets keep their token counts and
    /// refill at the new rate from their next message.
    pub fn set_limit(&mut self, limit: RateLimit) {
        self.limit = limit;
    }

    /// Charge one token for a message from `sender` at `now`.
    ///
    /// Returns `false` when the sender's bucket is empty. A bucket starts
    /// full on the sender's first message.
    pub fn try_admit(&mut self, sender: PeerId, now: Instant) -> bool {
        let capacity = f64::from(self.limit.max_entrance);
        let rate = self.limit.refill_rate();
        let bucket = self.buckets.entry(sender).or_insert(Bucket {
            tokens: capacity,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = if rate.is_finite() {
            (bucket.tokens + elapsed * rate).min(capacity)
        } else {
            capacity
        };
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop the bucket for a sender that disconnected.
    pub fn forget(&mut self, sender: PeerId) {
        self.buckets.remove(&sender);
    }

    /// Number of senders with live bucket state.
    pub fn tracked_senders(&self) -> usize {
        self.buckets.len()
    }
}
