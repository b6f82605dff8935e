use std::time::Duration;

use tokio::time::Instant;

pub struct Entry<V> {
    pub value: V,
    pub created_at: Instant,
    pub ttl: Duration,
    pub access_count: u64,
    pub touched_at: Instant,
    /// Monotonic access sequence, breaks ties between equal `touched_at`.
    pub touched_seq: u64,
}

impl<V> Entry<V> {
    pub fn new(value: V, ttl: Duration, now: Instant, seq: u64) -> Self {
        Self {
            value,
            created_at: now,
            ttl,
            access_count: 0,
            touched_at: now,
            touched_seq: seq,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }

    pub fn touch(&mut self, now: Instant, seq: u64) {
        self.access_count += 1;
        self.touched_at = now;
        self.touched_seq = seq;
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }
}
